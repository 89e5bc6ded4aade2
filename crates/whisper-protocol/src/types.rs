use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique peer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Mint a fresh random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A peer as seen on the mesh: identifier plus human-readable name.
///
/// Two identities are equal when their identifiers are equal; the display
/// name is informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub id: PeerId,
    pub display_name: String,
}

impl PeerIdentity {
    pub fn new(id: PeerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    /// Create an identity with a freshly minted identifier.
    pub fn generate(display_name: impl Into<String>) -> Self {
        Self::new(PeerId::random(), display_name)
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerIdentity {}

impl Hash for PeerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// Lifecycle of a session with one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Discovering,
    Connecting,
    Connected,
    NotConnected,
}

/// Profile metadata exchanged once per connection, right after the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub display_name: String,
    /// Encoded avatar image (PNG/JPEG), opaque to the protocol.
    pub avatar: Vec<u8>,
    pub bio: String,
    #[serde(default)]
    pub is_advertising: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identity_equality_ignores_display_name() {
        let id = PeerId::random();
        let a = PeerIdentity::new(id, "alice");
        let b = PeerIdentity::new(id, "alice's phone");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn generated_identities_are_distinct() {
        let a = PeerIdentity::generate("same");
        let b = PeerIdentity::generate("same");
        assert_ne!(a, b);
    }

    #[test]
    fn identity_display_includes_name_and_id() {
        let identity = PeerIdentity::generate("bob");
        let shown = identity.to_string();
        assert!(shown.starts_with("bob ("));
        assert!(shown.contains(&identity.id.to_string()));
    }

    #[test]
    fn profile_roundtrip() {
        let profile = ProfileSnapshot {
            display_name: "carol".into(),
            avatar: vec![0x89, b'P', b'N', b'G'],
            bio: "hi there".into(),
            is_advertising: true,
        };
        let bytes = postcard::to_allocvec(&profile).unwrap();
        let decoded: ProfileSnapshot = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, profile);
    }
}
