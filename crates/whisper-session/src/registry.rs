//! Per-peer public keys gating outbound encryption.

use std::collections::HashMap;

use whisper_crypto::PublicKey;
use whisper_protocol::PeerId;

#[derive(Debug, Default)]
pub struct PublicKeyRegistry {
    keys: HashMap<PeerId, PublicKey>,
}

impl PublicKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a peer's key, returning the key it replaced.
    pub fn register(&mut self, peer: PeerId, key: PublicKey) -> Option<PublicKey> {
        self.keys.insert(peer, key)
    }

    pub fn remove(&mut self, peer: &PeerId) -> Option<PublicKey> {
        self.keys.remove(peer)
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PublicKey> {
        self.keys.get(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.keys.contains_key(peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.keys.keys()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisper_crypto::PeerKeyPair;

    #[test]
    fn register_replace_remove() {
        let mut registry = PublicKeyRegistry::new();
        let peer = PeerId::random();
        let first = *PeerKeyPair::generate().unwrap().public_key();
        let second = *PeerKeyPair::generate().unwrap().public_key();

        assert!(registry.register(peer, first).is_none());
        let replaced = registry.register(peer, second).unwrap();
        assert_eq!(replaced.as_bytes(), first.as_bytes());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&peer).unwrap().as_bytes(), second.as_bytes());

        assert!(registry.remove(&peer).is_some());
        assert!(!registry.contains(&peer));
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut registry = PublicKeyRegistry::new();
        for _ in 0..3 {
            registry.register(PeerId::random(), *PeerKeyPair::generate().unwrap().public_key());
        }
        assert_eq!(registry.peers().count(), 3);
        registry.clear();
        assert!(registry.is_empty());
    }
}
