//! Local key pair generation and public-key serialization.
//!
//! Each Whisper node holds exactly one Curve25519 key pair while encryption
//! is enabled. The public half is sent to every peer on connect; the private
//! half never leaves the process and is zeroized on drop.

use std::fmt;

use ring::rand::{SecureRandom, SystemRandom};
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

pub use x25519_dalek::PublicKey;

use crate::error::CryptoError;

/// Length of an exported X25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// The local node's key pair.
pub struct PeerKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl PeerKeyPair {
    /// Generate a fresh key pair from the system RNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let mut seed = Zeroizing::new([0u8; 32]);
        rng.fill(&mut seed[..]).map_err(|_| CryptoError::KeyGen)?;
        let secret = StaticSecret::from(*seed);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Raw bytes of the public half, as sent in a `PublicKey` envelope.
    pub fn export_public_key(&self) -> Vec<u8> {
        export_public_key(&self.public)
    }

    /// Short hex digest of the public key, for log lines.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public)
    }
}

impl fmt::Debug for PeerKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerKeyPair")
            .field("public", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Serialize a public key to its raw 32-byte form.
pub fn export_public_key(key: &PublicKey) -> Vec<u8> {
    key.as_bytes().to_vec()
}

/// Parse a peer's public key, rejecting malformed input.
pub fn import_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let raw: [u8; PUBLIC_KEY_LEN] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: PUBLIC_KEY_LEN,
            got: bytes.len(),
        })?;
    if raw.iter().all(|b| *b == 0) {
        return Err(CryptoError::WeakKey);
    }
    Ok(PublicKey::from(raw))
}

/// First 8 bytes of SHA-256 over the key, hex encoded.
pub fn fingerprint(key: &PublicKey) -> String {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(key.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_pairs() {
        let a = PeerKeyPair::generate().unwrap();
        let b = PeerKeyPair::generate().unwrap();
        assert_ne!(a.public_key().as_bytes(), b.public_key().as_bytes());
    }

    #[test]
    fn export_import_roundtrip() {
        let pair = PeerKeyPair::generate().unwrap();
        let bytes = pair.export_public_key();
        assert_eq!(bytes.len(), PUBLIC_KEY_LEN);
        let restored = import_public_key(&bytes).unwrap();
        assert_eq!(restored.as_bytes(), pair.public_key().as_bytes());
    }

    #[test]
    fn import_rejects_wrong_length() {
        let result = import_public_key(&[1u8; 31]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidKeyLength { expected: 32, got: 31 })
        ));
        assert!(import_public_key(&[]).is_err());
        assert!(import_public_key(&[1u8; 65]).is_err());
    }

    #[test]
    fn import_rejects_zero_key() {
        assert!(matches!(
            import_public_key(&[0u8; 32]),
            Err(CryptoError::WeakKey)
        ));
    }

    #[test]
    fn debug_hides_secret() {
        let pair = PeerKeyPair::generate().unwrap();
        let shown = format!("{pair:?}");
        assert!(shown.contains(&pair.fingerprint()));
        assert_eq!(pair.fingerprint().len(), 16);
    }
}
