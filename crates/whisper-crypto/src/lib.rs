//! Whisper cryptographic layer, the key exchange used by every session.
//!
//! This crate provides:
//! - A process-wide X25519 key pair for the local node
//! - Raw public-key export and validated import
//! - Hybrid public-key encryption (ephemeral X25519 + HKDF-SHA256 + AES-256-GCM)

pub mod ecies;
pub mod error;
pub mod keys;

// Re-export key types for convenience
pub use ecies::{decrypt, encrypt, ENCRYPTION_OVERHEAD};
pub use error::CryptoError;
pub use keys::{export_public_key, import_public_key, PeerKeyPair, PublicKey, PUBLIC_KEY_LEN};
