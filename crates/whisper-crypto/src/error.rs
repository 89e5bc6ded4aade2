use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key pair generation failed: system RNG unavailable")]
    KeyGen,

    #[error("invalid public key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("public key rejected: all-zero point")]
    WeakKey,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("ciphertext too short: expected at least {expected} bytes, got {got}")]
    CiphertextTooShort { expected: usize, got: usize },

    #[error("decryption failed: wrong key or tampered data")]
    Decrypt,
}
