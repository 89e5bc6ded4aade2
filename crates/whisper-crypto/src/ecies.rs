//! Hybrid public-key encryption for peer payloads.
//!
//! Each call generates an ephemeral X25519 key, agrees a shared secret with
//! the recipient's public key, derives an AES-256-GCM key with HKDF-SHA256
//! and seals the payload under a random nonce.
//!
//! Wire format: [ephemeral public(32)] [nonce(12)] [ciphertext + tag(16)]

use hkdf::Hkdf;
use rand::rngs::OsRng;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::{PeerKeyPair, PUBLIC_KEY_LEN};

/// HKDF info label binding derived keys to this protocol.
const HKDF_INFO: &[u8] = b"whisper-ecies-x25519-aes256gcm-v1";

/// AES-256-GCM authentication tag size.
pub const GCM_TAG_SIZE: usize = 16;

/// Bytes added to every plaintext by `encrypt`.
pub const ENCRYPTION_OVERHEAD: usize = PUBLIC_KEY_LEN + NONCE_LEN + GCM_TAG_SIZE;

/// Derive the AEAD key from the agreed secret.
/// Salt = ephemeral public || recipient public, so the key is bound to both parties.
fn derive_key(
    shared: &SharedSecret,
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Result<LessSafeKey, CryptoError> {
    let mut salt = [0u8; 2 * PUBLIC_KEY_LEN];
    salt[..PUBLIC_KEY_LEN].copy_from_slice(ephemeral.as_bytes());
    salt[PUBLIC_KEY_LEN..].copy_from_slice(recipient.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared.as_bytes());
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(HKDF_INFO, &mut okm[..])
        .map_err(|_| CryptoError::KeyDerivation)?;

    let unbound = UnboundKey::new(&AES_256_GCM, &okm[..]).map_err(|_| CryptoError::KeyDerivation)?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s private key can read it.
///
/// Output is different on every call, even for identical input.
pub fn encrypt(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let shared = ephemeral_secret.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(CryptoError::Encrypt("recipient key is a low-order point".into()));
    }
    let key = derive_key(&shared, &ephemeral_public, recipient)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| CryptoError::Encrypt("RNG failed".into()))?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::from(ephemeral_public.as_bytes()),
        &mut in_out,
    )
    .map_err(|_| CryptoError::Encrypt("AEAD seal failed".into()))?;

    let mut out = Vec::with_capacity(ENCRYPTION_OVERHEAD + plaintext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&in_out);
    Ok(out)
}

/// Decrypt data produced by [`encrypt`] for the local key pair.
///
/// Fails on truncated input, a wrong key, or any tampering.
pub fn decrypt(ciphertext: &[u8], local: &PeerKeyPair) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < ENCRYPTION_OVERHEAD {
        return Err(CryptoError::CiphertextTooShort {
            expected: ENCRYPTION_OVERHEAD,
            got: ciphertext.len(),
        });
    }

    let mut ephemeral_bytes = [0u8; PUBLIC_KEY_LEN];
    ephemeral_bytes.copy_from_slice(&ciphertext[..PUBLIC_KEY_LEN]);
    let ephemeral_public = PublicKey::from(ephemeral_bytes);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&ciphertext[PUBLIC_KEY_LEN..PUBLIC_KEY_LEN + NONCE_LEN]);

    let shared = local.secret().diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(CryptoError::Decrypt);
    }
    let key = derive_key(&shared, &ephemeral_public, local.public_key())?;

    let mut in_out = ciphertext[PUBLIC_KEY_LEN + NONCE_LEN..].to_vec();
    let plaintext = key
        .open_in_place(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(&ephemeral_bytes),
            &mut in_out,
        )
        .map_err(|_| CryptoError::Decrypt)?;

    Ok(plaintext.to_vec())
}
