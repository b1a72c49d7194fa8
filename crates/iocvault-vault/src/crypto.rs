//! AES-256-GCM primitives and key derivation using the `ring` crate.
//!
//! - **Encryption/decryption**: AES-256-GCM authenticated encryption with
//!   randomly generated 96-bit nonces.
//! - **Key derivation**: HKDF-SHA256 turns the configured master secret into
//!   a 256-bit key. The secret itself is never used as key material.
//! - **Random generation**: cryptographically secure bytes via `ring`.
//!
//! # Security Notes
//!
//! - Nonces are random per encryption. With 96-bit nonces the collision
//!   probability stays negligible for up to ~2^32 encryptions per key.
//! - Key material is not zeroized on drop (see `zeroize` crate).

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// HKDF salt. Changing it invalidates every stored envelope.
const HKDF_SALT: &[u8] = b"iocvault/master-key/v1";

/// HKDF info label binding the derived key to its single use.
const HKDF_INFO: &[u8] = b"integration-api-key-encryption";

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` requires a [`NonceSequence`] for sealing; each sealing key built
/// here is used for exactly one message.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` with AES-256-GCM under the 256-bit `key`.
///
/// Returns `(nonce, ciphertext)`; `ciphertext` ends with the 128-bit tag.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the key length is wrong or
/// `ring` reports a failure.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    if key.len() != KEY_LEN {
        return Err(VaultError::EncryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }

    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = in_out.len(),
        "encrypted data"
    );

    Ok((nonce_bytes, in_out))
}

/// Decrypt `ciphertext` (tag included) with `nonce` under the 256-bit `key`.
///
/// # Errors
///
/// Returns [`VaultError::DecryptionFailed`] if the key is wrong, the
/// ciphertext has been tampered with, or the nonce does not match.
pub fn decrypt(nonce: &[u8; NONCE_LEN_BYTES], ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != KEY_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::DecryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(*nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed, wrong key or corrupted data".into(),
        })?;

    let result = plaintext.to_vec();

    tracing::trace!(
        ciphertext_len = ciphertext.len(),
        plaintext_len = result.len(),
        "decrypted data"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derive the 256-bit master key from the configured `secret` with
/// HKDF-SHA256.
///
/// Deterministic: the same secret always yields the same key, so envelopes
/// written by one process can be opened by the next.
///
/// # Errors
///
/// Returns [`VaultError::KeyDerivationFailed`] for an empty secret.
pub fn derive_key_from_secret(secret: &[u8]) -> Result<[u8; KEY_LEN]> {
    if secret.is_empty() {
        return Err(VaultError::KeyDerivationFailed {
            reason: "master secret must not be empty".into(),
        });
    }

    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_SALT).extract(secret);
    let info = [HKDF_INFO];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| VaultError::KeyDerivationFailed {
            reason: "HKDF expand failed".into(),
        })?;

    let mut key = [0u8; KEY_LEN];
    okm.fill(&mut key)
        .map_err(|_| VaultError::KeyDerivationFailed {
            reason: "HKDF output length mismatch".into(),
        })?;

    tracing::debug!("derived master key via HKDF-SHA256");
    Ok(key)
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Generate `len` cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the system CSPRNG fails.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random bytes".into(),
        })?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = random_bytes(KEY_LEN).unwrap();
        let plaintext = b"vt-api-key-0123456789";

        let (nonce, ciphertext) = encrypt(plaintext, &key).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_LEN);

        let decrypted = decrypt(&nonce, &ciphertext, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key1 = random_bytes(KEY_LEN).unwrap();
        let key2 = random_bytes(KEY_LEN).unwrap();

        let (nonce, ciphertext) = encrypt(b"secret data", &key1).unwrap();
        let result = decrypt(&nonce, &ciphertext, &key2);

        assert!(matches!(result, Err(VaultError::DecryptionFailed { .. })));
    }

    #[test]
    fn decrypt_with_tampered_ciphertext_fails() {
        let key = random_bytes(KEY_LEN).unwrap();

        let (nonce, mut ciphertext) = encrypt(b"secret data", &key).unwrap();
        if let Some(byte) = ciphertext.first_mut() {
            *byte ^= 0x01;
        }

        assert!(decrypt(&nonce, &ciphertext, &key).is_err());
    }

    #[test]
    fn decrypt_with_wrong_nonce_fails() {
        let key = random_bytes(KEY_LEN).unwrap();

        let (mut nonce, ciphertext) = encrypt(b"secret data", &key).unwrap();
        nonce[0] ^= 0x80;

        assert!(decrypt(&nonce, &ciphertext, &key).is_err());
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short_key = vec![0u8; 16];
        assert!(encrypt(b"test", &short_key).is_err());
    }

    #[test]
    fn derivation_is_deterministic_per_secret() {
        let a = derive_key_from_secret(b"correct horse battery staple").unwrap();
        let b = derive_key_from_secret(b"correct horse battery staple").unwrap();
        let c = derive_key_from_secret(b"another secret").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn derived_key_is_not_the_raw_secret() {
        let secret = [7u8; KEY_LEN];
        let key = derive_key_from_secret(&secret).unwrap();
        assert_ne!(key, secret);
    }

    #[test]
    fn empty_secret_rejected() {
        let result = derive_key_from_secret(b"");
        assert!(matches!(result, Err(VaultError::KeyDerivationFailed { .. })));
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = random_bytes(KEY_LEN).unwrap();

        let (nonce, ciphertext) = encrypt(b"", &key).unwrap();
        let decrypted = decrypt(&nonce, &ciphertext, &key).unwrap();

        assert!(decrypted.is_empty());
    }
}
