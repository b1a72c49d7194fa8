//! String-level encryption service for stored API keys.
//!
//! An [`Encryptor`] holds the process-wide master key and turns plaintext
//! API keys into self-contained envelopes:
//!
//! ```text
//! v1:<base64( nonce[12] ‖ ciphertext ‖ tag[16] )>
//! ```
//!
//! The version prefix lets a future scheme coexist with stored `v1` rows.
//! Construct it once at startup and share it behind an `Arc`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::crypto::{self, KEY_LEN, NONCE_LEN_BYTES, TAG_LEN};
use crate::error::{Result, VaultError};

/// Prefix of every envelope produced by this version of the scheme.
const ENVELOPE_V1: &str = "v1:";

/// Plaintext used by [`Encryptor::self_test`].
const SELF_TEST_VALUE: &str = "iocvault-self-test";

/// AES-256-GCM encryption service bound to one master key.
pub struct Encryptor {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl Encryptor {
    /// Derive the master key from an externally supplied secret.
    pub fn from_secret(secret: &str) -> Result<Self> {
        let key = crypto::derive_key_from_secret(secret.as_bytes())?;
        Ok(Self { key })
    }

    /// Use raw 256-bit key material directly.
    pub fn from_key(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| VaultError::KeyDerivationFailed {
                reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
            })?;
        Ok(Self { key })
    }

    /// Build an encryptor around a freshly generated random key.
    pub fn generate() -> Result<Self> {
        Self::from_key(&crypto::random_bytes(KEY_LEN)?)
    }

    /// Encrypt `plaintext` into a `v1` envelope.
    ///
    /// Every call draws a fresh nonce, so equal inputs never produce equal
    /// envelopes.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let (nonce, ciphertext) = crypto::encrypt(plaintext.as_bytes(), &self.key)?;

        let mut body = Vec::with_capacity(NONCE_LEN_BYTES + ciphertext.len());
        body.extend_from_slice(&nonce);
        body.extend_from_slice(&ciphertext);

        Ok(format!("{ENVELOPE_V1}{}", BASE64.encode(body)))
    }

    /// Open an envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// [`VaultError::DecryptionFailed`] for an unknown version, invalid
    /// base64, a truncated body, a failed integrity check, or a plaintext
    /// that is not UTF-8.
    pub fn decrypt(&self, envelope: &str) -> Result<String> {
        let encoded = envelope
            .strip_prefix(ENVELOPE_V1)
            .ok_or_else(|| VaultError::DecryptionFailed {
                reason: "unsupported envelope version".into(),
            })?;

        let body = BASE64
            .decode(encoded)
            .map_err(|e| VaultError::DecryptionFailed {
                reason: format!("envelope is not valid base64: {e}"),
            })?;

        if body.len() < NONCE_LEN_BYTES + TAG_LEN {
            return Err(VaultError::DecryptionFailed {
                reason: format!("envelope body is {} bytes, too short", body.len()),
            });
        }

        let (nonce_bytes, ciphertext) = body.split_at(NONCE_LEN_BYTES);
        let mut nonce = [0u8; NONCE_LEN_BYTES];
        nonce.copy_from_slice(nonce_bytes);

        let plaintext = crypto::decrypt(&nonce, ciphertext, &self.key)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed {
            reason: "plaintext is not valid UTF-8".into(),
        })
    }

    /// Round-trip a fixed value; `false` means the key is unusable.
    pub fn self_test(&self) -> bool {
        let ok = self
            .encrypt(SELF_TEST_VALUE)
            .and_then(|envelope| self.decrypt(&envelope))
            .map(|decrypted| decrypted == SELF_TEST_VALUE)
            .unwrap_or(false);

        if ok {
            tracing::debug!("encryption self-test passed");
        } else {
            tracing::error!("encryption self-test failed");
        }
        ok
    }
}
