//! Vault error types.
//!
//! Every public API in this crate returns [`VaultError`]. Variants map onto
//! the caller-visible taxonomy: a missing integration, an unreadable
//! ciphertext, an inactive credential, or bad input.

use iocvault_store::StoreError;

/// Unified error type for the credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (e.g. invalid key length, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed: malformed envelope, wrong master key, or tampering.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// The master key could not be derived from the configured secret.
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    // -- Directory errors ---------------------------------------------------
    /// No integration with this id belongs to the calling user.
    #[error("integration not found: id={id}")]
    NotFound { id: String },

    /// The integration exists but has been deactivated.
    #[error("integration is not active: id={id}")]
    Inactive { id: String },

    /// Input rejected before touching the store.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // -- Underlying errors --------------------------------------------------
    /// Storage layer failure.
    #[error("store error: {0}")]
    Store(StoreError),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound {
                entity: "integration",
                id,
            } => Self::NotFound { id },
            StoreError::InvalidArgument(reason) => Self::InvalidArgument(reason),
            other => Self::Store(other),
        }
    }
}

impl VaultError {
    /// HTTP status code a boundary layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Inactive { .. } | Self::InvalidArgument(_) => 400,
            Self::EncryptionFailed { .. }
            | Self::DecryptionFailed { .. }
            | Self::KeyDerivationFailed { .. }
            | Self::Store(_)
            | Self::Serialization(_) => 500,
        }
    }
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_for_integration_becomes_not_found() {
        let err: VaultError = StoreError::NotFound {
            entity: "integration",
            id: "abc".into(),
        }
        .into();
        assert!(matches!(err, VaultError::NotFound { ref id } if id == "abc"));
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn other_store_errors_are_internal() {
        let err: VaultError = StoreError::TaskJoin("boom".into()).into();
        assert!(matches!(err, VaultError::Store(_)));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn decryption_failure_is_never_a_client_error() {
        let err = VaultError::DecryptionFailed {
            reason: "bad tag".into(),
        };
        assert_eq!(err.http_status(), 500);
    }
}
