//! Provider error types.
//!
//! Every dispatch surfaces failures through [`ProviderError`]. Messages are
//! qualified with the provider's display name so they can be shown to a
//! caller as they are.

use iocvault_vault::VaultError;
use reqwest::StatusCode;

use crate::registry::ProviderKind;

/// Unified error type for provider dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The integration is unknown, inactive, or belongs to another provider.
    #[error("{provider} integration unavailable: {reason}")]
    IntegrationUnavailable {
        provider: ProviderKind,
        reason: String,
    },

    /// The stored API key could not be decrypted.
    #[error("failed to get {provider} API key: {reason}")]
    Decryption {
        provider: ProviderKind,
        reason: String,
    },

    /// The outbound call failed or the provider answered with a non-2xx
    /// status.
    #[error("{provider} API error: {message}")]
    ProviderCall {
        provider: ProviderKind,
        /// Upstream HTTP status, absent for transport failures.
        status: Option<u16>,
        message: String,
    },

    /// Input rejected before any credential was touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The provider has no lookup for this indicator kind.
    #[error("{provider} does not support {kind} lookups")]
    Unsupported { provider: ProviderKind, kind: String },

    /// Client construction failed (bad base URL, TLS backend).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Any other vault failure (storage, serialization).
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),
}

impl ProviderError {
    /// Qualify a vault error raised while resolving a credential for
    /// `provider`.
    pub fn from_vault(provider: ProviderKind, err: VaultError) -> Self {
        match err {
            VaultError::NotFound { id } => Self::IntegrationUnavailable {
                provider,
                reason: format!("integration {id} not found for this user"),
            },
            VaultError::Inactive { id } => Self::IntegrationUnavailable {
                provider,
                reason: format!("integration {id} is not active"),
            },
            VaultError::DecryptionFailed { reason } => Self::Decryption { provider, reason },
            VaultError::InvalidArgument(reason) => Self::InvalidArgument(reason),
            other => Self::Vault(other),
        }
    }

    /// HTTP status code a boundary layer should answer with.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::IntegrationUnavailable { .. }
            | Self::InvalidArgument(_)
            | Self::Unsupported { .. } => StatusCode::BAD_REQUEST,
            Self::ProviderCall { .. } => StatusCode::BAD_GATEWAY,
            Self::Decryption { .. } | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Vault(err) => StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

/// Convenience alias used throughout the providers crate.
pub type Result<T> = std::result::Result<T, ProviderError>;
