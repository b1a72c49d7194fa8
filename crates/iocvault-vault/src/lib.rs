//! Encrypted integration directory for iocvault.
//!
//! Users register third-party threat-intel API keys as *integrations*. Keys
//! are encrypted with AES-256-GCM before they reach SQLite and are only
//! decrypted on demand, for the owner or for an outbound provider call.
//!
//! # Modules
//!
//! - [`crypto`]: AES-256-GCM primitives and HKDF-SHA256 key derivation.
//! - [`encryptor`]: versioned string envelopes around the primitives.
//! - [`directory`]: user-scoped integration CRUD and default resolution.
//! - [`model`]: records, inputs and list filters.
//! - [`error`]: unified error type.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use iocvault_store::Database;
//! use iocvault_vault::{Encryptor, IntegrationDirectory, NewIntegration};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open_and_migrate("data/iocvault.db").await?;
//! let encryptor = Arc::new(Encryptor::from_secret("master secret from the environment")?);
//! let directory = IntegrationDirectory::new(db, encryptor);
//!
//! let created = directory
//!     .create("analyst-1", NewIntegration::new("virustotal", "main", "vt-key").as_default())
//!     .await?;
//!
//! let resolved = directory
//!     .get_default_or_fallback("virustotal", "analyst-1")
//!     .await?
//!     .expect("an active integration exists");
//! assert_eq!(resolved.integration.id, created.id);
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod directory;
pub mod encryptor;
pub mod error;
pub mod model;

// Re-export the most commonly used types at the crate root for convenience.
pub use directory::IntegrationDirectory;
pub use encryptor::Encryptor;
pub use error::{Result, VaultError};
pub use model::{
    ActiveStatus, DecryptedApiKey, Integration, IntegrationPatch, IntegrationStatus,
    IntegrationSummary, ListFilter, MAX_LABEL_LEN, NewIntegration, ResolvedCredential,
};
