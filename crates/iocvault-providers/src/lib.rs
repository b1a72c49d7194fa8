//! Threat-intel provider dispatch for iocvault.
//!
//! Each client turns an indicator plus an integration id into one outbound
//! call, authenticated with the integration's decrypted key, and returns a
//! [`ProviderResponse`] envelope. Clients differ only in their endpoints and
//! in how they present the key; the shared algorithm lives in
//! [`dispatcher`].
//!
//! | provider | header | operations |
//! |---|---|---|
//! | VirusTotal | `x-apikey` | ip, domain, hash, URL submit + analysis |
//! | AbuseIPDB | `Key` | ip check, ip report |
//! | AlienVault OTX | `X-OTX-API-KEY` | ip, domain, hash, url |

pub mod abuseipdb;
pub mod alienvault;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod response;
pub mod settings;
pub mod virustotal;

pub use abuseipdb::AbuseIpdbClient;
pub use alienvault::AlienVaultClient;
pub use dispatcher::{CredentialSource, ProviderAuth};
pub use error::{ProviderError, Result};
pub use registry::{IocKind, ProviderKind, Providers};
pub use response::{ProviderResponse, ResponseStatus};
pub use settings::{DEFAULT_TIMEOUT_SECS, ProviderSettings, ProvidersConfig};
pub use virustotal::VirusTotalClient;
