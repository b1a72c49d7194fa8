//! Provider names, indicator kinds, and the [`Providers`] bundle.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::abuseipdb::{self, AbuseIpdbClient};
use crate::alienvault::{self, AlienVaultClient};
use crate::dispatcher::CredentialSource;
use crate::error::{ProviderError, Result};
use crate::response::ProviderResponse;
use crate::settings::ProvidersConfig;
use crate::virustotal::{self, VirusTotalClient};

// ---------------------------------------------------------------------------
// Provider names
// ---------------------------------------------------------------------------

/// A supported threat-intel provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    VirusTotal,
    AbuseIpdb,
    AlienVault,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::VirusTotal, Self::AbuseIpdb, Self::AlienVault];

    /// Name stored on integrations and reported in envelopes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VirusTotal => "virustotal",
            Self::AbuseIpdb => "abuseipdb",
            Self::AlienVault => "alienvault",
        }
    }

    /// Name used in human-readable messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::VirusTotal => "VirusTotal",
            Self::AbuseIpdb => "AbuseIPDB",
            Self::AlienVault => "AlienVault OTX",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::VirusTotal => virustotal::DEFAULT_BASE_URL,
            Self::AbuseIpdb => abuseipdb::DEFAULT_BASE_URL,
            Self::AlienVault => alienvault::DEFAULT_BASE_URL,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "virustotal" => Ok(Self::VirusTotal),
            "abuseipdb" => Ok(Self::AbuseIpdb),
            "alienvault" => Ok(Self::AlienVault),
            other => Err(ProviderError::InvalidArgument(format!(
                "unknown provider: {other} (expected virustotal, abuseipdb or alienvault)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Indicator kinds
// ---------------------------------------------------------------------------

/// The kind of indicator of compromise being looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IocKind {
    Ip,
    Domain,
    Hash,
    Url,
}

impl IocKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Domain => "domain",
            Self::Hash => "hash",
            Self::Url => "url",
        }
    }
}

impl fmt::Display for IocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IocKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" => Ok(Self::Ip),
            "domain" => Ok(Self::Domain),
            "hash" => Ok(Self::Hash),
            "url" => Ok(Self::Url),
            other => Err(ProviderError::InvalidArgument(format!(
                "unknown indicator kind: {other} (expected ip, domain, hash or url)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// The three provider clients, sharing one credential source.
pub struct Providers {
    virustotal: VirusTotalClient,
    abuseipdb: AbuseIpdbClient,
    alienvault: AlienVaultClient,
    credentials: Arc<dyn CredentialSource>,
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers")
            .field("virustotal", &self.virustotal)
            .field("abuseipdb", &self.abuseipdb)
            .field("alienvault", &self.alienvault)
            .finish_non_exhaustive()
    }
}

impl Providers {
    pub fn new(config: &ProvidersConfig, credentials: Arc<dyn CredentialSource>) -> Result<Self> {
        Ok(Self {
            virustotal: VirusTotalClient::new(&config.virustotal, Arc::clone(&credentials))?,
            abuseipdb: AbuseIpdbClient::new(&config.abuseipdb, Arc::clone(&credentials))?,
            alienvault: AlienVaultClient::new(&config.alienvault, Arc::clone(&credentials))?,
            credentials,
        })
    }

    pub fn virustotal(&self) -> &VirusTotalClient {
        &self.virustotal
    }

    pub fn abuseipdb(&self) -> &AbuseIpdbClient {
        &self.abuseipdb
    }

    pub fn alienvault(&self) -> &AlienVaultClient {
        &self.alienvault
    }

    /// Look up one indicator with the provider's matching operation.
    ///
    /// VirusTotal URL lookups submit the URL and fetch its analysis.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Unsupported`] when the provider has no lookup for
    /// `kind` (AbuseIPDB only checks IPs).
    #[instrument(skip(self))]
    pub async fn lookup(
        &self,
        provider: ProviderKind,
        kind: IocKind,
        value: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let (id, user) = (integration_id, user_id);
        match (provider, kind) {
            (ProviderKind::VirusTotal, IocKind::Ip) => {
                self.virustotal.check_ip(value, id, user).await
            }
            (ProviderKind::VirusTotal, IocKind::Domain) => {
                self.virustotal.check_domain(value, id, user).await
            }
            (ProviderKind::VirusTotal, IocKind::Hash) => {
                self.virustotal.check_hash(value, id, user).await
            }
            (ProviderKind::VirusTotal, IocKind::Url) => {
                self.virustotal.scan_url(value, id, user).await
            }
            (ProviderKind::AbuseIpdb, IocKind::Ip) => {
                self.abuseipdb.check_ip(value, id, user).await
            }
            (ProviderKind::AlienVault, IocKind::Ip) => {
                self.alienvault.check_ip(value, id, user).await
            }
            (ProviderKind::AlienVault, IocKind::Domain) => {
                self.alienvault.check_domain(value, id, user).await
            }
            (ProviderKind::AlienVault, IocKind::Hash) => {
                self.alienvault.check_hash(value, id, user).await
            }
            (ProviderKind::AlienVault, IocKind::Url) => {
                self.alienvault.check_url(value, id, user).await
            }
            (provider, kind) => Err(ProviderError::Unsupported {
                provider,
                kind: kind.to_string(),
            }),
        }
    }

    /// The integration id to dispatch with: `pinned` when given, otherwise
    /// the user's default (or fallback) integration for `provider`.
    #[instrument(skip(self))]
    pub async fn resolve_integration(
        &self,
        provider: ProviderKind,
        user_id: &str,
        pinned: Option<&str>,
    ) -> Result<String> {
        if let Some(id) = pinned {
            return Ok(id.to_string());
        }

        let resolved = self
            .credentials
            .default_integration_id(provider.as_str(), user_id)
            .await
            .map_err(|e| ProviderError::from_vault(provider, e))?;

        match resolved {
            Some(integration_id) => {
                debug!(%integration_id, "resolved implicit integration");
                Ok(integration_id)
            }
            None => Err(ProviderError::IntegrationUnavailable {
                provider,
                reason: "no active integration configured for this user".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("VirusTotal".parse::<ProviderKind>().unwrap(), ProviderKind::VirusTotal);
        assert_eq!(" ABUSEIPDB ".parse::<ProviderKind>().unwrap(), ProviderKind::AbuseIpdb);
        assert_eq!("alienvault".parse::<ProviderKind>().unwrap(), ProviderKind::AlienVault);
        assert!("shodan".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn stored_names_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn ioc_kinds_parse() {
        assert_eq!("IP".parse::<IocKind>().unwrap(), IocKind::Ip);
        assert_eq!("url".parse::<IocKind>().unwrap(), IocKind::Url);
        assert!("email".parse::<IocKind>().is_err());
    }

    #[test]
    fn display_uses_human_names() {
        assert_eq!(ProviderKind::AbuseIpdb.to_string(), "AbuseIPDB");
        assert_eq!(ProviderKind::AlienVault.to_string(), "AlienVault OTX");
    }
}
