//! Per-provider client settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outbound call timeout when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Settings for one provider client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// API root. `None` uses the provider's public endpoint.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProviderSettings {
    /// Settings pointing at `base_url`, e.g. a local mock.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: Some(base_url.to_string()),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for all providers, as read from `[providers.<name>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub virustotal: ProviderSettings,
    pub abuseipdb: ProviderSettings,
    pub alienvault: ProviderSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_keeps_defaults() {
        let config: ProvidersConfig = parse(r#"{ "abuseipdb": { "timeout_secs": 5 } }"#);

        assert_eq!(config.abuseipdb.timeout_secs, 5);
        assert_eq!(config.abuseipdb.base_url, None);
        assert_eq!(config.virustotal, ProviderSettings::default());
        assert_eq!(config.alienvault.timeout(), Duration::from_secs(15));
    }

    fn parse(json: &str) -> ProvidersConfig {
        serde_json::from_str(json).unwrap()
    }
}
