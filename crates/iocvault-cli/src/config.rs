//! Application configuration.
//!
//! Reads `config/default.toml` (or the file given with `--config`), then
//! applies environment overrides. A `.env` file is loaded by `main` before
//! this runs, so its values count as environment.
//!
//! | variable | overrides |
//! |---|---|
//! | `IOCVAULT_ENCRYPTION_KEY` (fallback `ENCRYPTION_KEY`) | `security.encryption_key` |
//! | `IOCVAULT_DB_PATH` | `database.path` |
//! | `IOCVAULT_LOG` | `log.level` |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use iocvault_providers::ProvidersConfig;
use serde::Deserialize;

/// Config file read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub providers: ProvidersConfig,
}

/// `[log]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// `[database]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/iocvault.db"),
        }
    }
}

/// `[security]`
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Master secret the encryption key is derived from. Prefer the
    /// environment over the file.
    pub encryption_key: Option<String>,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load from `path` (must exist) or from [`DEFAULT_CONFIG_PATH`] (may
    /// be absent), then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from `lookup`; blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(secret) = get("IOCVAULT_ENCRYPTION_KEY").or_else(|| get("ENCRYPTION_KEY")) {
            self.security.encryption_key = Some(secret);
        }
        if let Some(path) = get("IOCVAULT_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(level) = get("IOCVAULT_LOG") {
            self.log.level = level;
        }
    }

    /// The master secret. Absent or blank is a fatal configuration error.
    pub fn encryption_secret(&self) -> Result<&str> {
        match self.security.encryption_key.as_deref() {
            Some(secret) if !secret.trim().is_empty() => Ok(secret),
            _ => bail!(
                "no encryption key configured; set IOCVAULT_ENCRYPTION_KEY \
                 (or ENCRYPTION_KEY) or security.encryption_key"
            ),
        }
    }
}
