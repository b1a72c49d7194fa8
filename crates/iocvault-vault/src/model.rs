//! Integration records and the inputs that create, patch and filter them.
//!
//! Nothing in here carries an encrypted envelope. Types that hold a
//! plaintext API key implement `Debug` by hand so keys never reach logs.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Maximum length of `provider` and `name`.
pub const MAX_LABEL_LEN: usize = 100;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A stored integration, without key material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    pub user_id: String,
    /// Provider name, e.g. `virustotal`.
    pub provider: String,
    /// User-chosen label.
    pub name: String,
    pub is_active: bool,
    pub is_default: bool,
    /// Provider-specific settings; opaque to the vault.
    pub configuration: Option<serde_json::Value>,
    /// Successful outbound dispatches made through this integration.
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The caller-facing view of an integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSummary {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub is_active: bool,
    pub is_default: bool,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Integration> for IntegrationSummary {
    fn from(integration: &Integration) -> Self {
        Self {
            id: integration.id.clone(),
            provider: integration.provider.clone(),
            name: integration.name.clone(),
            is_active: integration.is_active,
            is_default: integration.is_default,
            usage_count: integration.usage_count,
            created_at: integration.created_at,
            updated_at: integration.updated_at,
        }
    }
}

impl From<Integration> for IntegrationSummary {
    fn from(integration: Integration) -> Self {
        Self::from(&integration)
    }
}

/// Whether a provider has a usable integration for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
    pub provider: String,
    pub is_active: bool,
    pub has_api_key: bool,
}

/// A decrypted key together with the integration it belongs to.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedApiKey {
    pub api_key: String,
    pub integration_id: String,
    pub provider: String,
}

impl std::fmt::Debug for DecryptedApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedApiKey")
            .field("api_key", &"<redacted>")
            .field("integration_id", &self.integration_id)
            .field("provider", &self.provider)
            .finish()
    }
}

/// An integration selected for use together with its decrypted key.
#[derive(Clone)]
pub struct ResolvedCredential {
    pub integration: Integration,
    pub api_key: String,
}

impl std::fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("integration", &self.integration)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Input for [`IntegrationDirectory::create`](crate::IntegrationDirectory::create).
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIntegration {
    pub provider: String,
    pub name: String,
    pub api_key: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub configuration: Option<serde_json::Value>,
}

impl NewIntegration {
    pub fn new(provider: &str, name: &str, api_key: &str) -> Self {
        Self {
            provider: provider.to_string(),
            name: name.to_string(),
            api_key: api_key.to_string(),
            ..Self::default()
        }
    }

    /// Request that this integration becomes the provider default.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), VaultError> {
        validate_label("provider", &self.provider)?;
        validate_label("name", &self.name)?;
        if self.api_key.is_empty() {
            return Err(VaultError::InvalidArgument("apiKey must not be empty".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for NewIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewIntegration")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .field("is_default", &self.is_default)
            .field("configuration", &self.configuration)
            .finish()
    }
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationPatch {
    pub name: Option<String>,
    pub api_key: Option<String>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
    pub configuration: Option<serde_json::Value>,
}

impl IntegrationPatch {
    pub(crate) fn validate(&self) -> Result<(), VaultError> {
        if let Some(name) = &self.name {
            validate_label("name", name)?;
        }
        if self.api_key.as_deref() == Some("") {
            return Err(VaultError::InvalidArgument("apiKey must not be empty".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for IntegrationPatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationPatch")
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("is_active", &self.is_active)
            .field("is_default", &self.is_default)
            .field("configuration", &self.configuration)
            .finish()
    }
}

fn validate_label(field: &str, value: &str) -> Result<(), VaultError> {
    if value.trim().is_empty() {
        return Err(VaultError::InvalidArgument(format!("{field} must not be empty")));
    }
    if value.chars().count() > MAX_LABEL_LEN {
        return Err(VaultError::InvalidArgument(format!(
            "{field} must be at most {MAX_LABEL_LEN} characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Listing filters
// ---------------------------------------------------------------------------

/// Activity state used by [`ListFilter::statuses`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveStatus {
    Active,
    Inactive,
}

impl ActiveStatus {
    pub fn as_bool(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl FromStr for ActiveStatus {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "true" => Ok(Self::Active),
            "inactive" | "false" => Ok(Self::Inactive),
            other => Err(VaultError::InvalidArgument(format!(
                "unknown status filter: {other}"
            ))),
        }
    }
}

/// Composable filters for listing. The default matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    /// Keep integrations whose provider is one of these. Empty = any.
    #[serde(default)]
    pub providers: Vec<String>,
    /// Keep integrations in one of these states. Empty or both = any.
    #[serde(default)]
    pub statuses: Vec<ActiveStatus>,
    /// Case-insensitive substring of `name` or `provider`.
    #[serde(default)]
    pub search: Option<String>,
}

impl ListFilter {
    /// The single `is_active` value to filter on, if the status selection
    /// narrows anything.
    pub(crate) fn active_constraint(&self) -> Option<bool> {
        let wants_active = self.statuses.contains(&ActiveStatus::Active);
        let wants_inactive = self.statuses.contains(&ActiveStatus::Inactive);
        match (wants_active, wants_inactive) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        }
    }

    pub(crate) fn matches_search(&self, integration: &Integration) -> bool {
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                integration.name.to_lowercase().contains(&term)
                    || integration.provider.to_lowercase().contains(&term)
            }
        }
    }
}
