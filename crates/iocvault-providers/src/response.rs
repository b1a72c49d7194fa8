//! The normalized envelope returned by every dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::registry::ProviderKind;

/// Outcome of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// `{ provider, status, apiData?, error?, analysisTimestamp }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    /// Provider name, e.g. `virustotal`.
    pub provider: String,
    pub status: ResponseStatus,
    /// Upstream body, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub analysis_timestamp: DateTime<Utc>,
}

impl ProviderResponse {
    pub fn success(provider: ProviderKind, api_data: Value) -> Self {
        Self {
            provider: provider.as_str().to_string(),
            status: ResponseStatus::Success,
            api_data: Some(api_data),
            error: None,
            analysis_timestamp: Utc::now(),
        }
    }

    /// Render a failed dispatch in-band.
    pub fn failure(provider: ProviderKind, error: &ProviderError) -> Self {
        Self {
            provider: provider.as_str().to_string(),
            status: ResponseStatus::Error,
            api_data: None,
            error: Some(error.to_string()),
            analysis_timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let response =
            ProviderResponse::success(ProviderKind::VirusTotal, serde_json::json!({ "data": {} }));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["provider"], "virustotal");
        assert_eq!(json["status"], "success");
        assert!(json["apiData"].is_object());
        assert!(json.get("error").is_none());
        assert!(json["analysisTimestamp"].is_string());
    }

    #[test]
    fn failure_envelope_carries_message() {
        let err = ProviderError::InvalidArgument("ip must not be empty".into());
        let response = ProviderResponse::failure(ProviderKind::AlienVault, &err);
        let json = serde_json::to_value(&response).unwrap();

        assert!(!response.is_success());
        assert_eq!(json["provider"], "alienvault");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "invalid argument: ip must not be empty");
        assert!(json.get("apiData").is_none());
    }
}
