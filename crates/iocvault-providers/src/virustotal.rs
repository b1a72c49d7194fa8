//! VirusTotal API v3 client.
//!
//! Lookups for IPs, domains and file hashes, URL submission, and analysis
//! retrieval. The key travels in the `x-apikey` header.

use std::sync::Arc;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use crate::dispatcher::{
    CredentialSource, Dispatcher, Outbound, ProviderAuth, require, secret_header,
};
use crate::error::{ProviderError, Result};
use crate::registry::ProviderKind;
use crate::response::ProviderResponse;
use crate::settings::ProviderSettings;

/// Default VirusTotal API base URL.
pub const DEFAULT_BASE_URL: &str = "https://www.virustotal.com/api/v3";

struct VirusTotalAuth;

impl ProviderAuth for VirusTotalAuth {
    fn auth_headers(&self, api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-apikey", secret_header(ProviderKind::VirusTotal, api_key)?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

/// VirusTotal API v3 client.
#[derive(Debug)]
pub struct VirusTotalClient {
    dispatcher: Dispatcher,
}

impl VirusTotalClient {
    pub fn new(settings: &ProviderSettings, credentials: Arc<dyn CredentialSource>) -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::new(
                ProviderKind::VirusTotal,
                settings,
                Box::new(VirusTotalAuth),
                credentials,
            )?,
        })
    }

    /// `GET /ip_addresses/{ip}`
    #[instrument(skip(self))]
    pub async fn check_ip(
        &self,
        ip: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let ip = require("ip", ip)?;
        self.dispatcher
            .dispatch(Outbound::new(["ip_addresses", ip]), integration_id, user_id)
            .await
    }

    /// `GET /domains/{domain}`
    #[instrument(skip(self))]
    pub async fn check_domain(
        &self,
        domain: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let domain = require("domain", domain)?;
        self.dispatcher
            .dispatch(Outbound::new(["domains", domain]), integration_id, user_id)
            .await
    }

    /// `GET /files/{hash}`
    #[instrument(skip(self))]
    pub async fn check_hash(
        &self,
        hash: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let hash = require("hash", hash)?;
        self.dispatcher
            .dispatch(Outbound::new(["files", hash]), integration_id, user_id)
            .await
    }

    /// `POST /urls` with form field `url`. The answer carries an analysis id.
    #[instrument(skip(self))]
    pub async fn analyze_url(
        &self,
        url: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let request = submit_request(require("url", url)?);
        self.dispatcher.dispatch(request, integration_id, user_id).await
    }

    /// `GET /analyses/{id}`
    #[instrument(skip(self))]
    pub async fn url_analysis(
        &self,
        analysis_id: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let request = analysis_request(require("analysis id", analysis_id)?);
        self.dispatcher.dispatch(request, integration_id, user_id).await
    }

    /// Submit a URL, then fetch its analysis by the id the submission
    /// returned.
    ///
    /// Both calls are counted, and only once the analysis has been fetched:
    /// a failure at either step leaves the usage counter unchanged.
    #[instrument(skip(self))]
    pub async fn scan_url(
        &self,
        url: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let url = require("url", url)?;
        let submitted = self
            .dispatcher
            .call(submit_request(url), integration_id, user_id)
            .await?;
        let analysis_id = submitted
            .api_data
            .as_ref()
            .and_then(|data| data.pointer("/data/id"))
            .and_then(|id| id.as_str())
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ProviderError::ProviderCall {
                provider: ProviderKind::VirusTotal,
                status: None,
                message: "URL submission returned no analysis id".into(),
            })?
            .to_string();

        debug!(%analysis_id, "URL submitted, fetching analysis");
        let analysis = self
            .dispatcher
            .call(analysis_request(&analysis_id), integration_id, user_id)
            .await?;

        self.dispatcher
            .record_usage(integration_id, user_id, 2)
            .await?;
        Ok(analysis)
    }
}

fn submit_request(url: &str) -> Outbound {
    Outbound::new(["urls"]).form("url", url)
}

fn analysis_request(analysis_id: &str) -> Outbound {
    Outbound::new(["analyses", analysis_id])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_header_is_sensitive() {
        let headers = VirusTotalAuth.auth_headers("vt-key").unwrap();
        let value = headers.get("x-apikey").unwrap();
        assert_eq!(value, "vt-key");
        assert!(value.is_sensitive());
        assert!(!format!("{headers:?}").contains("vt-key"));
    }

    #[test]
    fn key_with_newline_is_rejected() {
        let result = VirusTotalAuth.auth_headers("bad\nkey");
        assert!(matches!(result, Err(ProviderError::IntegrationUnavailable { .. })));
    }

    #[test]
    fn blank_values_rejected() {
        assert!(require("ip", "  ").is_err());
        assert_eq!(require("ip", " 8.8.8.8 ").unwrap(), "8.8.8.8");
    }
}
