//! AlienVault OTX API v1 client.
//!
//! Every lookup reads the `general` section of an indicator. URLs are
//! base64url-encoded into a single path segment.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use tracing::instrument;

use crate::dispatcher::{
    CredentialSource, Dispatcher, Outbound, ProviderAuth, require, secret_header,
};
use crate::error::Result;
use crate::registry::ProviderKind;
use crate::response::ProviderResponse;
use crate::settings::ProviderSettings;

/// Default AlienVault OTX API base URL.
pub const DEFAULT_BASE_URL: &str = "https://otx.alienvault.com/api/v1";

struct OtxAuth;

impl ProviderAuth for OtxAuth {
    fn auth_headers(&self, api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-otx-api-key", secret_header(ProviderKind::AlienVault, api_key)?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[derive(Debug)]
pub struct AlienVaultClient {
    dispatcher: Dispatcher,
}

impl AlienVaultClient {
    pub fn new(settings: &ProviderSettings, credentials: Arc<dyn CredentialSource>) -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::new(
                ProviderKind::AlienVault,
                settings,
                Box::new(OtxAuth),
                credentials,
            )?,
        })
    }

    /// `GET /indicators/IPv4/{ip}/general`
    #[instrument(skip(self))]
    pub async fn check_ip(
        &self,
        ip: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let ip = require("ip", ip)?;
        self.general("IPv4", ip, integration_id, user_id).await
    }

    /// `GET /indicators/domain/{domain}/general`
    #[instrument(skip(self))]
    pub async fn check_domain(
        &self,
        domain: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let domain = require("domain", domain)?;
        self.general("domain", domain, integration_id, user_id).await
    }

    /// `GET /indicators/file/{hash}/general`
    #[instrument(skip(self))]
    pub async fn check_hash(
        &self,
        hash: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let hash = require("hash", hash)?;
        self.general("file", hash, integration_id, user_id).await
    }

    /// `GET /indicators/url/{base64url(url)}/general`
    #[instrument(skip(self))]
    pub async fn check_url(
        &self,
        url: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let url = require("url", url)?;
        let encoded = URL_SAFE_NO_PAD.encode(url);
        self.general("url", &encoded, integration_id, user_id).await
    }

    async fn general(
        &self,
        section: &str,
        indicator: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let request = Outbound::new(["indicators", section, indicator, "general"]);
        self.dispatcher.dispatch(request, integration_id, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otx_header_name() {
        let headers = OtxAuth.auth_headers("otx-key").unwrap();
        assert_eq!(headers.get("x-otx-api-key").unwrap(), "otx-key");
    }

    #[test]
    fn url_encoding_is_path_safe() {
        let encoded = URL_SAFE_NO_PAD.encode("https://example.com/a?b=c&d=e~");
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('='));
    }
}
