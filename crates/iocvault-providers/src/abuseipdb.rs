//! AbuseIPDB API v2 client: IP reputation checks and abuse reports.

use std::sync::Arc;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::json;
use tracing::instrument;

use crate::dispatcher::{
    CredentialSource, Dispatcher, Outbound, ProviderAuth, require, secret_header,
};
use crate::error::{ProviderError, Result};
use crate::registry::ProviderKind;
use crate::response::ProviderResponse;
use crate::settings::ProviderSettings;

/// Default AbuseIPDB API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.abuseipdb.com/api/v2";

/// Report age window, in days, for IP checks.
const MAX_AGE_IN_DAYS: &str = "90";

struct AbuseIpdbAuth;

impl ProviderAuth for AbuseIpdbAuth {
    fn auth_headers(&self, api_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("key", secret_header(ProviderKind::AbuseIpdb, api_key)?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[derive(Debug)]
pub struct AbuseIpdbClient {
    dispatcher: Dispatcher,
}

impl AbuseIpdbClient {
    pub fn new(settings: &ProviderSettings, credentials: Arc<dyn CredentialSource>) -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::new(
                ProviderKind::AbuseIpdb,
                settings,
                Box::new(AbuseIpdbAuth),
                credentials,
            )?,
        })
    }

    /// `GET /check?ipAddress={ip}&maxAgeInDays=90&verbose=true`
    #[instrument(skip(self))]
    pub async fn check_ip(
        &self,
        ip: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let ip = require("ip", ip)?;
        let request = Outbound::new(["check"])
            .query("ipAddress", ip)
            .query("maxAgeInDays", MAX_AGE_IN_DAYS)
            .query("verbose", "true");
        self.dispatcher.dispatch(request, integration_id, user_id).await
    }

    /// `POST /report` with `{ ip, categories: "c1,c2", comment }`.
    ///
    /// A successful report counts as one usage, like a check.
    #[instrument(skip(self, comment))]
    pub async fn report_ip(
        &self,
        ip: &str,
        categories: &[u32],
        comment: &str,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let ip = require("ip", ip)?;
        if categories.is_empty() {
            return Err(ProviderError::InvalidArgument(
                "at least one abuse category is required".into(),
            ));
        }
        let comment = require("comment", comment)?;

        let body = json!({
            "ip": ip,
            "categories": join_categories(categories),
            "comment": comment,
        });
        self.dispatcher
            .dispatch(Outbound::new(["report"]).json(body), integration_id, user_id)
            .await
    }
}

fn join_categories(categories: &[u32]) -> String {
    categories
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_join_with_commas() {
        assert_eq!(join_categories(&[18, 22]), "18,22");
        assert_eq!(join_categories(&[4]), "4");
    }

    #[test]
    fn key_header_carries_the_key() {
        let headers = AbuseIpdbAuth.auth_headers("abuse-key").unwrap();
        assert_eq!(headers.get("key").unwrap(), "abuse-key");
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
    }
}
