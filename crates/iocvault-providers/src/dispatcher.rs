//! The shared dispatch algorithm behind every provider client.
//!
//! A [`Dispatcher`] is parameterized by a provider, its base URL and a
//! [`ProviderAuth`] implementation. Each call:
//!
//! 1. resolves the pinned integration and requires it to be active,
//! 2. decrypts its key and builds the provider's auth headers,
//! 3. issues exactly one outbound request,
//! 4. on a 2xx answer records one usage against the integration and wraps
//!    the body in a [`ProviderResponse`].
//!
//! Any failure leaves the usage counter untouched. Operations made of
//! several calls use [`Dispatcher::call`] and record their usages once the
//! last call has succeeded.

use std::sync::Arc;

use async_trait::async_trait;
use iocvault_vault::{IntegrationDirectory, ResolvedCredential, VaultError};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{ProviderError, Result};
use crate::registry::ProviderKind;
use crate::response::ProviderResponse;
use crate::settings::ProviderSettings;

/// User agent sent on every outbound call.
const USER_AGENT: &str = concat!("iocvault/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// The one thing that differs between providers: how the key is presented.
pub trait ProviderAuth: Send + Sync {
    fn auth_headers(&self, api_key: &str) -> Result<HeaderMap>;
}

/// Where dispatchers get credentials and report usage.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// The pinned integration with its decrypted key; must be active.
    async fn active_credential(
        &self,
        integration_id: &str,
        user_id: &str,
    ) -> std::result::Result<ResolvedCredential, VaultError>;

    /// Id of the integration chosen by default flag then fallback, if any.
    /// Nothing is decrypted.
    async fn default_integration_id(
        &self,
        provider: &str,
        user_id: &str,
    ) -> std::result::Result<Option<String>, VaultError>;

    async fn record_usage(
        &self,
        integration_id: &str,
        user_id: &str,
    ) -> std::result::Result<(), VaultError>;
}

#[async_trait]
impl CredentialSource for IntegrationDirectory {
    async fn active_credential(
        &self,
        integration_id: &str,
        user_id: &str,
    ) -> std::result::Result<ResolvedCredential, VaultError> {
        IntegrationDirectory::active_credential(self, integration_id, user_id).await
    }

    async fn default_integration_id(
        &self,
        provider: &str,
        user_id: &str,
    ) -> std::result::Result<Option<String>, VaultError> {
        Ok(self
            .default_integration(provider, user_id)
            .await?
            .map(|integration| integration.id))
    }

    async fn record_usage(
        &self,
        integration_id: &str,
        user_id: &str,
    ) -> std::result::Result<(), VaultError> {
        IntegrationDirectory::record_usage(self, integration_id, user_id).await
    }
}

/// Turn a decrypted key into a header value that is never printed.
pub(crate) fn secret_header(provider: ProviderKind, api_key: &str) -> Result<HeaderValue> {
    let mut value =
        HeaderValue::from_str(api_key).map_err(|_| ProviderError::IntegrationUnavailable {
            provider,
            reason: "stored API key is not a valid header value".into(),
        })?;
    value.set_sensitive(true);
    Ok(value)
}

/// Reject blank indicator values before any credential is touched.
pub(crate) fn require<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ProviderError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Outbound requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub(crate) enum Body {
    Empty,
    Form(Vec<(String, String)>),
    Json(Value),
}

/// One outbound request, relative to the provider's base URL.
#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    /// Path segments appended to the base URL; each one is escaped.
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Body,
}

impl Outbound {
    pub(crate) fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub(crate) fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub(crate) fn form(mut self, key: &str, value: &str) -> Self {
        match &mut self.body {
            Body::Form(fields) => fields.push((key.to_string(), value.to_string())),
            body => *body = Body::Form(vec![(key.to_string(), value.to_string())]),
        }
        self
    }

    pub(crate) fn json(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    fn is_post(&self) -> bool {
        !matches!(self.body, Body::Empty)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Resolve, authenticate, call once, account.
pub(crate) struct Dispatcher {
    provider: ProviderKind,
    base_url: Url,
    client: reqwest::Client,
    auth: Box<dyn ProviderAuth>,
    credentials: Arc<dyn CredentialSource>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub(crate) fn new(
        provider: ProviderKind,
        settings: &ProviderSettings,
        auth: Box<dyn ProviderAuth>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self> {
        let base = settings
            .base_url
            .as_deref()
            .unwrap_or(provider.default_base_url());
        let base_url = Url::parse(base.trim_end_matches('/')).map_err(|e| {
            ProviderError::Configuration(format!("invalid {provider} base URL {base}: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Configuration(format!(
                "{provider} base URL {base} cannot carry a path"
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ProviderError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            provider,
            base_url,
            client,
            auth,
            credentials,
        })
    }

    /// Run one request against the integration pinned by `integration_id`
    /// and record one usage if it succeeds.
    pub(crate) async fn dispatch(
        &self,
        request: Outbound,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let response = self.call(request, integration_id, user_id).await?;
        self.record_usage(integration_id, user_id, 1).await?;
        Ok(response)
    }

    /// Like [`Dispatcher::dispatch`] but leaves usage accounting to the
    /// caller. Multi-step operations use this so a failed later step leaves
    /// the counter untouched.
    #[instrument(skip(self, request), fields(provider = %self.provider))]
    pub(crate) async fn call(
        &self,
        request: Outbound,
        integration_id: &str,
        user_id: &str,
    ) -> Result<ProviderResponse> {
        let credential = self.resolve(integration_id, user_id).await?;
        let headers = self.auth.auth_headers(&credential.api_key)?;
        let url = self.url(&request)?;
        debug!(path = url.path(), post = request.is_post(), "dispatching");

        let builder = if request.is_post() {
            self.client.post(url)
        } else {
            self.client.get(url)
        };
        let builder = match request.body {
            Body::Empty => builder,
            Body::Form(fields) => builder.form(&fields),
            Body::Json(body) => builder.json(&body),
        };

        let api_data = self.send(builder.headers(headers)).await?;
        Ok(ProviderResponse::success(self.provider, api_data))
    }

    /// Count `calls` successful upstream calls against one integration.
    pub(crate) async fn record_usage(
        &self,
        integration_id: &str,
        user_id: &str,
        calls: u32,
    ) -> Result<()> {
        for _ in 0..calls {
            self.credentials
                .record_usage(integration_id, user_id)
                .await
                .map_err(|e| ProviderError::from_vault(self.provider, e))?;
        }
        debug!(%integration_id, calls, "usage recorded");
        Ok(())
    }

    async fn resolve(&self, integration_id: &str, user_id: &str) -> Result<ResolvedCredential> {
        let credential = self
            .credentials
            .active_credential(integration_id, user_id)
            .await
            .map_err(|e| ProviderError::from_vault(self.provider, e))?;

        if credential.integration.provider != self.provider.as_str() {
            return Err(ProviderError::IntegrationUnavailable {
                provider: self.provider,
                reason: format!(
                    "integration {integration_id} belongs to {}",
                    credential.integration.provider
                ),
            });
        }
        Ok(credential)
    }

    fn url(&self, request: &Outbound) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ProviderError::Configuration(format!("{} base URL cannot carry a path", self.provider))
            })?
            .pop_if_empty()
            .extend(&request.segments);

        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timed out: {e}")
            } else {
                format!("request failed: {e}")
            };
            warn!(provider = %self.provider, error = %e, "outbound call failed");
            ProviderError::ProviderCall {
                provider: self.provider,
                status: None,
                message,
            }
        })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| ProviderError::ProviderCall {
                provider: self.provider,
                status: Some(status.as_u16()),
                message: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            let message = upstream_message(status, &body_text);
            warn!(
                provider = %self.provider,
                status = status.as_u16(),
                detail = %message,
                "provider rejected call"
            );
            return Err(ProviderError::ProviderCall {
                provider: self.provider,
                status: Some(status.as_u16()),
                message,
            });
        }

        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body_text).unwrap_or(Value::String(body_text)))
    }
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"error": {"message"}}`, `{"errors": [{"detail"}]}`,
/// `{"detail"}`, `{"message"}` and `{"error": "..."}`; anything else falls
/// back to the raw body.
fn upstream_message(status: reqwest::StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().and_then(|json| {
        json.pointer("/error/message")
            .or_else(|| json.pointer("/errors/0/detail"))
            .or_else(|| json.get("detail"))
            .or_else(|| json.get("message"))
            .or_else(|| json.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let detail = detail.unwrap_or_else(|| body.trim().to_string());
    if detail.is_empty() {
        format!("request failed with status code {}", status.as_u16())
    } else {
        format!("request failed with status code {}: {detail}", status.as_u16())
    }
}
