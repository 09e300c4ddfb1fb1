//! HTTP transport seam.
//!
//! [`Transport`] is the narrow set of requests the session logic needs.
//! [`ReqwestTransport`] implements it with a [`reqwest::Client`] that owns
//! its own cookie jar, so every transport instance is one independent
//! upstream session.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::TransportError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("busstop-poller/", env!("CARGO_PKG_VERSION"));

/// Requests the session client issues against the upstream site.
pub trait Transport: Send + Sync {
    /// `GET` a page and return its body as text.
    fn get_text(&self, url: &str) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// `POST` an `application/x-www-form-urlencoded` body and return the
    /// response text.
    fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// `POST` a JSON body with extra request headers and decode the JSON
    /// response.
    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<serde_json::Value, TransportError>> + Send;
}

/// Tunables for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// reqwest-backed transport with a private cookie store.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with a fresh cookie jar.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`TransportError::Status`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn header_map(headers: &[(&str, &str)]) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidHeader(format!("{name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidHeader(format!("{name}: {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

impl Transport for ReqwestTransport {
    async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.text().await?)
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String, TransportError> {
        let response = self.client.post(url).form(form).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.text().await?)
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> Result<serde_json::Value, TransportError> {
        let response = self
            .client
            .post(url)
            .headers(Self::header_map(headers)?)
            .json(body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}
