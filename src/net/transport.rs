//! HTTP transport seam.
//!
//! DESIGN
//! ======
//! `Transport` is the one trait both the gateway and the session store send
//! through, so tests swap in a scripted implementation. `HttpTransport` is
//! the reqwest-backed implementation: it resolves paths against the API base
//! URL, sends the bearer header when the request carries one, and keeps the
//! server's session cookie in a [`StoredCookies`] jar.

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde_json::Value;

use super::cookies::StoredCookies;
use super::types::{ApiError, ApiRequest, ApiResponse};
use crate::config::ClientConfig;

/// Sends one request and returns whatever response arrived.
///
/// Implementations return `Ok` for every HTTP status and reserve `Err` for
/// requests that produced no response.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

// =============================================================================
// REQWEST TRANSPORT
// =============================================================================

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport for `config.base_url` that keeps cookies in `cookies`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reqwest client cannot be built.
    pub fn new(config: &ClientConfig, cookies: Arc<StoredCookies>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .cookie_provider(cookies)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self { http: builder.build()?, base_url: config.base_url.clone() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = endpoint_url(&self.base_url, &request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        if let Some(auth) = request.authorization() {
            builder = builder.header(AUTHORIZATION, auth);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(method = %request.method, path = %request.path, error = %e, "request failed");
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        tracing::debug!(method = %request.method, path = %request.path, status, "response received");

        Ok(ApiResponse { status, body: parse_body(&text) })
    }
}

/// Join the API base URL and a request path with exactly one `/` between them.
pub(crate) fn endpoint_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Empty and non-JSON bodies become `Null`.
pub(crate) fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or(Value::Null)
}
