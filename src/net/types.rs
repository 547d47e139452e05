//! Wire types shared by the transport, the gateway, and the session store.
//!
//! DESIGN
//! ======
//! A response is data, not an error: the transport hands back every HTTP
//! status it receives and only fails when no response arrived at all. The
//! gateway decides which statuses are failures.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by API calls.
///
/// `Clone` so a single coalesced refresh result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("request failed with status {status}")]
    Status {
        status: u16,
        /// Server-provided `message` field, when the body carried one.
        message: Option<String>,
        body: Value,
    },

    /// No response was received (connect failure, reset, timeout).
    #[error("request failed: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),
}

impl ApiError {
    /// Build a status error, lifting a non-empty `message` field out of the body.
    #[must_use]
    pub fn from_status(status: u16, body: Value) -> Self {
        let message = server_message(&body);
        Self::Status { status, message, body }
    }

    /// HTTP status of the failure, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }

    /// Server-provided message, if any.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } => message.as_deref(),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }

    /// `true` for the statuses that signal an expired access token.
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self.status(), Some(401 | 419))
    }
}

fn server_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(ToOwned::to_owned)
}

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

/// An outgoing API request, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API base, e.g. `/auth/login`.
    pub path: String,
    pub body: Option<Value>,
    /// Bearer credential to send. Set by the gateway, never by callers.
    pub bearer: Option<String>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, bearer: None }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_bearer(mut self, token: Option<&str>) -> Self {
        self.bearer = token.filter(|t| !t.is_empty()).map(ToOwned::to_owned);
        self
    }

    /// The `Authorization` header value this request will carry.
    #[must_use]
    pub fn authorization(&self) -> Option<String> {
        self.bearer.as_deref().map(|t| format!("Bearer {t}"))
    }
}

/// A received response. Empty or non-JSON bodies decode to `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into an [`ApiError::Status`].
    ///
    /// # Errors
    ///
    /// Returns the status error when the response is not a success.
    pub fn into_result(self) -> Result<Self, ApiError> {
        if self.is_success() { Ok(self) } else { Err(ApiError::from_status(self.status, self.body)) }
    }

    /// Decode the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Decode`] when the body does not match `T`.
    pub fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

// =============================================================================
// AUTH PAYLOADS
// =============================================================================

/// Sign-in credentials. Serialized as `{email, password}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("email", &self.email).field("password", &"***").finish()
    }
}

/// `POST /auth/login` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub user: Option<Value>,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// `POST /auth/reissue-token` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReissueResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}
