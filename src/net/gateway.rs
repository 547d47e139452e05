//! Request gateway: the single path every API call takes.
//!
//! DESIGN
//! ======
//! Outgoing requests get `Authorization: Bearer <token>` from the current
//! session. A 401/419 answer triggers one token refresh and one resend; the
//! retry budget travels in an `Attempt` wrapper so the caller's request is
//! never mutated. Failures that are not recovered are translated into a
//! user-facing message, published to the [`ErrorNotice`], and returned to
//! the caller unchanged.
//!
//! A failed refresh is returned as-is: the session store has already signed
//! out by then, so no notice is published for it.

#[cfg(test)]
#[path = "gateway_test.rs"]
mod gateway_test;

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::transport::Transport;
use super::types::{ApiError, ApiRequest, ApiResponse};
use crate::state::notice::ErrorNotice;
use crate::state::session::SessionStore;

/// Refresh-and-resend budget per request.
const MAX_AUTH_RETRIES: u8 = 1;

pub const MSG_NOT_AUTHORIZED: &str = "not authorized";
pub const MSG_NOT_FOUND: &str = "resource not found";
pub const MSG_SERVER_ERROR: &str = "server error, try again later";
pub const MSG_UNKNOWN: &str = "unknown error occurred";

/// User-facing text for a failure: the server's own message when it sent
/// one, else a fixed message per status.
#[must_use]
pub fn user_message(error: &ApiError) -> String {
    if let Some(message) = error.server_message() {
        return message.to_owned();
    }
    match error.status() {
        Some(403) => MSG_NOT_AUTHORIZED,
        Some(404) => MSG_NOT_FOUND,
        Some(500) => MSG_SERVER_ERROR,
        _ => MSG_UNKNOWN,
    }
    .to_owned()
}

/// One request on its way through the gateway.
struct Attempt {
    request: ApiRequest,
    auth_retries: u8,
    /// Token obtained by a refresh for this request; wins over the session's.
    refreshed_token: Option<String>,
}

impl Attempt {
    fn new(request: ApiRequest) -> Self {
        Self { request, auth_retries: 0, refreshed_token: None }
    }

    fn can_refresh(&self, error: &ApiError) -> bool {
        error.is_auth_expired() && self.auth_retries < MAX_AUTH_RETRIES
    }
}

#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
    session: SessionStore,
    notice: ErrorNotice,
}

impl Gateway {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session: SessionStore, notice: ErrorNotice) -> Self {
        Self { transport, session, notice }
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    #[must_use]
    pub fn notice(&self) -> &ErrorNotice {
        &self.notice
    }

    /// Send `request`, refreshing the token once on 401/419.
    ///
    /// # Errors
    ///
    /// Returns the refresh failure if the token could not be renewed, or the
    /// original failure after publishing a notice for it.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut attempt = Attempt::new(request);
        loop {
            let token = attempt.refreshed_token.clone().or_else(|| self.session.access_token());
            let outgoing = attempt.request.clone().with_bearer(token.as_deref());

            let error = match self.transport.send(&outgoing).await.and_then(ApiResponse::into_result) {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            if attempt.can_refresh(&error) {
                attempt.auth_retries += 1;
                tracing::debug!(
                    method = %outgoing.method,
                    path = %outgoing.path,
                    status = ?error.status(),
                    "access token rejected; refreshing"
                );
                attempt.refreshed_token = Some(self.session.refresh().await?);
                continue;
            }

            let message = user_message(&error);
            tracing::warn!(
                method = %outgoing.method,
                path = %outgoing.path,
                status = ?error.status(),
                retried = attempt.auth_retries > 0,
                %message,
                "request failed"
            );
            self.notice.set(message);
            return Err(error);
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let mut request = ApiRequest::new(method, path);
        request.body = body;
        self.send(request).await?.json()
    }

    /// # Errors
    ///
    /// See [`Gateway::send`]; also fails if the body does not decode as `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(Method::GET, path, None).await
    }

    /// # Errors
    ///
    /// See [`Gateway::send`]; also fails if the body does not decode as `T`.
    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.send_json(Method::POST, path, Some(body)).await
    }

    /// # Errors
    ///
    /// See [`Gateway::send`]; also fails if the body does not decode as `T`.
    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.send_json(Method::PUT, path, Some(body)).await
    }

    /// # Errors
    ///
    /// See [`Gateway::send`]; also fails if the body does not decode as `T`.
    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.send_json(Method::PATCH, path, Some(body)).await
    }

    /// # Errors
    ///
    /// See [`Gateway::send`]; also fails if the body does not decode as `T`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(Method::DELETE, path, None).await
    }
}
