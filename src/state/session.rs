//! Session store: access token + user profile, persisted and shared.
//!
//! ARCHITECTURE
//! ============
//! The current `Session` lives in a `watch` channel so views can react to
//! sign-in changes. Every mutation replaces the whole record in local storage
//! under [`AUTH_STORAGE_KEY`]; readers never see a token without its user or
//! the other way round. A background task started by
//! [`SessionStore::spawn_storage_sync`] reloads the record whenever another
//! tab changes it.
//!
//! Auth endpoints are called on the raw transport, not through the retrying
//! gateway, so a 401 from the reissue endpoint cannot trigger another refresh.
//!
//! REFRESH COALESCING
//! ==================
//! At most one reissue exchange runs at a time. The first caller installs a
//! shared future in `refreshing`; later callers clone and await it. The
//! exchange clears the slot itself as soon as the server answers, tagged with
//! a generation number so it can never clear a newer exchange.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::storage::LocalStorage;
use crate::net::transport::Transport;
use crate::net::types::{ApiError, ApiRequest, Credentials, LoginResponse, ReissueResponse};
use crate::router::{RouteName, Router, route_by_name};

/// Local storage key of the persisted session record.
pub const AUTH_STORAGE_KEY: &str = "auth";

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const REISSUE_PATH: &str = "/auth/reissue-token";

// =============================================================================
// SESSION RECORD
// =============================================================================

/// The persisted record: `{"accessToken": string|null, "user": object|null}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user: Option<Value>,
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Parse a stored record. Anything unparsable is an empty session.
    #[must_use]
    pub fn from_record(raw: &str) -> Self {
        match serde_json::from_str::<Session>(raw) {
            Ok(mut session) => {
                session.access_token = normalize_token(session.access_token.as_deref());
                if session.user.as_ref().is_some_and(Value::is_null) {
                    session.user = None;
                }
                session
            }
            Err(error) => {
                tracing::debug!(%error, "discarding malformed session record");
                Self::default()
            }
        }
    }
}

fn normalize_token(token: Option<&str>) -> Option<String> {
    token.filter(|t| !t.is_empty()).map(ToOwned::to_owned)
}

fn load_session(storage: &LocalStorage) -> Session {
    match storage.get_item(AUTH_STORAGE_KEY) {
        Ok(Some(raw)) => Session::from_record(&raw),
        Ok(None) => Session::default(),
        Err(error) => {
            tracing::warn!(%error, "session record unreadable; treating as signed out");
            Session::default()
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

type PendingRefresh = Shared<BoxFuture<'static, Result<String, ApiError>>>;

struct InFlight {
    generation: u64,
    pending: PendingRefresh,
}

#[derive(Default)]
struct RefreshSlot {
    next_generation: u64,
    in_flight: Option<InFlight>,
}

struct SessionInner {
    transport: Arc<dyn Transport>,
    storage: LocalStorage,
    router: Router,
    state: watch::Sender<Session>,
    refreshing: Mutex<RefreshSlot>,
}

/// Shared handle to the session. Clones see the same state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

impl SessionStore {
    /// Create a store, loading whatever session `storage` already holds.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, storage: LocalStorage, router: Router) -> Self {
        let initial = load_session(&storage);
        Self {
            inner: Arc::new(SessionInner {
                transport,
                storage,
                router,
                state: watch::Sender::new(initial),
                refreshing: Mutex::new(RefreshSlot::default()),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // reads
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner.state.borrow().access_token.clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<Value> {
        self.inner.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Watch the session for changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    // -------------------------------------------------------------------------
    // local mutations
    // -------------------------------------------------------------------------

    /// Reload the session from storage. Subscribers are only woken when the
    /// loaded value differs from the current one.
    pub fn initialize_from_storage(&self) {
        let changed = self.inner.state.send_if_modified(|current| {
            let loaded = load_session(&self.inner.storage);
            if *current == loaded {
                return false;
            }
            *current = loaded;
            true
        });
        if changed {
            tracing::debug!(authenticated = self.is_authenticated(), "session reloaded from storage");
        }
    }

    /// Replace the access token, keeping the user.
    pub fn set_tokens(&self, access_token: Option<&str>) {
        let token = normalize_token(access_token);
        self.update(|s| s.access_token = token);
    }

    /// Replace the user profile, keeping the token.
    pub fn set_user(&self, user: Option<Value>) {
        let user = user.filter(|u| !u.is_null());
        self.update(|s| s.user = user);
    }

    /// Storage is written while the watch lock is held, so the persisted
    /// record always matches the latest in-memory session.
    fn update(&self, apply: impl FnOnce(&mut Session)) {
        self.inner.state.send_modify(|session| {
            apply(session);
            self.persist(session);
        });
    }

    fn persist(&self, session: &Session) {
        let result = serde_json::to_string(session)
            .map_err(|e| e.to_string())
            .and_then(|raw| self.inner.storage.set_item(AUTH_STORAGE_KEY, &raw).map_err(|e| e.to_string()));
        if let Err(error) = result {
            tracing::warn!(%error, "failed to persist session record");
        }
    }

    fn clear(&self) {
        self.inner.state.send_modify(|session| {
            *session = Session::default();
            if let Err(error) = self.inner.storage.remove_item(AUTH_STORAGE_KEY) {
                tracing::warn!(%error, "failed to remove session record");
            }
        });
    }

    // -------------------------------------------------------------------------
    // server operations
    // -------------------------------------------------------------------------

    /// Sign in with `credentials`. Token and user are stored in one write.
    ///
    /// # Errors
    ///
    /// Returns the transport or server error unchanged; nothing is stored.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        let request = ApiRequest::post(LOGIN_PATH)
            .with_json(json!({ "email": credentials.email, "password": credentials.password }));
        let payload: LoginResponse = self.inner.transport.send(&request).await?.into_result()?.json()?;

        let token = normalize_token(payload.access_token.as_deref());
        let user = payload.user.clone().filter(|u| !u.is_null());
        self.update(|s| {
            s.access_token = token;
            s.user = user;
        });
        tracing::info!(email = %credentials.email, "signed in");
        Ok(payload)
    }

    /// Sign out. The server call is best effort; local state is always cleared
    /// and the application returns to the landing page.
    pub async fn logout(&self) {
        let request = ApiRequest::post(LOGOUT_PATH).with_bearer(self.access_token().as_deref());
        match self.inner.transport.send(&request).await {
            Ok(response) if !response.is_success() => {
                tracing::debug!(status = response.status, "logout rejected by server; clearing anyway");
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, "logout request failed; clearing anyway"),
        }

        self.clear();
        self.inner.router.navigate(route_by_name(RouteName::Home).path, false);
        tracing::info!("signed out");
    }

    /// Exchange the session cookie for a new access token.
    ///
    /// Concurrent callers share one exchange and all receive its result.
    ///
    /// # Errors
    ///
    /// Returns the exchange failure after the session has been signed out.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let pending = {
            let mut slot = self.inner.refreshing.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(in_flight) = &slot.in_flight {
                tracing::debug!(generation = in_flight.generation, "joining in-flight token refresh");
                in_flight.pending.clone()
            } else {
                slot.next_generation += 1;
                let generation = slot.next_generation;
                let store = self.clone();
                let pending = async move { store.run_refresh(generation).await }.boxed().shared();
                slot.in_flight = Some(InFlight { generation, pending: pending.clone() });
                pending
            }
        };
        pending.await
    }

    async fn run_refresh(&self, generation: u64) -> Result<String, ApiError> {
        let result = self.reissue().await;
        self.finish_refresh(generation);

        match result {
            Ok(token) => {
                self.set_tokens(Some(&token));
                tracing::info!(generation, "access token refreshed");
                Ok(token)
            }
            Err(error) => {
                tracing::warn!(generation, %error, "token refresh failed; signing out");
                self.logout().await;
                Err(error)
            }
        }
    }

    async fn reissue(&self) -> Result<String, ApiError> {
        let request = ApiRequest::post(REISSUE_PATH)
            .with_json(json!({}))
            .with_bearer(self.access_token().as_deref());
        let payload: ReissueResponse = self.inner.transport.send(&request).await?.into_result()?.json()?;
        normalize_token(payload.access_token.as_deref())
            .ok_or_else(|| ApiError::Decode("reissue response missing accessToken".to_owned()))
    }

    fn finish_refresh(&self, generation: u64) {
        let mut slot = self.inner.refreshing.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.in_flight.as_ref().is_some_and(|f| f.generation == generation) {
            slot.in_flight = None;
        }
    }

    /// `true` while a reissue exchange is outstanding.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.lock().unwrap_or_else(PoisonError::into_inner).in_flight.is_some()
    }

    // -------------------------------------------------------------------------
    // cross-tab sync
    // -------------------------------------------------------------------------

    /// Reload the session whenever another tab changes or clears the record.
    ///
    /// The task holds only a weak reference and exits once the store is gone
    /// or the storage area closes.
    pub fn spawn_storage_sync(&self) -> JoinHandle<()> {
        let mut events = self.inner.storage.subscribe();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !event.affects(AUTH_STORAGE_KEY) {
                    continue;
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                SessionStore { inner }.initialize_from_storage();
            }
        })
    }
}
