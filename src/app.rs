//! Application context wiring the session, gateway, notice, and router.
//!
//! DESIGN
//! ======
//! One `App` per running front end replaces process-wide singletons: views
//! and commands receive it (or clones of its parts) explicitly. Construction
//! loads the persisted session and starts the storage-sync task, so it must
//! run inside a tokio runtime.

#[cfg(test)]
#[path = "app_test.rs"]
mod app_test;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::net::cookies::StoredCookies;
use crate::net::gateway::Gateway;
use crate::net::transport::{HttpTransport, Transport};
use crate::net::types::{ApiError, Credentials};
use crate::router::{Navigation, Router, post_login_destination};
use crate::state::notice::ErrorNotice;
use crate::state::session::SessionStore;
use crate::state::storage::{LocalStorage, StorageArea};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(#[from] reqwest::Error),
}

pub struct App {
    config: ClientConfig,
    storage: LocalStorage,
    session: SessionStore,
    gateway: Gateway,
    notice: ErrorNotice,
    router: Router,
    sync: JoinHandle<()>,
}

impl App {
    /// Build the app against the real API, persisting under `config.state_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        let storage = StorageArea::directory(&config.state_dir).open_tab();
        let cookies = Arc::new(StoredCookies::new(storage.clone()));
        let transport = Arc::new(HttpTransport::new(&config, cookies)?);
        tracing::debug!(base_url = %config.base_url, state_dir = %config.state_dir.display(), "app configured");
        Ok(Self::with_transport(config, transport, storage))
    }

    /// Build the app on an explicit transport and storage tab.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>, storage: LocalStorage) -> Self {
        let router = Router::new();
        let session = SessionStore::new(Arc::clone(&transport), storage.clone(), router.clone());
        session.initialize_from_storage();
        let notice = ErrorNotice::new();
        let gateway = Gateway::new(transport, session.clone(), notice.clone());
        let sync = session.spawn_storage_sync();
        Self { config, storage, session, gateway, notice, router, sync }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    #[must_use]
    pub fn notice(&self) -> &ErrorNotice {
        &self.notice
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Navigate to `path` through the auth guard.
    pub fn navigate(&self, path: &str) -> Navigation {
        self.router.navigate(path, self.session.is_authenticated())
    }

    /// Sign in, then continue to the destination the sign-in page was opened
    /// for (its `redirect` parameter), or the landing page.
    ///
    /// # Errors
    ///
    /// Returns the login failure unchanged; the location is left as is.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Navigation, ApiError> {
        self.session.login(credentials).await?;
        let destination = post_login_destination(&self.router.current());
        Ok(self.navigate(&destination))
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.sync.abort();
    }
}
