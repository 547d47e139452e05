//! Scripted transport and fixtures shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::net::gateway::Gateway;
use crate::net::transport::Transport;
use crate::net::types::{ApiError, ApiRequest, ApiResponse};
use crate::router::Router;
use crate::state::notice::ErrorNotice;
use crate::state::session::SessionStore;
use crate::state::storage::{LocalStorage, StorageArea};

// =========================================================================
// MockTransport
// =========================================================================

enum Reply {
    Respond(ApiResponse),
    Fail(ApiError),
}

/// Replies are scripted per `"METHOD /path"` and consumed in order.
/// Unscripted requests get a 599 with no message.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<ApiRequest>>,
    latency: Option<Duration>,
}

fn route_key(method: &Method, path: &str) -> String {
    format!("{method} {path}")
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self { latency: Some(latency), ..Self::default() })
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) {
        self.push(method, path, Reply::Respond(ApiResponse { status, body }));
    }

    pub fn fail(&self, method: Method, path: &str, error: ApiError) {
        self.push(method, path, Reply::Fail(error));
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(route_key(&method, path))
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn bearers(&self, method: Method, path: &str) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .map(|r| r.bearer.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::task::yield_now().await;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&route_key(&request.method, &request.path))
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(error)) => Err(error),
            None => Ok(ApiResponse { status: 599, body: Value::Null }),
        }
    }
}

// =========================================================================
// fixtures
// =========================================================================

/// A store wired to `transport` on a fresh in-memory area.
pub fn store_with(transport: Arc<MockTransport>) -> (SessionStore, LocalStorage, Router) {
    let tab = StorageArea::memory().open_tab();
    let router = Router::new();
    let store = SessionStore::new(transport, tab.clone(), router.clone());
    (store, tab, router)
}

/// A gateway plus its store and notice, on a fresh in-memory area.
pub fn gateway_with(transport: Arc<MockTransport>) -> (Gateway, SessionStore, ErrorNotice) {
    let (store, _tab, _router) = store_with(Arc::clone(&transport));
    let notice = ErrorNotice::new();
    let gateway = Gateway::new(transport, store.clone(), notice.clone());
    (gateway, store, notice)
}
