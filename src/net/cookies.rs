//! Cookie jar persisted to local storage.
//!
//! The reissue endpoint authenticates with an ambient session cookie set at
//! login. Keeping the jar in the storage area lets that cookie outlive one
//! process, the way a browser keeps it across page loads.
//!
//! The jar serves a single API origin: domain and path attributes are not
//! tracked. A cookie whose `Max-Age` or `Expires` is already past, or whose
//! value is empty, is removed.

#[cfg(test)]
#[path = "cookies_test.rs"]
mod cookies_test;

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use cookie::Cookie;
use cookie::time::{Duration, OffsetDateTime};
use reqwest::Url;
use reqwest::header::HeaderValue;

use crate::state::storage::LocalStorage;

/// Storage key holding the jar as a JSON object of `name -> value`.
pub const COOKIE_STORAGE_KEY: &str = "cookies";

pub struct StoredCookies {
    storage: LocalStorage,
    jar: Mutex<BTreeMap<String, String>>,
}

impl StoredCookies {
    /// Load the jar from `storage`. Missing or malformed content starts empty.
    #[must_use]
    pub fn new(storage: LocalStorage) -> Self {
        let jar = storage
            .get_item(COOKIE_STORAGE_KEY)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self { storage, jar: Mutex::new(jar) }
    }

    /// Current value of cookie `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.jar.lock().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Apply one `Set-Cookie` header value.
    pub fn apply_set_cookie(&self, header: &str) {
        let Some(change) = parse_set_cookie(header, OffsetDateTime::now_utc()) else {
            return;
        };
        // Persist under the lock so concurrent responses reach storage in jar order.
        let mut jar = self.jar.lock().unwrap_or_else(PoisonError::into_inner);
        match change {
            CookieChange::Set { name, value } => jar.insert(name, value),
            CookieChange::Delete { name } => jar.remove(&name),
        };
        self.persist(&jar);
    }

    /// `Cookie` request header value, or `None` when the jar is empty.
    #[must_use]
    pub fn header_value(&self) -> Option<String> {
        let jar = self.jar.lock().unwrap_or_else(PoisonError::into_inner);
        if jar.is_empty() {
            return None;
        }
        Some(jar.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("; "))
    }

    fn persist(&self, jar: &BTreeMap<String, String>) {
        let result = match serde_json::to_string(jar) {
            Ok(raw) => self.storage.set_item(COOKIE_STORAGE_KEY, &raw).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(error) = result {
            tracing::warn!(%error, "failed to persist cookie jar");
        }
    }
}

impl reqwest::cookie::CookieStore for StoredCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, _url: &Url) {
        for header in cookie_headers {
            if let Ok(raw) = header.to_str() {
                self.apply_set_cookie(raw);
            }
        }
    }

    fn cookies(&self, _url: &Url) -> Option<HeaderValue> {
        self.header_value().and_then(|v| HeaderValue::from_str(&v).ok())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CookieChange {
    Set { name: String, value: String },
    Delete { name: String },
}

fn parse_set_cookie(header: &str, now: OffsetDateTime) -> Option<CookieChange> {
    let cookie = match Cookie::parse(header) {
        Ok(cookie) => cookie,
        Err(error) => {
            tracing::debug!(%error, "ignoring malformed Set-Cookie header");
            return None;
        }
    };
    let name = cookie.name().to_owned();
    let value = cookie.value().trim_matches('"');

    if value.is_empty() || is_expired(&cookie, now) {
        Some(CookieChange::Delete { name })
    } else {
        Some(CookieChange::Set { name, value: value.to_owned() })
    }
}

/// `Max-Age` takes precedence over `Expires` when both are present.
fn is_expired(cookie: &Cookie<'_>, now: OffsetDateTime) -> bool {
    match cookie.max_age() {
        Some(max_age) => max_age <= Duration::ZERO,
        None => cookie.expires_datetime().is_some_and(|at| at <= now),
    }
}
