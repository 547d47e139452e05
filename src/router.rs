//! Application route table and the authentication guard.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every navigation goes through [`Router::navigate`], which applies the
//! same unauthenticated-redirect rule for all protected routes. The session
//! store uses the router to return to the landing page on logout.

#[cfg(test)]
#[path = "router_test.rs"]
mod router_test;

use std::sync::LazyLock;

use reqwest::Url;
use tokio::sync::watch;

/// Query parameter carrying the post-login destination.
pub const REDIRECT_PARAM: &str = "redirect";

static APP_ORIGIN: LazyLock<Option<Url>> = LazyLock::new(|| Url::parse("http://app.invalid/").ok());

// =============================================================================
// ROUTE TABLE
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteName {
    Home,
    SignIn,
    Schedule,
}

/// Page chrome a route renders inside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    Default,
    Auth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Public,
    RequiresAuth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub name: RouteName,
    pub path: &'static str,
    pub layout: Layout,
    pub access: Access,
}

pub const ROUTES: &[Route] = &[
    Route { name: RouteName::Home, path: "/", layout: Layout::Default, access: Access::Public },
    Route { name: RouteName::SignIn, path: "/signin", layout: Layout::Auth, access: Access::Public },
    Route { name: RouteName::Schedule, path: "/schedule", layout: Layout::Default, access: Access::RequiresAuth },
];

#[must_use]
pub fn route_by_name(name: RouteName) -> &'static Route {
    ROUTES
        .iter()
        .find(|r| r.name == name)
        .unwrap_or(&ROUTES[0])
}

#[must_use]
pub fn match_route(path: &str) -> Option<&'static Route> {
    let normalized = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    ROUTES.iter().find(|r| r.path == normalized)
}

// =============================================================================
// LOCATION
// =============================================================================

/// An in-app location: a path plus decoded query pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Default for Location {
    fn default() -> Self {
        Self { path: "/".to_owned(), query: Vec::new() }
    }
}

impl Location {
    /// Parse `"/path?a=b"`. Anything unparsable becomes the landing page.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let Some(url) = APP_ORIGIN.as_ref().and_then(|origin| origin.join(raw.trim()).ok()) else {
            tracing::warn!(raw, "unparsable location; using landing page");
            return Self::default();
        };
        Self {
            path: url.path().to_owned(),
            query: url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect(),
        }
    }

    #[must_use]
    pub fn for_route(name: RouteName) -> Self {
        Self { path: route_by_name(name).path.to_owned(), query: Vec::new() }
    }

    #[must_use]
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Path plus encoded query string.
    #[must_use]
    pub fn full_path(&self) -> String {
        let Some(mut url) = APP_ORIGIN.clone() else {
            return self.path.clone();
        };
        url.set_path(&self.path);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_owned(),
        }
    }
}

// =============================================================================
// GUARD
// =============================================================================

/// Outcome of resolving a navigation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    /// Enter the requested route.
    Allow { route: &'static Route, location: Location },
    /// Go to the sign-in route instead, carrying the original destination.
    Redirect { location: Location },
    /// No route matches.
    NotFound { location: Location },
}

impl Navigation {
    /// Where the application ends up after this navigation.
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            Self::Allow { location, .. } | Self::Redirect { location } | Self::NotFound { location } => location,
        }
    }
}

/// Apply the route guard to `to`.
#[must_use]
pub fn resolve(to: &Location, is_authenticated: bool) -> Navigation {
    let Some(route) = match_route(&to.path) else {
        return Navigation::NotFound { location: to.clone() };
    };
    if route.access == Access::RequiresAuth && !is_authenticated {
        let location = Location::for_route(RouteName::SignIn).with_query(REDIRECT_PARAM, &to.full_path());
        return Navigation::Redirect { location };
    }
    Navigation::Allow { route, location: to.clone() }
}

/// Where to go after a successful sign-in from `signin_location`.
///
/// Only in-app paths are honored; anything else falls back to the landing page.
#[must_use]
pub fn post_login_destination(signin_location: &Location) -> String {
    match signin_location.query_value(REDIRECT_PARAM) {
        Some(target) if is_in_app_path(target) => target.to_owned(),
        _ => route_by_name(RouteName::Home).path.to_owned(),
    }
}

fn is_in_app_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}

// =============================================================================
// ROUTER
// =============================================================================

/// Current-location holder. Clones share the same location.
#[derive(Clone)]
pub struct Router {
    current: watch::Sender<Location>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self { current: watch::Sender::new(Location::default()) }
    }

    /// Navigate to `raw`, applying the guard.
    pub fn navigate(&self, raw: &str, is_authenticated: bool) -> Navigation {
        let outcome = resolve(&Location::parse(raw), is_authenticated);
        match &outcome {
            Navigation::Redirect { location } => {
                tracing::info!(to = raw, redirect = %location.full_path(), "navigation requires sign-in");
            }
            Navigation::NotFound { location } => tracing::debug!(path = %location.path, "no route matched"),
            Navigation::Allow { .. } => {}
        }
        self.current.send_replace(outcome.location().clone());
        outcome
    }

    #[must_use]
    pub fn current(&self) -> Location {
        self.current.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Location> {
        self.current.subscribe()
    }
}
