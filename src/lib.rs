//! Schedule calendar client: signed-in session, authenticated API access,
//! and route guarding.
//!
//! ARCHITECTURE
//! ============
//! - `state::session` owns the access token and user, persisted in
//!   `state::storage` and kept in sync across tabs sharing a storage area.
//! - `net::gateway` is the only way API calls leave the client: it attaches
//!   the bearer token, refreshes once on expiry, and publishes failures to
//!   `state::notice`.
//! - `router` guards protected routes; `app` wires everything together.

pub mod app;
pub mod config;
pub mod net;
pub mod router;
pub mod state;
pub mod util;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use app::{App, AppError};
pub use config::{ClientConfig, ConfigError};
pub use net::gateway::Gateway;
pub use net::types::{ApiError, ApiRequest, ApiResponse, Credentials};
pub use state::notice::ErrorNotice;
pub use state::session::{Session, SessionStore};
