//! Client configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000/api";
pub const DEFAULT_STATE_DIR_NAME: &str = ".schedule-client";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {value:?} is not a number of seconds")]
    InvalidSeconds { var: &'static str, value: String },
    #[error("invalid base URL: {0:?}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root every request path is appended to, without a trailing `/`.
    pub base_url: String,
    /// Directory holding the persisted storage area.
    pub state_dir: PathBuf,
    pub connect_timeout_secs: u64,
    /// Whole-request deadline. `None` leaves it to the HTTP client.
    pub request_timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `SCHEDULE_API_BASE_URL`: default `http://127.0.0.1:3000/api`
    /// - `SCHEDULE_STATE_DIR`: default `$HOME/.schedule-client`
    /// - `SCHEDULE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `SCHEDULE_REQUEST_TIMEOUT_SECS`: unset by default
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(
            &std::env::var("SCHEDULE_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned()),
        )?;
        let state_dir = std::env::var_os("SCHEDULE_STATE_DIR")
            .map_or_else(default_state_dir, PathBuf::from);
        let connect_timeout_secs =
            env_seconds("SCHEDULE_CONNECT_TIMEOUT_SECS")?.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        let request_timeout_secs = env_seconds("SCHEDULE_REQUEST_TIMEOUT_SECS")?;

        Ok(Self { base_url, state_dir, connect_timeout_secs, request_timeout_secs })
    }

    /// Defaults with a specific API base URL.
    #[must_use]
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            state_dir: default_state_dir(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: None,
        }
    }

    /// Replace the base URL, validating it the same way `from_env` does.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute http(s) URL.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        self.base_url = normalize_base_url(base_url)?;
        Ok(self)
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_owned())
    } else {
        Err(ConfigError::InvalidBaseUrl(raw.to_owned()))
    }
}

fn default_state_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from(DEFAULT_STATE_DIR_NAME), |home| PathBuf::from(home).join(DEFAULT_STATE_DIR_NAME))
}

fn env_seconds(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSeconds { var, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
