use super::*;
use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// # Safety
/// Callers must hold `env_guard()`.
unsafe fn clear_client_env() {
    unsafe {
        std::env::remove_var("SCHEDULE_API_BASE_URL");
        std::env::remove_var("SCHEDULE_STATE_DIR");
        std::env::remove_var("SCHEDULE_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("SCHEDULE_REQUEST_TIMEOUT_SECS");
    }
}

#[test]
fn from_env_defaults() {
    let _guard = env_guard();
    unsafe { clear_client_env() };

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    assert_eq!(cfg.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
    assert_eq!(cfg.request_timeout_secs, None);
    assert!(cfg.state_dir.ends_with(DEFAULT_STATE_DIR_NAME));
}

#[test]
fn from_env_parses_overrides() {
    let _guard = env_guard();
    unsafe {
        clear_client_env();
        std::env::set_var("SCHEDULE_API_BASE_URL", "https://schedule.example.test/api/");
        std::env::set_var("SCHEDULE_STATE_DIR", "/tmp/schedule-state");
        std::env::set_var("SCHEDULE_CONNECT_TIMEOUT_SECS", "3");
        std::env::set_var("SCHEDULE_REQUEST_TIMEOUT_SECS", "30");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.base_url, "https://schedule.example.test/api");
    assert_eq!(cfg.state_dir, PathBuf::from("/tmp/schedule-state"));
    assert_eq!(cfg.connect_timeout_secs, 3);
    assert_eq!(cfg.request_timeout_secs, Some(30));

    unsafe { clear_client_env() };
}

#[test]
fn from_env_rejects_bad_timeout() {
    let _guard = env_guard();
    unsafe {
        clear_client_env();
        std::env::set_var("SCHEDULE_REQUEST_TIMEOUT_SECS", "soon");
    }

    let err = ClientConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("SCHEDULE_REQUEST_TIMEOUT_SECS"));

    unsafe { clear_client_env() };
}

#[test]
fn from_env_rejects_relative_base_url() {
    let _guard = env_guard();
    unsafe {
        clear_client_env();
        std::env::set_var("SCHEDULE_API_BASE_URL", "/api");
    }

    assert!(matches!(ClientConfig::from_env(), Err(ConfigError::InvalidBaseUrl(_))));

    unsafe { clear_client_env() };
}

#[test]
fn with_base_url_normalizes_trailing_slash() {
    let cfg = ClientConfig::for_base_url(DEFAULT_BASE_URL).with_base_url("http://localhost:8080/api/").unwrap();
    assert_eq!(cfg.base_url, "http://localhost:8080/api");
    assert!(ClientConfig::for_base_url(DEFAULT_BASE_URL).with_base_url("localhost").is_err());
}
