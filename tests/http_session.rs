//! End-to-end session flow against a local HTTP server: sign-in sets the
//! refresh cookie, an expired token is reissued through it, and the session
//! survives a restart from the state directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use schedule_client::net::gateway::MSG_NOT_FOUND;
use schedule_client::router::Navigation;
use schedule_client::{App, ClientConfig, Credentials};
use serde_json::{Value, json};

const REFRESH_COOKIE: &str = "refresh=r1";

#[derive(Clone, Default)]
struct ServerState {
    reissues: Arc<AtomicUsize>,
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] != "pw" {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "invalid credentials" }))).into_response();
    }
    (
        [(header::SET_COOKIE, format!("{REFRESH_COOKIE}; Path=/; HttpOnly"))],
        Json(json!({ "user": { "id": 7, "name": "Ada" }, "accessToken": "T1" })),
    )
        .into_response()
}

async fn logout() -> Response {
    ([(header::SET_COOKIE, "refresh=; Max-Age=0; Path=/")], Json(json!({}))).into_response()
}

async fn reissue(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    let has_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split("; ").any(|c| c == REFRESH_COOKIE));
    if !has_cookie {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "no session" }))).into_response();
    }
    state.reissues.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "accessToken": "T2" })).into_response()
}

async fn events(headers: HeaderMap) -> Response {
    let bearer = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if bearer != Some("Bearer T2") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "token expired" }))).into_response();
    }
    Json(json!([{ "id": 1, "title": "standup" }])).into_response()
}

async fn spawn_server(state: ServerState) -> String {
    let app = axum::Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/reissue-token", post(reissue))
        .route("/api/events", get(events))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/api")
}

fn temp_state_dir() -> PathBuf {
    std::env::temp_dir().join(format!("schedule-client-it-{}", uuid::Uuid::new_v4()))
}

fn config(base_url: &str, state_dir: &Path) -> ClientConfig {
    let mut config = ClientConfig::for_base_url(base_url);
    config.state_dir = state_dir.to_path_buf();
    config
}

fn creds(password: &str) -> Credentials {
    Credentials { email: "ada@example.test".into(), password: password.into() }
}

#[tokio::test]
async fn expired_token_is_reissued_with_the_session_cookie() {
    let state = ServerState::default();
    let base = spawn_server(state.clone()).await;
    let dir = temp_state_dir();
    let app = App::new(config(&base, &dir)).unwrap();
    app.navigate("/schedule");

    let nav = app.sign_in(&creds("pw")).await.unwrap();
    assert!(matches!(nav, Navigation::Allow { .. }));
    assert_eq!(app.router().current().path, "/schedule");

    let events: Value = app.gateway().get("/events").await.unwrap();

    assert_eq!(events, json!([{ "id": 1, "title": "standup" }]));
    assert_eq!(app.session().access_token().as_deref(), Some("T2"));
    assert_eq!(state.reissues.load(Ordering::SeqCst), 1);
    assert!(app.notice().current().is_empty());

    drop(app);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn session_and_cookie_survive_restart() {
    let base = spawn_server(ServerState::default()).await;
    let dir = temp_state_dir();

    let first = App::new(config(&base, &dir)).unwrap();
    first.sign_in(&creds("pw")).await.unwrap();
    drop(first);

    let second = App::new(config(&base, &dir)).unwrap();
    assert!(second.session().is_authenticated());
    assert_eq!(second.session().user(), Some(json!({ "id": 7, "name": "Ada" })));
    assert_eq!(second.session().refresh().await.unwrap(), "T2");

    drop(second);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn logout_drops_the_session_cookie() {
    let base = spawn_server(ServerState::default()).await;
    let dir = temp_state_dir();
    let app = App::new(config(&base, &dir)).unwrap();
    app.sign_in(&creds("pw")).await.unwrap();

    app.session().logout().await;

    assert!(!app.session().is_authenticated());
    assert!(app.session().refresh().await.is_err());
    assert_eq!(app.router().current().path, "/");

    drop(app);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn rejected_sign_in_keeps_the_server_message() {
    let base = spawn_server(ServerState::default()).await;
    let dir = temp_state_dir();
    let app = App::new(config(&base, &dir)).unwrap();

    let err = app.sign_in(&creds("wrong")).await.unwrap_err();

    assert_eq!(err.server_message(), Some("invalid credentials"));
    assert!(!app.session().is_authenticated());

    drop(app);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn unknown_endpoint_publishes_not_found_notice() {
    let base = spawn_server(ServerState::default()).await;
    let dir = temp_state_dir();
    let app = App::new(config(&base, &dir)).unwrap();

    let err = app.gateway().get::<Value>("/missing").await.unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(app.notice().message(), MSG_NOT_FOUND);

    drop(app);
    let _ = std::fs::remove_dir_all(&dir);
}
