use super::*;
use crate::router::{REDIRECT_PARAM, RouteName};
use crate::state::session::{AUTH_STORAGE_KEY, LOGIN_PATH};
use crate::test_helpers::MockTransport;
use reqwest::Method;
use serde_json::json;
use std::time::Duration;

fn test_app(transport: Arc<MockTransport>, storage: LocalStorage) -> App {
    App::with_transport(ClientConfig::for_base_url("http://127.0.0.1:9/api"), transport, storage)
}

fn creds() -> Credentials {
    Credentials { email: "a@b.com".into(), password: "x".into() }
}

#[tokio::test]
async fn startup_loads_persisted_session() {
    let storage = StorageArea::memory().open_tab();
    storage.set_item(AUTH_STORAGE_KEY, r#"{"accessToken":"T1","user":{"id":1}}"#).unwrap();

    let app = test_app(MockTransport::new(), storage);
    assert!(app.session().is_authenticated());
}

#[tokio::test]
async fn protected_navigation_without_session_goes_to_signin() {
    let app = test_app(MockTransport::new(), StorageArea::memory().open_tab());

    let nav = app.navigate("/schedule");

    assert!(matches!(nav, Navigation::Redirect { .. }));
    let current = app.router().current();
    assert_eq!(current.path, "/signin");
    assert_eq!(current.query_value(REDIRECT_PARAM), Some("/schedule"));
}

#[tokio::test]
async fn sign_in_continues_to_the_original_destination() {
    let transport = MockTransport::new();
    transport.respond(Method::POST, LOGIN_PATH, 200, json!({ "user": { "id": 1 }, "accessToken": "T1" }));
    let app = test_app(transport, StorageArea::memory().open_tab());
    app.navigate("/schedule");

    let nav = app.sign_in(&creds()).await.unwrap();

    assert!(matches!(nav, Navigation::Allow { route, .. } if route.name == RouteName::Schedule));
    assert_eq!(app.router().current().path, "/schedule");
}

#[tokio::test]
async fn failed_sign_in_stays_on_signin() {
    let transport = MockTransport::new();
    transport.respond(Method::POST, LOGIN_PATH, 401, json!({ "message": "bad credentials" }));
    let app = test_app(transport, StorageArea::memory().open_tab());
    app.navigate("/schedule");

    let err = app.sign_in(&creds()).await.unwrap_err();

    assert_eq!(err.server_message(), Some("bad credentials"));
    assert_eq!(app.router().current().path, "/signin");
    assert!(app.notice().current().is_empty());
}

#[tokio::test]
async fn apps_sharing_an_area_stay_in_sync() {
    let transport = MockTransport::new();
    transport.respond(Method::POST, LOGIN_PATH, 200, json!({ "user": { "id": 2 }, "accessToken": "T2" }));
    let area = StorageArea::memory();
    let first = test_app(Arc::clone(&transport), area.open_tab());
    let second = test_app(transport, area.open_tab());
    let mut rx = second.session().subscribe();

    first.sign_in(&creds()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.is_authenticated()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.session().user(), Some(json!({ "id": 2 })));
}

#[tokio::test]
async fn dropping_the_app_stops_storage_sync() {
    let area = StorageArea::memory();
    let other = area.open_tab();
    let app = test_app(MockTransport::new(), area.open_tab());
    let session = app.session().clone();
    drop(app);
    tokio::task::yield_now().await;

    other.set_item(AUTH_STORAGE_KEY, r#"{"accessToken":"T3","user":null}"#).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!session.is_authenticated(), "aborted sync must not reload");
}
