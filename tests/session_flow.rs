#![allow(clippy::unwrap_used)]

use normsearch::{
    client::{AppError, ClientConfig},
    dispatch::Dispatcher,
    session::{DurableStorage, FileStorage, MemoryStorage, Phase, SessionStore},
    status::{StatusCache, StatusLookup},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SESSION_KEY: &str = "normsearch.session";

fn config(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::new(server.uri());
    config.logout_grace = Duration::from_millis(300);
    config
}

fn open(server: &MockServer, storage: Arc<dyn DurableStorage>) -> SessionStore {
    SessionStore::new(config(server), storage).unwrap()
}

fn auth_body(token: &str, user_id: i64) -> Value {
    json!({
        "access_token": token,
        "user": {
            "id": user_id,
            "email": "a@b.com",
            "is_verified": true,
            "provider": null
        }
    })
}

async fn count(server: &MockServer, wanted: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == wanted)
        .count()
}

async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_body(token, 1)))
        .mount(server)
        .await;
}

async fn mount_renew(server: &MockServer, token: &str, delay: Duration) {
    Mock::given(method("POST"))
        .and(path("/renew"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(auth_body(token, 1))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

async fn mount_revoke(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

async fn signed_in(server: &MockServer, token: &str) -> SessionStore {
    mount_login(server, token).await;
    let store = open(server, Arc::new(MemoryStorage::new()));
    store.login("a@b.com", "correct horse").await.unwrap();
    store
}

fn fetch_document(
    api: &normsearch::client::ApiClient,
) -> impl Fn(Option<SecretString>) -> FetchFuture + '_ {
    move |credential| -> FetchFuture {
        let api = api.clone();
        Box::pin(async move {
            api.get_json::<Value>("/documents/1", credential.as_ref())
                .await
        })
    }
}

type FetchFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, AppError>> + Send>>;

#[tokio::test]
async fn concurrent_renewals_make_one_request() {
    let server = MockServer::start().await;
    mount_renew(&server, "xyz", Duration::from_millis(300)).await;

    let store = open(&server, Arc::new(MemoryStorage::new()));
    let mut handles = Vec::new();
    for _ in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.renew().await }));
    }

    let mut renewed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            renewed += 1;
        }
    }

    assert_eq!(renewed, 1);
    assert_eq!(count(&server, "/renew").await, 1);
    assert!(store.is_authenticated());
}

#[tokio::test]
async fn unauthorized_request_is_retried_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documents/1"))
        .and(header("Authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "expired" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/documents/1"))
        .and(header("Authorization", "Bearer xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "title": "Ley 1" })))
        .mount(&server)
        .await;
    mount_renew(&server, "xyz", Duration::ZERO).await;

    let store = signed_in(&server, "abc").await;
    let dispatcher = Dispatcher::new(store.clone());
    let body = dispatcher
        .dispatch(fetch_document(store.api()))
        .await
        .unwrap();

    assert_eq!(body["title"], "Ley 1");
    assert_eq!(count(&server, "/documents/1").await, 2);
    assert_eq!(count(&server, "/renew").await, 1);
    assert_eq!(
        store.access_credential().unwrap().expose_secret(),
        "xyz"
    );
}

#[tokio::test]
async fn failed_renewal_surfaces_original_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documents/1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "expired" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/renew"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "no refresh" })))
        .mount(&server)
        .await;

    let store = signed_in(&server, "abc").await;
    let dispatcher = Dispatcher::new(store.clone());
    let err = dispatcher
        .dispatch(fetch_document(store.api()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Unauthorized(ref message) if message == "expired"));
    assert_eq!(count(&server, "/renew").await, 1);
    assert_eq!(count(&server, "/documents/1").await, 1);
    assert!(!store.is_authenticated());
}

#[tokio::test]
async fn duplicate_checks_issue_one_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/7"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "marked": true }))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let store = signed_in(&server, "abc").await;
    let cache = StatusCache::new(StatusLookup::new(Dispatcher::new(store)));

    let (a, b, c) = (cache.clone(), cache.clone(), cache.clone());
    tokio::join!(
        a.check_many(&[7, 7, 7]),
        b.check_many(&[7]),
        c.check_many(&[7, 7])
    );

    assert!(cache.is_marked(7));
    assert_eq!(count(&server, "/status/7").await, 1);
}

#[tokio::test]
async fn sign_out_clears_status_cache() {
    let server = MockServer::start().await;
    mount_revoke(&server).await;
    Mock::given(method("GET"))
        .and(path("/status/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "marked": true })))
        .mount(&server)
        .await;

    let store = signed_in(&server, "abc").await;
    let cache = StatusCache::new(StatusLookup::new(Dispatcher::new(store.clone())));
    cache.check_many(&[7]).await;
    assert!(cache.is_marked(7));

    store.logout().await;

    assert!(!cache.is_marked(7));
    assert!(!cache.is_checked(7));
    assert!(!cache.is_pending(7));
}

#[tokio::test]
async fn logout_fences_renewal_for_grace_window() {
    let server = MockServer::start().await;
    mount_revoke(&server).await;
    mount_renew(&server, "xyz", Duration::ZERO).await;

    let store = signed_in(&server, "abc").await;
    store.logout().await;

    assert!(!store.renew().await);
    assert_eq!(count(&server, "/renew").await, 0);
    assert!(!store.is_authenticated());
    assert_eq!(store.state().phase, Phase::Anonymous);

    sleep(Duration::from_millis(500)).await;
    assert!(!store.is_logging_out());
    assert!(store.renew().await);
    assert_eq!(count(&server, "/renew").await, 1);
}

#[tokio::test]
async fn failed_toggle_converges_to_server_value() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/toggle"))
        .and(body_json(json!({ "resource_id": 5 })))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "marked": false })))
        .mount(&server)
        .await;

    let store = signed_in(&server, "abc").await;
    let cache = StatusCache::new(StatusLookup::new(Dispatcher::new(store)));
    assert!(!cache.is_marked(5));

    let toggling = tokio::spawn({
        let cache = cache.clone();
        async move { cache.toggle(5).await }
    });
    sleep(Duration::from_millis(50)).await;
    assert!(cache.is_marked(5));

    toggling.await.unwrap();
    assert!(!cache.is_marked(5));
    assert!(cache.is_checked(5));
    assert_eq!(count(&server, "/status/5").await, 1);
}

#[tokio::test]
async fn restore_with_durable_record_renews_credential() {
    let server = MockServer::start().await;
    mount_renew(&server, "xyz", Duration::ZERO).await;

    let storage = Arc::new(MemoryStorage::new());
    storage
        .set(
            SESSION_KEY,
            &json!({ "access_token": "abc", "user": { "id": 1 } }).to_string(),
        )
        .unwrap();

    let store = open(&server, storage.clone());
    let painted = store.state();
    assert!(painted.is_authenticated());
    assert!(painted.is_loading);
    assert_eq!(painted.phase, Phase::Restoring);

    assert!(store.restore().await);

    let state = store.state();
    assert!(state.is_authenticated());
    assert!(!state.is_loading);
    assert_eq!(state.phase, Phase::Authenticated);
    assert_eq!(store.access_credential().unwrap().expose_secret(), "xyz");

    let record: Value = serde_json::from_str(&storage.get(SESSION_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(record["access_token"], "xyz");
    assert_eq!(record["user"]["id"], 1);
}

#[tokio::test]
async fn restore_without_record_ends_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/renew"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    let store = open(&server, storage.clone());
    assert!(!store.restore().await);

    let state = store.state();
    assert!(!state.is_authenticated());
    assert!(!state.is_loading);
    assert_eq!(state.phase, Phase::Anonymous);
    assert!(storage.get(SESSION_KEY).unwrap().is_none());
}

#[tokio::test]
async fn rejected_login_keeps_session_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/renew"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({ "email": "a@b.com", "password": "wrong" })))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "detail": "Invalid credentials" })),
        )
        .mount(&server)
        .await;

    let store = open(&server, Arc::new(MemoryStorage::new()));
    store.restore().await;

    let err = store.login("a@b.com", "wrong").await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid credentials");
    assert_eq!(err.status(), Some(400));
    assert_eq!(store.state().phase, Phase::Anonymous);
    assert!(!store.is_authenticated());
}

#[tokio::test]
async fn unauthorized_login_reports_server_message_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/renew"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Invalid credentials" })),
        )
        .mount(&server)
        .await;

    let store = open(&server, Arc::new(MemoryStorage::new()));
    store.restore().await;

    let err = store.login("a@b.com", "wrong").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Invalid credentials");
    assert_eq!(store.state().phase, Phase::Anonymous);
    assert!(!store.is_authenticated());
    assert_eq!(count(&server, "/renew").await, 1);
}

#[tokio::test]
async fn file_backed_session_survives_restart() {
    let server = MockServer::start().await;
    mount_login(&server, "abc").await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");

    let first = open(&server, Arc::new(FileStorage::new(&file)));
    first.login("a@b.com", "correct horse").await.unwrap();
    drop(first);

    let second = open(&server, Arc::new(FileStorage::new(&file)));
    let state = second.state();
    assert!(state.is_authenticated());
    assert_eq!(state.user_id(), Some(1));
    assert_eq!(second.access_credential().unwrap().expose_secret(), "abc");
}
