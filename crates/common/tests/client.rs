use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::Router;

use common::key::{Key, KeyVersion, KeyVersionList, VersionStatus};
use common::response::{Code, Response};
use common::client::{
    AuthHandler, ClientError, HttpClient, StaticAuthHandler, UncachedClient,
};

fn good_response(data: serde_json::Value) -> Response {
    Response {
        status: "ok".to_string(),
        code: Code::Ok,
        host: "test".to_string(),
        timestamp: 1234567890,
        message: String::new(),
        data: Some(data),
    }
}

fn error_response(code: Code) -> Response {
    Response {
        status: "err".to_string(),
        code,
        host: "test".to_string(),
        timestamp: 1234567890,
        message: "Internal Server Error".to_string(),
        data: None,
    }
}

fn test_key(id: &str) -> Key {
    let versions = KeyVersionList(vec![KeyVersion {
        id: 7,
        data: b"1".to_vec(),
        status: VersionStatus::Primary,
        creation_time: 10,
    }]);
    Key {
        id: id.to_string(),
        acl: Default::default(),
        version_hash: versions.hash(),
        versions,
        path: None,
    }
}

/// Serve a scripted sequence of envelopes; request N gets `script[N]`
/// (the last entry repeats). Returns the base URL and a request counter.
async fn spawn_server(script: Vec<Response>) -> (url::Url, Arc<AtomicU64>) {
    let counter = Arc::new(AtomicU64::new(0));
    let counter_inner = Arc::clone(&counter);
    let handler = move |_req: Request<Body>| {
        let n = counter_inner.fetch_add(1, Ordering::SeqCst) as usize;
        let resp = script[n.min(script.len() - 1)].clone();
        async move { (StatusCode::OK, axum::Json(resp)).into_response() }
    };
    let app = Router::new().fallback(handler);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (
        url::Url::parse(&format!("http://{}", addr)).unwrap(),
        counter,
    )
}

fn mock_client(remote: url::Url) -> UncachedClient {
    UncachedClient::new(
        remote,
        vec![Arc::new(StaticAuthHandler::new("mock", "0uTESTAUTH"))],
        "mock",
    )
}

#[tokio::test]
async fn get_key_roundtrip() {
    let key = test_key("testkey");
    let (remote, counter) = spawn_server(vec![good_response(
        serde_json::to_value(&key).unwrap(),
    )])
    .await;

    let cli = mock_client(remote);
    let fetched = cli.get_key("testkey").await.unwrap();
    assert_eq!(fetched.id, "testkey");
    assert_eq!(fetched.version_hash, key.version_hash);
    assert!(fetched.path.is_none());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_remote_key_is_rejected() {
    // A well-formed envelope holding a key that fails validation (no
    // primary version, empty hash) must not be returned to the caller.
    let bogus = serde_json::json!({
        "id": "testkey",
        "acl": [],
        "versions": [],
        "hash": "",
    });
    let (remote, _) = spawn_server(vec![good_response(bogus)]).await;
    let cli = mock_client(remote);
    match cli.get_key("testkey").await {
        Err(ClientError::InvalidRemoteKey(_)) => {}
        other => panic!("expected InvalidRemoteKey, got {:?}", other.map(|k| k.id)),
    }
}

#[tokio::test]
async fn retries_internal_errors_three_times() {
    // Two 500s then success: the client must make exactly 3 attempts and
    // come back with the payload.
    let key = test_key("retrykey");
    let (remote, counter) = spawn_server(vec![
        error_response(Code::InternalServerError),
        error_response(Code::InternalServerError),
        good_response(serde_json::to_value(&key).unwrap()),
    ])
    .await;

    let cli = mock_client(remote);
    let fetched = cli.get_key("retrykey").await.unwrap();
    assert_eq!(fetched.id, "retrykey");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn internal_errors_surface_after_last_attempt() {
    let (remote, counter) = spawn_server(vec![error_response(Code::InternalServerError)]).await;
    let cli = mock_client(remote);
    match cli.get_key("k").await {
        Err(ClientError::Api { code, .. }) => assert_eq!(code, Code::InternalServerError),
        other => panic!("expected Api error, got {:?}", other.map(|k| k.id)),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn non_internal_errors_do_not_retry() {
    let (remote, counter) = spawn_server(vec![error_response(Code::KeyIdentifierDoesNotExist)]).await;
    let cli = mock_client(remote);
    match cli.get_key("k").await {
        Err(ClientError::Api { code, .. }) => assert_eq!(code, Code::KeyIdentifierDoesNotExist),
        other => panic!("expected Api error, got {:?}", other.map(|k| k.id)),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn multi_auth_advances_on_unauthorized() {
    // First handler is rejected with UnauthorizedCode; the second one
    // succeeds. Exactly one request per handler, no backoff retries.
    let key = test_key("testkey1");
    let (remote, counter) = spawn_server(vec![
        error_response(Code::Unauthorized),
        good_response(serde_json::to_value(&key).unwrap()),
    ])
    .await;

    let handlers: Vec<Arc<dyn AuthHandler>> = vec![
        Arc::new(StaticAuthHandler::new("user", "0uFIRST")),
        Arc::new(StaticAuthHandler::new("machine", "0mSECOND")),
    ];
    let cli = UncachedClient::new(remote, handlers, "mock");
    let fetched = cli.get_key("testkey1").await.unwrap();
    assert_eq!(fetched.id, "testkey1");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn all_handlers_unauthorized_is_distinct_error() {
    let (remote, counter) = spawn_server(vec![error_response(Code::Unauthorized)]).await;
    let cli = mock_client(remote);
    match cli.get_key("k").await {
        Err(ClientError::UnsuccessfulAuth(_)) => {}
        other => panic!("expected UnsuccessfulAuth, got {:?}", other.map(|k| k.id)),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_credentials_fails_before_any_request() {
    let (remote, counter) = spawn_server(vec![error_response(Code::Unauthenticated)]).await;
    // A handler with an empty header yields no credentials at all.
    let handlers: Vec<Arc<dyn AuthHandler>> =
        vec![Arc::new(StaticAuthHandler::new("empty", ""))];
    let cli = UncachedClient::new(remote, handlers, "mock");
    match cli.get_keys(&HashMap::new()).await {
        Err(ClientError::NoAuth) => {}
        other => panic!("expected NoAuth, got {:?}", other.map(|l| l.len())),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_miss_falls_back_to_network() {
    let key = test_key("cachedkey");
    let (remote, counter) = spawn_server(vec![good_response(
        serde_json::to_value(&key).unwrap(),
    )])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let cli = HttpClient::new(Some(dir.path().to_path_buf()), mock_client(remote));

    // Nothing cached yet: network serves the key.
    let fetched = cli.get_key("cachedkey").await.unwrap();
    assert_eq!(fetched.id, "cachedkey");
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // A valid cache file short-circuits the network entirely.
    std::fs::write(
        dir.path().join("cachedkey"),
        serde_json::to_vec(&key).unwrap(),
    )
    .unwrap();
    let fetched = cli.get_key("cachedkey").await.unwrap();
    assert_eq!(
        fetched.path.as_deref(),
        Some(dir.path().join("cachedkey").as_path())
    );
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_cache_file_is_rejected_and_bypassed() {
    let key = test_key("poisoned");
    let (remote, counter) = spawn_server(vec![good_response(
        serde_json::to_value(&key).unwrap(),
    )])
    .await;

    let dir = tempfile::tempdir().unwrap();
    // Parsable JSON whose content fails Key::validate (bad hash).
    let mut bad = key.clone();
    bad.version_hash = "tampered".to_string();
    std::fs::write(dir.path().join("poisoned"), serde_json::to_vec(&bad).unwrap()).unwrap();

    let cli = HttpClient::new(Some(dir.path().to_path_buf()), mock_client(remote));
    match cli.cache_get_key("poisoned") {
        Err(ClientError::InvalidCachedKey(_)) => {}
        other => panic!("expected InvalidCachedKey, got {:?}", other.map(|k| k.id)),
    }

    // get_key treats the poisoned cache as a miss and goes to network.
    let fetched = cli.get_key("poisoned").await.unwrap();
    assert_eq!(fetched.id, "poisoned");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
