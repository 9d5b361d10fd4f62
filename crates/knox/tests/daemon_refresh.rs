//! Daemon refresh protocol against a real in-process knox server: the
//! register file drives which keys get cached, the hash poll drives
//! which get refetched, and unregistered keys get pruned.

use std::sync::Arc;
use std::time::Duration;

use common::access::Acl;
use common::client::{AuthHandler, StaticAuthHandler, UncachedClient};
use common::key::{Key, VersionStatus};

use knox_cli::daemon::Daemon;
use knox_cli::keys_file::KeysFile;
use knox_cli::REGISTER_FILE;

use knox_server::auth::{mock_user_provider, Provider};
use knox_server::http_server;
use knox_server::keydb::{ChaChaCryptor, TempDb};
use knox_server::manager::KeyManager;
use knox_server::ServiceState;

async fn spawn_server() -> url::Url {
    let manager = KeyManager::new(
        Box::new(TempDb::new()),
        Box::new(ChaChaCryptor::new(0, b"testtesttesttesttesttesttesttest")),
    );
    let providers: Vec<Box<dyn Provider>> = vec![Box::new(mock_user_provider())];
    let state = ServiceState::new(manager, providers, Vec::new(), Vec::new(), "test");

    let app = http_server::app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    url::Url::parse(&format!("http://{}", addr)).unwrap()
}

fn client(remote: url::Url) -> UncachedClient {
    let handlers: Vec<Arc<dyn AuthHandler>> =
        vec![Arc::new(StaticAuthHandler::new("user", "0utesttoken"))];
    UncachedClient::new(remote, handlers, "test")
}

fn read_cache(dir: &std::path::Path, id: &str) -> Key {
    let bytes = std::fs::read(dir.join(id)).unwrap();
    let key: Key = serde_json::from_slice(&bytes).unwrap();
    key.validate().unwrap();
    key
}

#[tokio::test]
async fn daemon_caches_refreshes_and_prunes() {
    let remote = spawn_server().await;
    let cli = client(remote.clone());
    let dir = tempfile::tempdir().unwrap();

    cli.create_key("a1", b"1", &Acl::default()).await.unwrap();
    cli.create_key("a2", b"2", &Acl::default()).await.unwrap();

    // Register both keys the way the CLI does.
    let mut kf = KeysFile::new(dir.path().join(REGISTER_FILE));
    kf.lock().unwrap();
    kf.add(&["a1".to_string(), "a2".to_string()]).unwrap();
    kf.unlock().unwrap();

    let daemon = Daemon::new(dir.path(), Duration::from_secs(600), cli.clone());

    // First pass materializes both cache files.
    assert_eq!(daemon.refresh_once().await.unwrap(), 2);
    let cached = read_cache(dir.path(), "a1");
    assert_eq!(cached.versions.get_primary().unwrap().data, b"1");
    let first_hash = cached.version_hash.clone();

    // Nothing changed: the hash poll filters everything out.
    assert_eq!(daemon.refresh_once().await.unwrap(), 0);

    // A rotation changes the hash; only the rotated key is refetched.
    let v2 = cli.add_version("a1", b"11").await.unwrap();
    cli.update_version("a1", &v2.to_string(), VersionStatus::Primary)
        .await
        .unwrap();
    assert_eq!(daemon.refresh_once().await.unwrap(), 1);
    let rotated = read_cache(dir.path(), "a1");
    assert_ne!(rotated.version_hash, first_hash);
    assert_eq!(rotated.versions.get_primary().unwrap().data, b"11");

    // Unregistering a key removes its cache file on the next pass.
    let mut kf = KeysFile::new(dir.path().join(REGISTER_FILE));
    kf.lock().unwrap();
    kf.remove(&["a2".to_string()]).unwrap();
    kf.unlock().unwrap();

    daemon.refresh_once().await.unwrap();
    assert!(dir.path().join("a1").exists());
    assert!(!dir.path().join("a2").exists());
    assert!(dir.path().join(REGISTER_FILE).exists());
}

#[tokio::test]
async fn daemon_skips_keys_it_cannot_fetch() {
    let remote = spawn_server().await;
    let cli = client(remote.clone());
    let dir = tempfile::tempdir().unwrap();

    cli.create_key("real", b"1", &Acl::default()).await.unwrap();

    // One registered key does not exist on the server at all.
    let mut kf = KeysFile::new(dir.path().join(REGISTER_FILE));
    kf.lock().unwrap();
    kf.add(&["real".to_string(), "ghost".to_string()]).unwrap();
    kf.unlock().unwrap();

    let daemon = Daemon::new(dir.path(), Duration::from_secs(600), cli);
    assert_eq!(daemon.refresh_once().await.unwrap(), 1);
    assert!(dir.path().join("real").exists());
    assert!(!dir.path().join("ghost").exists());
}
