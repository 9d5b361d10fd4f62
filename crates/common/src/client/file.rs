use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ClientError, CACHE_REFRESH_INTERVAL};
use crate::key::{Key, KeyVersion, KeyVersionList, VersionStatus};

/// Ask the local daemon to cache `key_id` by shelling out to
/// `knox register -g`, returning the key JSON it prints. Stdout and
/// stderr are kept separate so the secret never mixes with warnings.
pub fn register(key_id: &str) -> Result<Vec<u8>, ClientError> {
    let output = Command::new("knox")
        .args(["register", "-g", "-k", key_id])
        .output()?;
    if !output.status.success() {
        let mut message = format!("error getting knox key {}: {}", key_id, output.status);
        if !output.stdout.is_empty() {
            message.push_str(&format!(
                ", stdout: '{}'",
                String::from_utf8_lossy(&output.stdout)
            ));
        }
        if !output.stderr.is_empty() {
            message.push_str(&format!(
                ", stderr: '{}'",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        return Err(ClientError::Io(std::io::Error::other(message)));
    }
    Ok(output.stdout)
}

#[derive(Default)]
struct FileClientState {
    primary: String,
    active: Vec<String>,
    key: Option<Key>,
}

impl FileClientState {
    fn set(&mut self, key: Key) {
        self.primary = key
            .versions
            .get_primary()
            .map(|v| String::from_utf8_lossy(&v.data).into_owned())
            .unwrap_or_default();
        self.active = key
            .versions
            .get_active()
            .map(|v| String::from_utf8_lossy(&v.data).into_owned())
            .collect();
        self.key = Some(key);
    }
}

/// Read-only view of one key, fed from the daemon's cache file.
///
/// Accessors never touch the network or the disk; a background task
/// re-reads the cache file every ten seconds under the write half of the
/// lock. Applications embed this to pick up rotations without restarts.
#[derive(Clone)]
pub struct FileClient {
    key_id: String,
    state: Arc<RwLock<FileClientState>>,
}

impl FileClient {
    /// Register the key with the daemon, load the initial value, and
    /// start the refresh task. Must be called from within a tokio
    /// runtime.
    pub fn new(cache_dir: impl AsRef<Path>, key_id: &str) -> Result<FileClient, ClientError> {
        let initial = register(key_id)?;
        let key: Key = serde_json::from_slice(&initial)?;
        key.validate().map_err(ClientError::InvalidCachedKey)?;

        let client = FileClient {
            key_id: key_id.to_string(),
            state: Arc::new(RwLock::new(FileClientState::default())),
        };
        client.state.write().set(key);
        client.spawn_refresh(cache_dir.as_ref().join(key_id));
        Ok(client)
    }

    fn spawn_refresh(&self, path: PathBuf) {
        let state = Arc::clone(&self.state);
        let key_id = self.key_id.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CACHE_REFRESH_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match read_cache_file(&path) {
                    Ok(key) => state.write().set(key),
                    Err(err) => {
                        tracing::warn!(key_id = %key_id, error = %err, "failed to refresh key")
                    }
                }
            }
        });
    }

    /// The primary version's material. Use for sending relationships:
    /// signing, encrypting, presenting API secrets.
    pub fn get_primary(&self) -> String {
        self.state.read().primary.clone()
    }

    /// Material of every active version. Use for receiving
    /// relationships: verifying, decrypting.
    pub fn get_active(&self) -> Vec<String> {
        self.state.read().active.clone()
    }

    /// The full key object, including versions and the ACL.
    pub fn get_key_object(&self) -> Option<Key> {
        self.state.read().key.clone()
    }

    /// Fixed-value client for tests of embedding applications; no daemon
    /// interaction and no refresh task.
    pub fn mock(primary: &str, active: &[&str]) -> FileClient {
        let mut versions = vec![KeyVersion {
            id: 1,
            data: primary.as_bytes().to_vec(),
            status: VersionStatus::Primary,
            creation_time: 0,
        }];
        for (i, a) in active.iter().enumerate() {
            versions.push(KeyVersion {
                id: i as u64 + 2,
                data: a.as_bytes().to_vec(),
                status: VersionStatus::Active,
                creation_time: 0,
            });
        }
        let versions = KeyVersionList(versions);
        let key = Key {
            id: "mock".to_string(),
            acl: Default::default(),
            version_hash: versions.hash(),
            versions,
            path: None,
        };
        let client = FileClient {
            key_id: "mock".to_string(),
            state: Arc::new(RwLock::new(FileClientState::default())),
        };
        client.state.write().set(key);
        client
    }
}

fn read_cache_file(path: &Path) -> Result<Key, ClientError> {
    let bytes = std::fs::read(path)?;
    let mut key: Key = serde_json::from_slice(&bytes)?;
    key.path = Some(path.to_path_buf());
    key.validate().map_err(ClientError::InvalidCachedKey)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_exposes_primary_and_active() {
        let client = FileClient::mock("p1", &["a1", "a2"]);
        assert_eq!(client.get_primary(), "p1");
        assert_eq!(client.get_active(), vec!["a1", "a2"]);
        let key = client.get_key_object().unwrap();
        assert_eq!(key.versions.len(), 3);
        key.validate().unwrap();
    }
}
