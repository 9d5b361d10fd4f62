use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;

use common::client::{ClientError, UncachedClient};
use common::key::Key;

use crate::keys_file::KeysFile;
use crate::REGISTER_FILE;

/// Default interval between refresh passes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

/// Deadline for any single network call, so one stuck request cannot
/// wedge the loop or block shutdown.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("register file error: {0}")]
    Register(#[from] std::io::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("network call timed out")]
    Deadline,
}

/// The host-side caching daemon. Each refresh pass reads the register
/// set under the file lock, asks the server which of those keys changed
/// (by cached version hash), rewrites the changed cache files, and
/// prunes files for keys no longer registered.
pub struct Daemon {
    dir: PathBuf,
    refresh_interval: Duration,
    client: UncachedClient,
}

impl Daemon {
    pub fn new(dir: impl Into<PathBuf>, refresh_interval: Duration, client: UncachedClient) -> Self {
        Daemon {
            dir: dir.into(),
            refresh_interval,
            client,
        }
    }

    /// Run refresh passes until shutdown is signalled.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<()>) {
        tracing::info!(dir = ?self.dir, interval = ?self.refresh_interval, "daemon started");
        loop {
            match self.refresh_once().await {
                Ok(updated) => {
                    if updated > 0 {
                        tracing::info!(updated, "refreshed cached keys");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "refresh pass failed"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.refresh_interval) => {}
                _ = shutdown_rx.changed() => {
                    tracing::info!("daemon shutting down");
                    return;
                }
            }
        }
    }

    /// One refresh pass. Returns how many cache files were rewritten.
    pub async fn refresh_once(&self) -> Result<usize, DaemonError> {
        let registered = self.read_register()?;

        // Poll with the hash of each cached file; an unreadable or
        // invalid cache reads as an empty hash, which never matches and
        // forces a refetch.
        let mut filter = HashMap::new();
        for id in &registered {
            filter.insert(id.clone(), self.cached_hash(id));
        }

        let changed = if filter.is_empty() {
            Vec::new()
        } else {
            with_deadline(self.client.get_keys(&filter)).await??
        };

        let mut updated = 0;
        for id in &changed {
            match with_deadline(self.client.network_get_key(id)).await? {
                Ok(key) => {
                    self.write_cache_file(&key)?;
                    updated += 1;
                }
                Err(err) => tracing::warn!(key = %id, error = %err, "failed to fetch key"),
            }
        }

        self.prune(&registered)?;
        Ok(updated)
    }

    fn read_register(&self) -> Result<Vec<String>, DaemonError> {
        let mut keys_file = KeysFile::new(self.dir.join(REGISTER_FILE));
        keys_file.lock()?;
        let registered = keys_file.get()?;
        keys_file.unlock()?;
        Ok(registered)
    }

    fn cached_hash(&self, id: &str) -> String {
        let path = self.dir.join(id);
        std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Key>(&bytes).ok())
            .filter(|key| {
                let mut key = key.clone();
                key.path = Some(path.clone());
                key.validate().is_ok()
            })
            .map(|key| key.version_hash)
            .unwrap_or_default()
    }

    /// Publish a validated key: temp file with owner-only permissions,
    /// renamed into place so readers never see a partial file.
    fn write_cache_file(&self, key: &Key) -> Result<(), DaemonError> {
        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        set_owner_only(tmp.path())?;
        tmp.write_all(&serde_json::to_vec(key).map_err(ClientError::Decode)?)?;
        tmp.flush()?;
        tmp.persist(self.dir.join(&key.id)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Remove cache files for keys that are no longer registered.
    fn prune(&self, registered: &[String]) -> Result<(), DaemonError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == REGISTER_FILE || name.ends_with(".lock") {
                continue;
            }
            if !registered.iter().any(|id| id == name) {
                tracing::info!(key = name, "removing unregistered cache file");
                let _ = std::fs::remove_file(entry.path());
            }
        }
        Ok(())
    }
}

async fn with_deadline<T>(
    fut: impl std::future::Future<Output = T>,
) -> Result<T, DaemonError> {
    tokio::time::timeout(REQUEST_DEADLINE, fut)
        .await
        .map_err(|_| DaemonError::Deadline)
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
