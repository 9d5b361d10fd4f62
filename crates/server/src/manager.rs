use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use common::access::{Access, AccessType, Acl, PrincipalType};
use common::key::{Key, KeyError, KeyVersion, KeyVersionList, VersionStatus};
use common::principal::Principal;

use crate::keydb::{Cryptor, CryptorError, Db, DbError, DbKey};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Key {0} already exists")]
    KeyExists(String),
    #[error("Key {0} does not exist")]
    KeyNotFound(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Crypto(#[from] CryptorError),
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// The single write path for key state. All mutations of one key run
/// under that key's lock so concurrent state transitions serialize and
/// the version hash is recomputed inside the critical section. Reads go
/// straight to the store snapshot.
pub struct KeyManager {
    db: Box<dyn Db>,
    cryptor: Box<dyn Cryptor>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyManager {
    pub fn new(db: Box<dyn Db>, cryptor: Box<dyn Cryptor>) -> Self {
        KeyManager {
            db,
            cryptor,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    fn fetch(&self, id: &str) -> Result<DbKey, ManagerError> {
        self.db.get(id).map_err(|e| match e {
            DbError::NotFound => ManagerError::KeyNotFound(id.to_string()),
            DbError::AlreadyExists => ManagerError::Internal("unexpected conflict".to_string()),
            DbError::Internal(m) => ManagerError::Internal(m),
        })
    }

    fn store_update(&self, key: DbKey) -> Result<(), ManagerError> {
        let id = key.id.clone();
        self.db.update(key).map_err(|e| match e {
            DbError::NotFound => ManagerError::KeyNotFound(id),
            DbError::AlreadyExists => ManagerError::Internal("unexpected conflict".to_string()),
            DbError::Internal(m) => ManagerError::Internal(m),
        })
    }

    fn decrypt_key(&self, stored: DbKey) -> Result<Key, ManagerError> {
        let mut versions = Vec::with_capacity(stored.versions.len());
        for v in stored.versions {
            versions.push(KeyVersion {
                data: self.cryptor.decrypt(&v.data)?,
                ..v
            });
        }
        Ok(Key {
            id: stored.id,
            acl: stored.acl,
            versions: KeyVersionList(versions),
            version_hash: stored.version_hash,
            path: None,
        })
    }

    /// All key ids, sorted.
    pub fn get_all_key_ids(&self) -> Result<Vec<String>, ManagerError> {
        let mut ids: Vec<String> = self
            .all_keys()?
            .into_iter()
            .map(|k| k.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Change-poll support: of the ids in `filter`, return those whose
    /// current hash differs from the supplied one. The comparison uses
    /// the default client view (primary + active), which is what the
    /// daemon caches and therefore what it sends back.
    pub fn get_updated_key_ids(
        &self,
        filter: &HashMap<String, String>,
    ) -> Result<Vec<String>, ManagerError> {
        let mut ids = Vec::new();
        for k in self.all_keys()? {
            if let Some(cached_hash) = filter.get(&k.id) {
                let current = k.versions.filtered(VersionStatus::Active).hash();
                if *cached_hash != current {
                    ids.push(k.id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn all_keys(&self) -> Result<Vec<DbKey>, ManagerError> {
        self.db.get_all().map_err(|e| match e {
            DbError::Internal(m) => ManagerError::Internal(m),
            other => ManagerError::Internal(other.to_string()),
        })
    }

    /// Decrypted key with versions filtered to `min` status and the hash
    /// recomputed over the returned view, so clients can verify what
    /// they actually received.
    pub fn get_key(&self, id: &str, min: VersionStatus) -> Result<Key, ManagerError> {
        let mut key = self.decrypt_key(self.fetch(id)?)?;
        key.versions = key.versions.filtered(min);
        key.version_hash = key.versions.hash();
        Ok(key)
    }

    /// Persist a freshly built key. `key` carries cleartext material;
    /// only ciphertext reaches the store.
    pub fn add_new_key(&self, key: Key) -> Result<(), ManagerError> {
        key.validate()?;
        let mut versions = Vec::with_capacity(key.versions.len());
        for v in key.versions {
            versions.push(KeyVersion {
                data: self.cryptor.encrypt(&v.data)?,
                ..v
            });
        }
        let stored = DbKey {
            id: key.id.clone(),
            acl: key.acl,
            versions: KeyVersionList(versions),
            version_hash: key.version_hash,
        };
        self.db.add(stored).map_err(|e| match e {
            DbError::AlreadyExists => ManagerError::KeyExists(key.id.clone()),
            DbError::NotFound => ManagerError::Internal("unexpected not-found".to_string()),
            DbError::Internal(m) => ManagerError::Internal(m),
        })
    }

    /// Append a new `Active` version and recompute the hash.
    pub fn add_version(&self, id: &str, data: &[u8]) -> Result<u64, ManagerError> {
        let lock = self.key_lock(id);
        let _guard = lock.lock();

        let mut stored = self.fetch(id)?;
        let mut version = new_key_version(data.to_vec(), VersionStatus::Active);
        while stored.versions.iter().any(|v| v.id == version.id) {
            version.id = random_version_id();
        }
        let version_id = version.id;
        version.data = self.cryptor.encrypt(&version.data)?;
        stored.versions.0.push(version);
        stored.version_hash = stored.versions.hash();
        self.store_update(stored)?;
        Ok(version_id)
    }

    /// Apply a version status transition under the key's lock.
    pub fn update_version(
        &self,
        id: &str,
        version_id: u64,
        status: VersionStatus,
    ) -> Result<(), ManagerError> {
        let lock = self.key_lock(id);
        let _guard = lock.lock();

        let mut stored = self.fetch(id)?;
        stored.versions = stored.versions.update(version_id, status)?;
        stored.version_hash = stored.versions.hash();
        self.store_update(stored)
    }

    /// Apply ACL mutations in order under the key's lock.
    pub fn put_access(&self, id: &str, entries: &[Access]) -> Result<(), ManagerError> {
        let lock = self.key_lock(id);
        let _guard = lock.lock();

        let mut stored = self.fetch(id)?;
        for entry in entries {
            stored.acl = stored.acl.add(entry.clone());
        }
        self.store_update(stored)
    }

    pub fn delete_key(&self, id: &str) -> Result<(), ManagerError> {
        let lock = self.key_lock(id);
        let _guard = lock.lock();

        self.db.remove(id).map_err(|e| match e {
            DbError::NotFound => ManagerError::KeyNotFound(id.to_string()),
            DbError::AlreadyExists => ManagerError::Internal("unexpected conflict".to_string()),
            DbError::Internal(m) => ManagerError::Internal(m),
        })
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

/// 63 bits of randomness; collisions are handled by re-rolling at the
/// call sites that can see the existing ids.
fn random_version_id() -> u64 {
    rand::random::<u64>() >> 1
}

/// A fresh version with defaults set.
pub fn new_key_version(data: Vec<u8>, status: VersionStatus) -> KeyVersion {
    KeyVersion {
        id: random_version_id(),
        data,
        status,
        creation_time: now_nanos(),
    }
}

/// Build a new key the way creation merges ACLs: the supplied entries,
/// then the creator as a user admin, then the server-wide defaults.
pub fn new_key(id: &str, acl: Acl, data: Vec<u8>, creator: &Principal, defaults: &[Access]) -> Key {
    let mut acl = acl.add(Access::new(
        PrincipalType::User,
        creator.id(),
        AccessType::Admin,
    ));
    for a in defaults {
        acl = acl.add(a.clone());
    }

    let versions = KeyVersionList(vec![new_key_version(data, VersionStatus::Primary)]);
    Key {
        id: id.to_string(),
        version_hash: versions.hash(),
        versions,
        acl,
        path: None,
    }
}
