use common::access::Acl;
use common::key::KeyVersionList;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

mod cryptor;

pub use cryptor::{ChaChaCryptor, Cryptor, CryptorError, MASTER_KEY_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("key not found")]
    NotFound,
    #[error("key already exists")]
    AlreadyExists,
    #[error("{0}")]
    Internal(String),
}

/// A key as stored: same shape as the API object, but every version's
/// data field holds ciphertext produced by the cryptor. The stored
/// `version_hash` covers the full version list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbKey {
    pub id: String,
    pub acl: Acl,
    pub versions: KeyVersionList,
    pub version_hash: String,
}

/// Pluggable key/value store of encrypted key records. Implementations
/// must make `add` fail on existing ids and `update`/`remove` fail on
/// missing ones; everything else about the backend is its own business.
pub trait Db: Send + Sync {
    fn get(&self, id: &str) -> Result<DbKey, DbError>;
    fn get_all(&self) -> Result<Vec<DbKey>, DbError>;
    fn add(&self, key: DbKey) -> Result<(), DbError>;
    fn update(&self, key: DbKey) -> Result<(), DbError>;
    fn remove(&self, id: &str) -> Result<(), DbError>;
}

impl<T: Db + ?Sized> Db for std::sync::Arc<T> {
    fn get(&self, id: &str) -> Result<DbKey, DbError> {
        (**self).get(id)
    }

    fn get_all(&self) -> Result<Vec<DbKey>, DbError> {
        (**self).get_all()
    }

    fn add(&self, key: DbKey) -> Result<(), DbError> {
        (**self).add(key)
    }

    fn update(&self, key: DbKey) -> Result<(), DbError> {
        (**self).update(key)
    }

    fn remove(&self, id: &str) -> Result<(), DbError> {
        (**self).remove(id)
    }
}

/// In-memory store for tests and the dev server. `set_error` makes every
/// subsequent call fail with the given message, which route tests use to
/// exercise the internal-error paths.
#[derive(Default)]
pub struct TempDb {
    keys: RwLock<Vec<DbKey>>,
    error: RwLock<Option<String>>,
}

impl TempDb {
    pub fn new() -> Self {
        TempDb::default()
    }

    pub fn set_error(&self, message: Option<&str>) {
        *self.error.write() = message.map(|m| m.to_string());
    }

    fn check_error(&self) -> Result<(), DbError> {
        match self.error.read().as_ref() {
            Some(message) => Err(DbError::Internal(message.clone())),
            None => Ok(()),
        }
    }
}

impl Db for TempDb {
    fn get(&self, id: &str) -> Result<DbKey, DbError> {
        self.check_error()?;
        self.keys
            .read()
            .iter()
            .find(|k| k.id == id)
            .cloned()
            .ok_or(DbError::NotFound)
    }

    fn get_all(&self) -> Result<Vec<DbKey>, DbError> {
        self.check_error()?;
        Ok(self.keys.read().clone())
    }

    fn add(&self, key: DbKey) -> Result<(), DbError> {
        self.check_error()?;
        let mut keys = self.keys.write();
        if keys.iter().any(|k| k.id == key.id) {
            return Err(DbError::AlreadyExists);
        }
        keys.push(key);
        Ok(())
    }

    fn update(&self, key: DbKey) -> Result<(), DbError> {
        self.check_error()?;
        let mut keys = self.keys.write();
        match keys.iter_mut().find(|k| k.id == key.id) {
            Some(slot) => {
                *slot = key;
                Ok(())
            }
            None => Err(DbError::NotFound),
        }
    }

    fn remove(&self, id: &str) -> Result<(), DbError> {
        self.check_error()?;
        let mut keys = self.keys.write();
        let before = keys.len();
        keys.retain(|k| k.id != id);
        if keys.len() == before {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_key(id: &str) -> DbKey {
        DbKey {
            id: id.to_string(),
            acl: Acl::default(),
            versions: KeyVersionList::default(),
            version_hash: String::new(),
        }
    }

    #[test]
    fn temp_db_crud() {
        let db = TempDb::new();
        db.add(db_key("a1")).unwrap();
        assert!(matches!(db.add(db_key("a1")), Err(DbError::AlreadyExists)));
        assert_eq!(db.get("a1").unwrap().id, "a1");
        assert!(matches!(db.get("missing"), Err(DbError::NotFound)));

        db.update(db_key("a1")).unwrap();
        assert!(matches!(db.update(db_key("a2")), Err(DbError::NotFound)));

        db.remove("a1").unwrap();
        assert!(matches!(db.remove("a1"), Err(DbError::NotFound)));
    }

    #[test]
    fn injected_errors_poison_every_call() {
        let db = TempDb::new();
        db.add(db_key("a1")).unwrap();
        db.set_error(Some("Test Error"));
        assert!(matches!(db.get("a1"), Err(DbError::Internal(_))));
        assert!(matches!(db.get_all(), Err(DbError::Internal(_))));
        db.set_error(None);
        assert_eq!(db.get("a1").unwrap().id, "a1");
    }
}
