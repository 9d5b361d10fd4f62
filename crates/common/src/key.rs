use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::access::{Acl, AclError};

/// Characters permitted in a key identifier.
const KEY_ID_CHARS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_:.-";

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("KeyID includes unsupported characters {0}")]
    InvalidKeyId(String),
    #[error("key version {0} does not exist")]
    VersionNotFound(u64),
    #[error("cannot transition key version from {from} to {to}")]
    InvalidTransition {
        from: VersionStatus,
        to: VersionStatus,
    },
    #[error("key version list must have exactly one primary version")]
    PrimaryCountInvalid,
    #[error("duplicate key version id {0}")]
    DuplicateVersionId(u64),
    #[error("version hash does not match version list")]
    HashMismatch,
    #[error(transparent)]
    Acl(#[from] AclError),
}

/// Lifecycle status of a key version. Exactly one version of a key is
/// `Primary` at any time; the ordering is used for min-status filtering
/// (`Primary > Active > Inactive`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionStatus {
    Primary,
    Active,
    Inactive,
}

impl VersionStatus {
    fn rank(self) -> u8 {
        match self {
            VersionStatus::Primary => 2,
            VersionStatus::Active => 1,
            VersionStatus::Inactive => 0,
        }
    }

    /// Whether this status clears the given minimum (e.g. `Active`
    /// covers `Primary` and `Active`).
    pub fn at_least(self, min: VersionStatus) -> bool {
        self.rank() >= min.rank()
    }
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VersionStatus::Primary => "Primary",
            VersionStatus::Active => "Active",
            VersionStatus::Inactive => "Inactive",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for VersionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(VersionStatus::Primary),
            "active" => Ok(VersionStatus::Active),
            "inactive" => Ok(VersionStatus::Inactive),
            other => Err(format!("invalid version status: {}", other)),
        }
    }
}

/// One version of a key's material. `data` is ciphertext at rest on the
/// server and cleartext in responses to authorized readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVersion {
    pub id: u64,
    #[serde(with = "b64_bytes")]
    pub data: Vec<u8>,
    pub status: VersionStatus,
    #[serde(rename = "ts")]
    pub creation_time: i64,
}

/// Byte blobs travel as standard base64 strings, matching the wire and
/// cache-file encoding expected by every other knox client.
mod b64_bytes {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64_STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        BASE64_STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Ordered list of key versions. Order is meaningful: the version hash is
/// computed over the ordered `(id, status)` projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyVersionList(pub Vec<KeyVersion>);

impl KeyVersionList {
    /// Digest of the ordered `(id, status)` projection. Changes to data or
    /// creation time do not affect it; any reorder or status change does.
    pub fn hash(&self) -> String {
        use base64::prelude::*;

        let mut hasher = blake3::Hasher::new();
        for v in &self.0 {
            hasher.update(&v.id.to_be_bytes());
            hasher.update(&[v.status.rank()]);
        }
        BASE64_STANDARD.encode(hasher.finalize().as_bytes())
    }

    pub fn get_primary(&self) -> Option<&KeyVersion> {
        self.0.iter().find(|v| v.status == VersionStatus::Primary)
    }

    pub fn get_active(&self) -> impl Iterator<Item = &KeyVersion> {
        self.0.iter().filter(|v| v.status == VersionStatus::Active)
    }

    /// Versions whose status clears `min`, preserving list order.
    pub fn filtered(&self, min: VersionStatus) -> KeyVersionList {
        KeyVersionList(
            self.0
                .iter()
                .filter(|v| v.status.at_least(min))
                .cloned()
                .collect(),
        )
    }

    /// Apply a status transition, returning the updated list.
    ///
    /// Legal transitions are `Active -> Primary` (which atomically demotes
    /// the current primary to active), `Active -> Inactive`, and
    /// `Inactive -> Active`. Everything else is rejected.
    pub fn update(&self, version_id: u64, new_status: VersionStatus) -> Result<Self, KeyError> {
        let current = self
            .0
            .iter()
            .find(|v| v.id == version_id)
            .ok_or(KeyError::VersionNotFound(version_id))?;

        let legal = matches!(
            (current.status, new_status),
            (VersionStatus::Active, VersionStatus::Primary)
                | (VersionStatus::Active, VersionStatus::Inactive)
                | (VersionStatus::Inactive, VersionStatus::Active)
        );
        if !legal {
            return Err(KeyError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        let mut updated = self.0.clone();
        for v in &mut updated {
            if v.id == version_id {
                v.status = new_status;
            } else if new_status == VersionStatus::Primary && v.status == VersionStatus::Primary {
                v.status = VersionStatus::Active;
            }
        }
        Ok(KeyVersionList(updated))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyVersion> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// List invariants alone: exactly one primary, unique version ids.
    pub fn validate(&self) -> Result<(), KeyError> {
        let primaries = self
            .0
            .iter()
            .filter(|v| v.status == VersionStatus::Primary)
            .count();
        if primaries != 1 {
            return Err(KeyError::PrimaryCountInvalid);
        }
        let mut seen = std::collections::HashSet::new();
        for v in &self.0 {
            if !seen.insert(v.id) {
                return Err(KeyError::DuplicateVersionId(v.id));
            }
        }
        Ok(())
    }
}

impl IntoIterator for KeyVersionList {
    type Item = KeyVersion;
    type IntoIter = std::vec::IntoIter<KeyVersion>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A named, versioned key with its access-control list.
///
/// `version_hash` must always equal `versions.hash()`; both the server and
/// every client validate this on read and reject mismatches. `path` is set
/// only on the client side when the key was loaded from a cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub id: String,
    pub acl: Acl,
    pub versions: KeyVersionList,
    #[serde(rename = "hash")]
    pub version_hash: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<PathBuf>,
}

impl Key {
    /// Check every invariant of the key object. Called by the server
    /// before persisting and by clients on every value they receive.
    pub fn validate(&self) -> Result<(), KeyError> {
        if !valid_key_id(&self.id) {
            return Err(KeyError::InvalidKeyId(self.id.clone()));
        }
        self.versions.validate()?;
        if self.version_hash != self.versions.hash() {
            return Err(KeyError::HashMismatch);
        }
        self.acl.validate()?;
        Ok(())
    }
}

/// Key identifiers are non-empty and restricted to `[A-Za-z0-9_:.-]`.
pub fn valid_key_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| KEY_ID_CHARS.contains(c))
}
