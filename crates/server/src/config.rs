use std::net::SocketAddr;
use std::path::PathBuf;

use common::access::Access;

use crate::keydb::MASTER_KEY_SIZE;

/// Server configuration, assembled by the binary from flags and files.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub listen_addr: SocketAddr,
    /// Hostname reported in response envelopes.
    pub hostname: String,
    /// Master key sealing key material at rest.
    pub master_key: [u8; MASTER_KEY_SIZE],
    /// OAuth identity endpoint for bearer-token user auth. When unset
    /// the mock user provider is registered instead (dev mode).
    pub user_auth_endpoint: Option<String>,
    /// Root fingerprints trusted for mTLS and SPIFFE authentication.
    /// Empty disables the cert-based providers.
    pub trusted_issuers: Vec<String>,
    /// Accesses granted on every created key, beyond the creator.
    pub default_access: Vec<Access>,
    /// Minimum path components required of ServicePrefix ACL entries.
    pub service_prefix_min_components: usize,

    pub log_level: tracing::Level,
    /// Directory for log files; stdout only when unset.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("master key file {0}: {1}")]
    MasterKeyFile(PathBuf, std::io::Error),
    #[error("master key must be {expected} hex-encoded bytes")]
    MasterKeyFormat { expected: usize },
}

impl Config {
    /// Read a hex-encoded master key from a file.
    pub fn load_master_key(path: &PathBuf) -> Result<[u8; MASTER_KEY_SIZE], ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::MasterKeyFile(path.clone(), e))?;
        let text = text.trim();
        let expected = MASTER_KEY_SIZE;
        if text.len() != expected * 2 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ConfigError::MasterKeyFormat { expected });
        }
        let mut key = [0u8; MASTER_KEY_SIZE];
        for (i, chunk) in text.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk).expect("chunks of ascii hex");
            key[i] = u8::from_str_radix(hex, 16)
                .map_err(|_| ConfigError::MasterKeyFormat { expected })?;
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_key_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.key");

        std::fs::write(&path, format!("{}\n", "ab".repeat(32))).unwrap();
        let key = Config::load_master_key(&path).unwrap();
        assert_eq!(key, [0xab; 32]);

        std::fs::write(&path, "tooshort").unwrap();
        assert!(matches!(
            Config::load_master_key(&path),
            Err(ConfigError::MasterKeyFormat { .. })
        ));

        std::fs::write(&path, "zz".repeat(32)).unwrap();
        assert!(Config::load_master_key(&path).is_err());
    }
}
