use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;

use knox_cli::keys_file::KeysFile;
use knox_cli::REGISTER_FILE;

use crate::cli::op::{ErrorStatus, Op, OpContext};

const REGISTER_RECHECK_TIME: Duration = Duration::from_millis(10);

/// Register keys for the daemon to cache locally.
///
/// Registration only updates the register file and succeeds even when
/// this machine has no access to the key; the daemon does the actual
/// retrieval on its next pass.
#[derive(Args, Debug, Clone)]
pub struct Register {
    /// Remove all registered keys first; with -k or -f the given keys
    /// replace the whole register instead
    #[arg(short = 'r')]
    pub remove: bool,

    /// Key identifier to register
    #[arg(short = 'k', long = "key")]
    pub key: Option<String>,

    /// File containing a newline-separated list of key identifiers
    #[arg(short = 'f', long = "file")]
    pub key_file: Option<PathBuf>,

    /// Wait for the daemon to materialize the key and print it
    #[arg(short = 'g')]
    pub get: bool,

    /// Timeout for -g: plain seconds or a duration like '500ms'
    #[arg(short = 't', long, default_value = "5s")]
    pub timeout: String,
}

/// A plain integer is seconds (historical '-t5' usage); anything else
/// takes a unit suffix, fractional values allowed ('500ms', '0.5s').
pub(crate) fn parse_timeout(val: &str) -> Result<Duration, ErrorStatus> {
    if let Ok(secs) = val.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let bad = || ErrorStatus::client(format!("Invalid value for timeout flag: {}", val));
    let (number, unit_ms): (&str, f64) = if let Some(n) = val.strip_suffix("ms") {
        (n, 1.0)
    } else if let Some(n) = val.strip_suffix('s') {
        (n, 1000.0)
    } else if let Some(n) = val.strip_suffix('m') {
        (n, 60_000.0)
    } else {
        return Err(bad());
    };
    let number: f64 = number.parse().map_err(|_| bad())?;
    if !number.is_finite() || number < 0.0 {
        return Err(bad());
    }
    Ok(Duration::from_secs_f64(number * unit_ms / 1000.0))
}

#[async_trait::async_trait]
impl Op for Register {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let timeout = parse_timeout(&self.timeout)?;
        let mut keys_file = KeysFile::new(ctx.daemon_dir.join(REGISTER_FILE));

        if self.remove && self.key.is_none() && self.key_file.is_none() {
            // `knox register -r` alone unregisters everything
            keys_file
                .lock()
                .map_err(|e| ErrorStatus::client(format!("There was an error obtaining file lock: {}", e)))?;
            let result = keys_file.overwrite(&[]);
            keys_file
                .unlock()
                .map_err(|e| ErrorStatus::client(format!("There was an error unlocking register file: {}", e)))?;
            result
                .map_err(|e| ErrorStatus::client(format!("Failed to unregister all keys: {}", e)))?;
            return Ok("Successfully unregistered all keys.".to_string());
        }

        let keys: Vec<String> = match (&self.key, &self.key_file) {
            (Some(key), _) => vec![key.clone()],
            (None, Some(path)) => std::fs::read_to_string(path)
                .map_err(|e| {
                    ErrorStatus::client(format!("There was an error reading input key file {}", e))
                })?
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            (None, None) => {
                return Err(ErrorStatus::client(
                    "You must include a key or key file to register. see 'knox register --help'",
                ));
            }
        };

        keys_file
            .lock()
            .map_err(|e| ErrorStatus::client(format!("There was an error obtaining file lock: {}", e)))?;
        let result = if self.remove {
            keys_file.overwrite(&keys)
        } else {
            keys_file.add(&keys)
        };
        keys_file
            .unlock()
            .map_err(|e| ErrorStatus::client(format!("There was an error unlocking register file: {}", e)))?;
        result.map_err(|e| {
            ErrorStatus::client(format!("There was an error registering keys {:?}: {}", keys, e))
        })?;

        if self.get {
            let key_id = self.key.as_deref().ok_or_else(|| {
                ErrorStatus::client("-g requires a single key registered with -k")
            })?;
            let key = wait_for_cached_key(ctx, key_id, timeout).await?;
            return serde_json::to_string(&key).map_err(|e| ErrorStatus::client(e.to_string()));
        }

        Ok(format!(
            "Successfully registered keys {:?}. Keys are updated by the daemon process; check its log for the most recent run.",
            keys
        ))
    }
}

/// Poll the cache file every 10ms until the daemon materializes a valid
/// key or the deadline passes. The timeout error carries the most
/// recent underlying failure so operators can see what went wrong.
pub(crate) async fn wait_for_cached_key(
    ctx: &OpContext,
    key_id: &str,
    timeout: Duration,
) -> Result<common::key::Key, ErrorStatus> {
    let deadline = Instant::now() + timeout;
    let mut last_error;
    loop {
        match ctx.client.cache_get_key(key_id) {
            Ok(key) => return Ok(key),
            Err(e) => last_error = e,
        }
        if Instant::now() >= deadline {
            return Err(ErrorStatus::client(format!(
                "Error getting key from daemon (hit timeout after {:?}); check knox logs for details (most recent error: {})",
                timeout, last_error
            )));
        }
        tokio::time::sleep(REGISTER_RECHECK_TIME).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::client::{HttpClient, UncachedClient};
    use knox_cli::token_file_path;

    fn test_ctx(dir: &std::path::Path) -> OpContext {
        let uncached = UncachedClient::new(
            url::Url::parse("http://localhost:1").unwrap(),
            Vec::new(),
            "test",
        );
        OpContext {
            client: HttpClient::new(Some(dir.to_path_buf()), uncached),
            daemon_dir: dir.to_path_buf(),
            token_file: token_file_path(None),
            token_endpoint: None,
            oauth_client_id: None,
        }
    }

    #[tokio::test]
    async fn register_and_get_times_out_without_a_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());

        let start = Instant::now();
        let err = wait_for_cached_key(&ctx, "mykey", Duration::from_millis(500))
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_secs(5));
        assert!(err.message.contains("hit timeout"));
        // the most recent underlying error is included for operators
        assert!(err.message.contains("most recent error"));
        assert!(!err.server_side());
        assert!(!dir.path().join("mykey").exists());
    }

    #[tokio::test]
    async fn register_and_get_returns_once_the_daemon_writes() {
        use common::key::{Key, KeyVersion, KeyVersionList, VersionStatus};

        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());

        // Simulate the daemon publishing the cache file mid-poll.
        let versions = KeyVersionList(vec![KeyVersion {
            id: 1,
            data: b"secret".to_vec(),
            status: VersionStatus::Primary,
            creation_time: 0,
        }]);
        let key = Key {
            id: "mykey".to_string(),
            acl: Default::default(),
            version_hash: versions.hash(),
            versions,
            path: None,
        };
        let path = dir.path().join("mykey");
        let bytes = serde_json::to_vec(&key).unwrap();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::write(path, bytes).unwrap();
        });

        let fetched = wait_for_cached_key(&ctx, "mykey", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(fetched.id, "mykey");
        writer.await.unwrap();
    }

    #[test]
    fn timeout_values() {
        assert_eq!(parse_timeout("5").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_timeout("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_timeout("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_timeout("0.5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_timeout("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_timeout("").is_err());
        assert!(parse_timeout("abc").is_err());
        assert!(parse_timeout("-1s").is_err());
    }
}
