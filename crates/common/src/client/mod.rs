use std::time::Duration;

use crate::key::KeyError;
use crate::response::Code;

mod file;
mod http;

pub use file::{register, FileClient};
pub use http::{AuthHandler, HttpClient, StaticAuthHandler, UncachedClient};

/// How often the file client re-reads its cache file.
pub const CACHE_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Linear random backoff for retried requests.
pub(crate) const BASE_BACKOFF: Duration = Duration::from_millis(50);
pub(crate) const MAX_BACKOFF: Duration = Duration::from_secs(3);
pub(crate) const MAX_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(
        "no authentication data given; use 'knox login' or set KNOX_USER_AUTH or KNOX_MACHINE_AUTH"
    )]
    NoAuth,
    #[error("no authorized principal; last server message: {0}")]
    UnsuccessfulAuth(String),
    #[error("{message}")]
    Api { code: Code, message: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid key content for the cached key: {0}")]
    InvalidCachedKey(KeyError),
    #[error("invalid key content for the remote key: {0}")]
    InvalidRemoteKey(KeyError),
    #[error("no folder set for cached key")]
    NoCacheFolder,
    #[error("cache does not hold per-status views")]
    NoCacheForStatus,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the failure came back from the server rather than from
    /// client-side validation or transport. Drives the CLI exit status.
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            ClientError::Api { .. } | ClientError::UnsuccessfulAuth(_)
        )
    }
}

/// Sleep duration before retry number `attempt`: the base plus a linear
/// step with uniform jitter, clamped to `[base, 3s]`.
pub fn backoff_duration(attempt: u32) -> Duration {
    let jitter = Duration::from_millis(rand::random::<u64>() % BASE_BACKOFF.as_millis() as u64);
    (BASE_BACKOFF * attempt + jitter).clamp(BASE_BACKOFF, MAX_BACKOFF)
}
