use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use url::Url;

use super::{backoff_duration, ClientError, MAX_RETRY_ATTEMPTS};
use crate::access::{Access, Acl};
use crate::key::{Key, VersionStatus};
use crate::response::{Code, Response};

/// A source of client credentials. Handlers are tried in order; a handler
/// that cannot currently produce credentials returns `None` and is
/// skipped. A handler may carry its own HTTP client, e.g. one configured
/// with a client certificate identity.
pub trait AuthHandler: Send + Sync {
    /// Short label for logs ("user", "machine", ...).
    fn name(&self) -> &str;

    /// The full `Authorization` header value, tag bytes included
    /// (e.g. `0u<token>`).
    fn header(&self) -> Option<String>;

    fn http_client(&self) -> Option<&reqwest::Client> {
        None
    }
}

/// Fixed-credential handler, used by tests and by env-variable auth.
pub struct StaticAuthHandler {
    name: String,
    header: String,
    client: Option<reqwest::Client>,
}

impl StaticAuthHandler {
    pub fn new(name: impl Into<String>, header: impl Into<String>) -> Self {
        StaticAuthHandler {
            name: name.into(),
            header: header.into(),
            client: None,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }
}

impl AuthHandler for StaticAuthHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn header(&self) -> Option<String> {
        if self.header.is_empty() {
            None
        } else {
            Some(self.header.clone())
        }
    }

    fn http_client(&self) -> Option<&reqwest::Client> {
        self.client.as_ref()
    }
}

/// Client that always goes over the network. Carries the auth handler
/// chain and the retry loop for transient server errors.
#[derive(Clone)]
pub struct UncachedClient {
    remote: Url,
    auth_handlers: Vec<Arc<dyn AuthHandler>>,
    client: reqwest::Client,
    version: String,
}

enum Body<'a> {
    None,
    Form(&'a [(&'a str, String)]),
}

impl UncachedClient {
    pub fn new(remote: Url, auth_handlers: Vec<Arc<dyn AuthHandler>>, version: &str) -> Self {
        UncachedClient {
            remote,
            auth_handlers,
            client: reqwest::Client::new(),
            version: version.to_string(),
        }
    }

    pub fn remote(&self) -> &Url {
        &self.remote
    }

    /// Issue one request per auth handler until a handler is authorized.
    /// `UnauthorizedCode` advances to the next handler; any other outcome
    /// is final. No usable handler at all fails before any request.
    async fn get_http_data<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(String, String)],
        body: Body<'_>,
    ) -> Result<T, ClientError> {
        let mut url = self.remote.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut attempted = false;
        let mut last_unauthorized = String::new();
        for handler in &self.auth_handlers {
            let Some(auth) = handler.header() else {
                continue;
            };
            attempted = true;

            let client = handler.http_client().unwrap_or(&self.client);
            match self
                .request_with_retry::<T>(client, method.clone(), url.clone(), &auth, &body)
                .await
            {
                Err(ClientError::Api { code, message }) if code == Code::Unauthorized => {
                    tracing::debug!(handler = handler.name(), "auth handler unauthorized");
                    last_unauthorized = message;
                    continue;
                }
                other => return other,
            }
        }

        if attempted {
            Err(ClientError::UnsuccessfulAuth(last_unauthorized))
        } else {
            Err(ClientError::NoAuth)
        }
    }

    /// One handler's request, retried on internal server errors only, up
    /// to three attempts with bounded random backoff. Transport errors
    /// surface immediately. A retry keeps previously decoded `data` so a
    /// later success with empty data still yields the earlier payload.
    async fn request_with_retry<T: DeserializeOwned>(
        &self,
        client: &reqwest::Client,
        method: reqwest::Method,
        url: Url,
        auth: &str,
        body: &Body<'_>,
    ) -> Result<T, ClientError> {
        let mut held_data: Option<serde_json::Value> = None;
        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            let mut req = client
                .request(method.clone(), url.clone())
                .header("Authorization", auth)
                .header("User-Agent", format!("Knox_Client/{}", self.version));
            if let Body::Form(fields) = body {
                req = req.form(fields);
            }

            let resp: Response = req.send().await?.json().await?;
            let ok = resp.is_ok();
            let data = resp.data.or_else(|| held_data.take());

            if ok {
                return Ok(serde_json::from_value(
                    data.unwrap_or(serde_json::Value::Null),
                )?);
            }
            if resp.code != Code::InternalServerError || attempt == MAX_RETRY_ATTEMPTS {
                return Err(ClientError::Api {
                    code: resp.code,
                    message: resp.message,
                });
            }
            held_data = data;
            tokio::time::sleep(backoff_duration(attempt)).await;
        }
        unreachable!("retry loop always returns")
    }

    pub async fn network_get_key(&self, key_id: &str) -> Result<Key, ClientError> {
        let key: Key = self
            .get_http_data(
                reqwest::Method::GET,
                &format!("/v0/keys/{}/", key_id),
                &[],
                Body::None,
            )
            .await?;
        key.validate().map_err(ClientError::InvalidRemoteKey)?;
        Ok(key)
    }

    pub async fn network_get_key_with_status(
        &self,
        key_id: &str,
        status: VersionStatus,
    ) -> Result<Key, ClientError> {
        let status_param = serde_json::to_string(&status)?;
        let key: Key = self
            .get_http_data(
                reqwest::Method::GET,
                &format!("/v0/keys/{}/", key_id),
                &[("status".to_string(), status_param)],
                Body::None,
            )
            .await?;
        key.validate().map_err(ClientError::InvalidRemoteKey)?;
        Ok(key)
    }

    pub async fn get_key(&self, key_id: &str) -> Result<Key, ClientError> {
        self.network_get_key(key_id).await
    }

    pub async fn get_key_with_status(
        &self,
        key_id: &str,
        status: VersionStatus,
    ) -> Result<Key, ClientError> {
        self.network_get_key_with_status(key_id, status).await
    }

    /// Create a key; the server responds with the initial version id.
    pub async fn create_key(
        &self,
        key_id: &str,
        data: &[u8],
        acl: &Acl,
    ) -> Result<u64, ClientError> {
        use base64::prelude::*;
        let form = [
            ("id", key_id.to_string()),
            ("data", BASE64_STANDARD.encode(data)),
            ("acl", serde_json::to_string(acl)?),
        ];
        self.get_http_data(reqwest::Method::POST, "/v0/keys/", &[], Body::Form(&form))
            .await
    }

    /// List key ids. With a non-empty filter of `id -> versionHash`, only
    /// ids whose current hash differs come back.
    pub async fn get_keys(
        &self,
        filter: &HashMap<String, String>,
    ) -> Result<Vec<String>, ClientError> {
        let query: Vec<(String, String)> = filter
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.get_http_data(reqwest::Method::GET, "/v0/keys/", &query, Body::None)
            .await
    }

    pub async fn delete_key(&self, key_id: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .get_http_data(
                reqwest::Method::DELETE,
                &format!("/v0/keys/{}/", key_id),
                &[],
                Body::None,
            )
            .await?;
        Ok(())
    }

    pub async fn get_acl(&self, key_id: &str) -> Result<Acl, ClientError> {
        self.get_http_data(
            reqwest::Method::GET,
            &format!("/v0/keys/{}/access/", key_id),
            &[],
            Body::None,
        )
        .await
    }

    /// Apply ACL mutations in order; `None` entries revoke.
    pub async fn put_access(&self, key_id: &str, entries: &[Access]) -> Result<(), ClientError> {
        let form = [("acl", serde_json::to_string(entries)?)];
        let _: serde_json::Value = self
            .get_http_data(
                reqwest::Method::PUT,
                &format!("/v0/keys/{}/access/", key_id),
                &[],
                Body::Form(&form),
            )
            .await?;
        Ok(())
    }

    pub async fn add_version(&self, key_id: &str, data: &[u8]) -> Result<u64, ClientError> {
        use base64::prelude::*;
        let form = [("data", BASE64_STANDARD.encode(data))];
        self.get_http_data(
            reqwest::Method::POST,
            &format!("/v0/keys/{}/versions/", key_id),
            &[],
            Body::Form(&form),
        )
        .await
    }

    pub async fn update_version(
        &self,
        key_id: &str,
        version_id: &str,
        status: VersionStatus,
    ) -> Result<(), ClientError> {
        let form = [("status", serde_json::to_string(&status)?)];
        let _: serde_json::Value = self
            .get_http_data(
                reqwest::Method::PUT,
                &format!("/v0/keys/{}/versions/{}/", key_id, version_id),
                &[],
                Body::Form(&form),
            )
            .await?;
        Ok(())
    }
}

/// Client that prefers the daemon's on-disk cache and falls back to the
/// network when the cache is missing or fails validation.
#[derive(Clone)]
pub struct HttpClient {
    /// Location of cached keys; `None` disables cache reads.
    key_folder: Option<PathBuf>,
    uncached: UncachedClient,
}

impl HttpClient {
    pub fn new(key_folder: Option<PathBuf>, uncached: UncachedClient) -> Self {
        HttpClient {
            key_folder,
            uncached,
        }
    }

    pub fn uncached(&self) -> &UncachedClient {
        &self.uncached
    }

    /// Read a key from the daemon's cache file. The value must pass full
    /// validation; a stale or torn file is an error, never a bad key.
    pub fn cache_get_key(&self, key_id: &str) -> Result<Key, ClientError> {
        let folder = self.key_folder.as_ref().ok_or(ClientError::NoCacheFolder)?;
        let path = folder.join(key_id);
        let bytes = std::fs::read(&path)?;
        let mut key: Key = serde_json::from_slice(&bytes)?;
        key.path = Some(path);
        key.validate().map_err(ClientError::InvalidCachedKey)?;
        Ok(key)
    }

    /// The daemon only ever writes the default view of a key, so there is
    /// no per-status cache file to read; non-default statuses always go
    /// to the network.
    pub fn cache_get_key_with_status(
        &self,
        key_id: &str,
        status: VersionStatus,
    ) -> Result<Key, ClientError> {
        if status == VersionStatus::Active {
            self.cache_get_key(key_id)
        } else {
            Err(ClientError::NoCacheForStatus)
        }
    }

    pub async fn get_key(&self, key_id: &str) -> Result<Key, ClientError> {
        match self.cache_get_key(key_id) {
            Ok(key) => Ok(key),
            Err(_) => self.uncached.network_get_key(key_id).await,
        }
    }

    pub async fn get_key_with_status(
        &self,
        key_id: &str,
        status: VersionStatus,
    ) -> Result<Key, ClientError> {
        match self.cache_get_key_with_status(key_id, status) {
            Ok(key) => Ok(key),
            Err(_) => {
                self.uncached
                    .network_get_key_with_status(key_id, status)
                    .await
            }
        }
    }

    pub async fn network_get_key(&self, key_id: &str) -> Result<Key, ClientError> {
        self.uncached.network_get_key(key_id).await
    }

    pub async fn network_get_key_with_status(
        &self,
        key_id: &str,
        status: VersionStatus,
    ) -> Result<Key, ClientError> {
        self.uncached
            .network_get_key_with_status(key_id, status)
            .await
    }

    pub async fn create_key(
        &self,
        key_id: &str,
        data: &[u8],
        acl: &Acl,
    ) -> Result<u64, ClientError> {
        self.uncached.create_key(key_id, data, acl).await
    }

    pub async fn get_keys(
        &self,
        filter: &HashMap<String, String>,
    ) -> Result<Vec<String>, ClientError> {
        self.uncached.get_keys(filter).await
    }

    pub async fn delete_key(&self, key_id: &str) -> Result<(), ClientError> {
        self.uncached.delete_key(key_id).await
    }

    pub async fn get_acl(&self, key_id: &str) -> Result<Acl, ClientError> {
        self.uncached.get_acl(key_id).await
    }

    pub async fn put_access(&self, key_id: &str, entries: &[Access]) -> Result<(), ClientError> {
        self.uncached.put_access(key_id, entries).await
    }

    pub async fn add_version(&self, key_id: &str, data: &[u8]) -> Result<u64, ClientError> {
        self.uncached.add_version(key_id, data).await
    }

    pub async fn update_version(
        &self,
        key_id: &str,
        version_id: &str,
        status: VersionStatus,
    ) -> Result<(), ClientError> {
        self.uncached
            .update_version(key_id, version_id, status)
            .await
    }
}
