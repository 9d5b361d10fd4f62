use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use common::principal::Principal;

use super::{AuthError, Provider, RequestContext};

#[derive(Deserialize)]
struct LoginFormat {
    login: String,
}

/// User authentication through an OAuth identity provider. The payload
/// is treated as a bearer access token; the provider resolves the user
/// and group memberships from `<endpoint>/user` and `<endpoint>/user/orgs`.
pub struct BearerUserProvider {
    endpoint: String,
    client: reqwest::Client,
}

impl BearerUserProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        BearerUserProvider {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn get_api<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> Result<T, AuthError> {
        let resp = self
            .client
            .get(format!("{}{}", self.endpoint, path))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| AuthError::IdentityEndpoint(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AuthError::IdentityEndpoint(format!(
                "API request returned status: {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| AuthError::IdentityEndpoint(e.to_string()))
    }
}

#[async_trait]
impl Provider for BearerUserProvider {
    fn name(&self) -> &'static str {
        "user"
    }

    fn type_byte(&self) -> u8 {
        b'u'
    }

    async fn authenticate(
        &self,
        payload: &str,
        _ctx: &RequestContext,
    ) -> Result<Principal, AuthError> {
        let user: LoginFormat = self.get_api("/user", payload).await?;
        let orgs: Vec<LoginFormat> = self.get_api("/user/orgs", payload).await?;
        Ok(Principal::user(user.login, orgs.into_iter().map(|o| o.login)))
    }
}

/// User provider with a canned identity, for tests and the dev server.
/// Any token other than the empty string or `notvalid` logs in as
/// `testuser` in group `testgroup`.
pub struct MockUserProvider;

pub fn mock_user_provider() -> MockUserProvider {
    MockUserProvider
}

#[async_trait]
impl Provider for MockUserProvider {
    fn name(&self) -> &'static str {
        "mock-user"
    }

    fn type_byte(&self) -> u8 {
        b'u'
    }

    async fn authenticate(
        &self,
        payload: &str,
        _ctx: &RequestContext,
    ) -> Result<Principal, AuthError> {
        if payload.is_empty() || payload == "notvalid" {
            return Err(AuthError::BadToken);
        }
        Ok(Principal::user("testuser", ["testgroup".to_string()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_accepts_and_rejects() {
        let p = mock_user_provider();
        let principal = p
            .authenticate("sometoken", &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(principal.id(), "testuser");
        assert!(principal.is_user());

        assert!(p
            .authenticate("notvalid", &RequestContext::default())
            .await
            .is_err());
    }
}
