use clap::Args;
use serde::Deserialize;

use crate::cli::op::{ErrorStatus, Op, OpContext};

/// Authenticate via the OAuth2 password grant and cache the token
/// response for the user auth handler.
#[derive(Args, Debug, Clone)]
pub struct Login {
    /// User to log in as (defaults to the OS user)
    pub username: Option<String>,
}

#[derive(Deserialize)]
struct AuthTokenResp {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    error: String,
}

#[async_trait::async_trait]
impl Op for Login {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let endpoint = ctx.token_endpoint.as_deref().ok_or_else(|| {
            ErrorStatus::client("No OAuth token endpoint configured; set KNOX_TOKEN_ENDPOINT")
        })?;
        let client_id = ctx.oauth_client_id.as_deref().unwrap_or("knox");

        let username = match &self.username {
            Some(name) => name.clone(),
            None => std::env::var("USER")
                .map_err(|_| ErrorStatus::client("Could not determine the OS user"))?,
        };

        eprintln!("Please enter your password:");
        let mut password = String::new();
        std::io::stdin()
            .read_line(&mut password)
            .map_err(|e| ErrorStatus::client(format!("Problem getting password: {}", e)))?;
        let password = password.trim_end_matches(['\r', '\n']);

        let form = [
            ("grant_type", "password"),
            ("client_id", client_id),
            ("username", &username),
            ("password", password),
        ];
        let resp = reqwest::Client::new()
            .post(endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| ErrorStatus::client(format!("Error connecting to auth: {}", e)))?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| ErrorStatus::client(format!("Failed to read data: {}", e)))?;

        let parsed: AuthTokenResp = serde_json::from_slice(&body).map_err(|e| {
            ErrorStatus::client(format!(
                "Unexpected response from auth: {}, data: {}",
                e,
                String::from_utf8_lossy(&body)
            ))
        })?;
        if !parsed.error.is_empty() {
            return Err(ErrorStatus::client(format!(
                "Fail to authenticate: {:?}",
                parsed.error
            )));
        }
        if parsed.access_token.is_empty() {
            return Err(ErrorStatus::client("Auth response held no access token"));
        }

        // The raw response is cached verbatim, owner-readable only.
        write_token_file(&ctx.token_file, &body)
            .map_err(|e| ErrorStatus::client(format!("Failed to write auth data to file: {}", e)))?;
        Ok(format!("Logged in as {}.", username))
    }
}

fn write_token_file(path: &std::path::Path, body: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, body)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
