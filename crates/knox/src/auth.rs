use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use common::client::AuthHandler;

/// Env var carrying a user access token directly.
pub const USER_AUTH_ENV: &str = "KNOX_USER_AUTH";
/// Env var carrying a machine hostname credential directly.
pub const MACHINE_AUTH_ENV: &str = "KNOX_MACHINE_AUTH";

/// Credentials from an environment variable, tagged with the matching
/// provider bytes. Presence of the variable selects the provider.
struct EnvAuthHandler {
    name: &'static str,
    var: &'static str,
    tag: &'static str,
}

impl AuthHandler for EnvAuthHandler {
    fn name(&self) -> &str {
        self.name
    }

    fn header(&self) -> Option<String> {
        match std::env::var(self.var) {
            Ok(value) if !value.is_empty() => Some(format!("{}{}", self.tag, value)),
            _ => None,
        }
    }
}

/// The token-endpoint response `knox login` cached, stored verbatim.
#[derive(Deserialize)]
struct CachedToken {
    access_token: String,
}

/// Credentials from the login token file (`~/.knox_user_auth`).
struct TokenFileAuthHandler {
    path: PathBuf,
}

impl AuthHandler for TokenFileAuthHandler {
    fn name(&self) -> &str {
        "user-token-file"
    }

    fn header(&self) -> Option<String> {
        let bytes = std::fs::read(&self.path).ok()?;
        let token: CachedToken = serde_json::from_slice(&bytes).ok()?;
        if token.access_token.is_empty() {
            return None;
        }
        Some(format!("0u{}", token.access_token))
    }
}

/// The default handler chain: explicit env credentials first (user,
/// then machine), then the cached login token.
pub fn default_auth_handlers(token_file: PathBuf) -> Vec<Arc<dyn AuthHandler>> {
    vec![
        Arc::new(EnvAuthHandler {
            name: "env-user",
            var: USER_AUTH_ENV,
            tag: "0u",
        }),
        Arc::new(EnvAuthHandler {
            name: "env-machine",
            var: MACHINE_AUTH_ENV,
            tag: "0m",
        }),
        Arc::new(TokenFileAuthHandler { path: token_file }),
    ]
}
