/**
 * Client credential sources: env variables and the login token file.
 */
pub mod auth;
/**
 * The host daemon: keeps registered keys cached on disk and fresh.
 */
pub mod daemon;
/**
 * The lock-protected register file shared by the CLI and the daemon.
 */
pub mod keys_file;

use std::path::PathBuf;

/// Default directory the daemon keeps the register file and per-key
/// cache files in.
pub const DEFAULT_DAEMON_DIR: &str = "/var/lib/knox/v0/keys";

/// Name of the register file inside the daemon directory.
pub const REGISTER_FILE: &str = "register";

/// Default location of the cached user auth token, relative to $HOME.
pub const TOKEN_FILE_NAME: &str = ".knox_user_auth";

/// Resolve the user auth token path: an explicit path wins, otherwise
/// `~/.knox_user_auth`.
pub fn token_file_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(TOKEN_FILE_NAME)
}
