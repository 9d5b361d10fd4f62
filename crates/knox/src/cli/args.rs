pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

use knox_cli::DEFAULT_DAEMON_DIR;

#[derive(Parser, Debug)]
#[command(name = "knox")]
#[command(about = "Client for the knox secret management service")]
pub struct Args {
    /// Knox server to talk to
    #[arg(long, global = true, default_value = "http://localhost:9000")]
    pub remote: Url,

    /// Directory the daemon keeps the register file and cached keys in
    #[arg(long, global = true, default_value = DEFAULT_DAEMON_DIR)]
    pub dir: PathBuf,

    /// Path to the cached login token (defaults to ~/.knox_user_auth)
    #[arg(long, global = true)]
    pub token_file: Option<PathBuf>,

    /// OAuth token endpoint for `knox login`
    #[arg(long, global = true, env = "KNOX_TOKEN_ENDPOINT")]
    pub token_endpoint: Option<String>,

    /// OAuth client id for `knox login`
    #[arg(long, global = true, env = "KNOX_CLIENT_ID")]
    pub client_id: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
