use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use knox_server::config::Config;
use knox_server::keydb::MASTER_KEY_SIZE;
use knox_server::process;

#[derive(Parser, Debug)]
#[command(name = "knox-server")]
#[command(about = "Centralized secret management service")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:9000")]
    listen_addr: SocketAddr,

    /// Hostname reported in response envelopes (defaults to $HOSTNAME)
    #[arg(long)]
    hostname: Option<String>,

    /// File holding the hex-encoded 32-byte master key. Without it an
    /// ephemeral key is generated and stored keys die with the process.
    #[arg(long)]
    master_key_file: Option<PathBuf>,

    /// OAuth identity endpoint for user authentication. Without it the
    /// mock user provider is registered (dev mode only).
    #[arg(long)]
    user_auth_endpoint: Option<String>,

    /// Trusted root fingerprint for mTLS/SPIFFE auth (repeatable)
    #[arg(long = "trusted-issuer")]
    trusted_issuers: Vec<String>,

    /// JSON list of accesses granted on every created key
    #[arg(long)]
    default_access: Option<String>,

    /// Minimum path components required of ServicePrefix ACL entries
    #[arg(long, default_value_t = 1)]
    service_prefix_min_components: usize,

    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Directory for log files (stdout only if not set)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let _guards =
        process::init_logging(args.log_level, args.log_dir.as_deref(), "knox-server.log");

    let master_key = match &args.master_key_file {
        Some(path) => match Config::load_master_key(path) {
            Ok(key) => key,
            Err(e) => {
                tracing::error!("failed to load master key: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("no master key file; using an ephemeral key (dev mode)");
            let mut key = [0u8; MASTER_KEY_SIZE];
            if getrandom::getrandom(&mut key).is_err() {
                tracing::error!("failed to generate an ephemeral master key");
                std::process::exit(1);
            }
            key
        }
    };

    let default_access = match &args.default_access {
        Some(text) => match serde_json::from_str(text) {
            Ok(list) => list,
            Err(e) => {
                tracing::error!("invalid --default-access: {}", e);
                std::process::exit(1);
            }
        },
        None => Vec::new(),
    };

    let hostname = args
        .hostname
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string());

    let config = Config {
        listen_addr: args.listen_addr,
        hostname,
        master_key,
        user_auth_endpoint: args.user_auth_endpoint,
        trusted_issuers: args.trusted_issuers,
        default_access,
        service_prefix_min_components: args.service_prefix_min_components,
        log_level: args.log_level,
        log_dir: args.log_dir,
    };

    let (_, handle) = process::start_service(&config).await;
    handle.wait().await;
}
