use std::path::PathBuf;

use clap::Args;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use knox_cli::daemon::{Daemon as KeyCacheDaemon, DEFAULT_REFRESH_INTERVAL};

use crate::cli::op::{ErrorStatus, Op, OpContext};

use super::register::parse_timeout;

/// Run the caching daemon: keep every registered key cached on the
/// local filesystem and refreshed from the server.
#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override the daemon directory (default from --dir)
    #[arg(long)]
    pub daemon_dir: Option<PathBuf>,

    /// Interval between refresh passes (e.g. '600', '10m')
    #[arg(long)]
    pub refresh: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,
}

#[async_trait::async_trait]
impl Op for Daemon {
    type Error = ErrorStatus;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let env_filter = EnvFilter::builder()
            .with_default_directive(self.log_level.into())
            .from_env_lossy();
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().compact().with_filter(env_filter))
            .init();

        let refresh_interval = match &self.refresh {
            Some(text) => parse_timeout(text)?,
            None => DEFAULT_REFRESH_INTERVAL,
        };
        let dir = self
            .daemon_dir
            .clone()
            .unwrap_or_else(|| ctx.daemon_dir.clone());

        let daemon = KeyCacheDaemon::new(dir, refresh_interval, ctx.client.uncached().clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = shutdown_tx.send(());
        });
        daemon.run(shutdown_rx).await;
        Ok("daemon ended".to_string())
    }
}
