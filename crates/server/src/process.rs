use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::http_server;
use crate::{ServiceConfig, ServiceState};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle for gracefully shutting down the server.
pub struct ShutdownHandle {
    graceful_waiter: tokio::task::JoinHandle<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
    shutdown_tx: watch::Sender<()>,
}

impl ShutdownHandle {
    /// Block until the service shuts down (via signal or explicit shutdown).
    pub async fn wait(self) {
        let _ = self.graceful_waiter.await;
        if timeout(FINAL_SHUTDOWN_TIMEOUT, futures::future::join_all(self.handles))
            .await
            .is_err()
        {
            tracing::error!(
                "Failed to shut down within {} seconds",
                FINAL_SHUTDOWN_TIMEOUT.as_secs()
            );
            std::process::exit(4);
        }
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Initialize logging. Returns guards that must be kept alive for the
/// duration of the program.
pub fn init_logging(
    log_level: tracing::Level,
    log_dir: Option<&std::path::Path>,
    file_name: &str,
) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    let mut guards = Vec::new();

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    if let Some(log_dir) = log_dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("Warning: Failed to create log directory {:?}: {}", log_dir, e);
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, file_name);
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(log_level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stdout_layer).init();
    }

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("panic: {}", info);
    }));

    guards
}

/// Spawn a task that resolves the shutdown channel on SIGINT/SIGTERM.
pub fn graceful_shutdown_blocker() -> (
    tokio::task::JoinHandle<()>,
    watch::Sender<()>,
    watch::Receiver<()>,
) {
    let (tx, rx) = watch::channel(());
    let mut wait_rx = rx.clone();
    let signal_tx = tx.clone();
    let waiter = tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                tracing::info!("shutdown signal received");
                let _ = signal_tx.send(());
            }
            _ = wait_rx.changed() => {}
        }
    });
    (waiter, tx, rx)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install signal handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Create state and spawn the HTTP server, returning the state handle.
pub async fn start_service(config: &ServiceConfig) -> (ServiceState, ShutdownHandle) {
    let (graceful_waiter, shutdown_tx, shutdown_rx) = graceful_shutdown_blocker();

    let state = match ServiceState::from_config(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("error creating server state: {}", e);
            std::process::exit(3);
        }
    };

    let listen_addr = config.listen_addr;
    let log_level = config.log_level;
    let server_state = state.clone();
    let server_rx = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = http_server::run(listen_addr, log_level, server_state, server_rx).await {
            tracing::error!("server error: {}", e);
        }
    });

    let handle = ShutdownHandle {
        graceful_waiter,
        handles: vec![server_handle],
        shutdown_tx,
    };

    (state, handle)
}

/// Spawn the server and block until shutdown. Used by the binary.
pub async fn spawn_service(config: &ServiceConfig) {
    let _guards = init_logging(config.log_level, config.log_dir.as_deref(), "knox-server.log");
    let (_, handle) = start_service(config).await;
    handle.wait().await;
}
