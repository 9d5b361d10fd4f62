use std::net::SocketAddr;

use axum::middleware;
use axum::Router;
use tokio::sync::watch;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;

pub mod api;
pub mod decorators;
pub mod envelope;

use crate::ServiceState;

/// The full application router: the /v0 API behind the authentication
/// decorator, with the knox 404 envelope for everything unrouted.
pub fn app(state: ServiceState) -> Router {
    envelope::set_host(state.hostname());
    Router::new()
        .nest("/v0", api::v0::router(state.clone()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            decorators::authentication,
        ))
        .fallback(envelope::not_found_handler)
        .with_state(state)
}

/// Run the key server until shutdown is signalled.
pub async fn run(
    listen_addr: SocketAddr,
    log_level: tracing::Level,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    let router = app(state).layer(trace_layer);

    tracing::info!(addr = ?listen_addr, "knox server listening");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
