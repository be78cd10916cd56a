//! Flowcast Broadcast Hub
//!
//! Axum-based WebSocket relay. Connections are grouped by the workflow
//! identifier in their path and every relayed frame goes to all of them,
//! the sender included: there is no origin exclusion.

pub mod config;
pub mod registry;
pub mod relay;
pub mod shutdown;
pub mod state;
pub mod stats;
pub mod websocket;

use anyhow::Context;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub use config::HubConfig;
pub use registry::{HubStats, Registry};
use state::AppState;

/// Create the hub router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(stats::health))
        .route("/stats", get(stats::get_stats))
        .fallback(websocket::ws_handler)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and run the hub until Ctrl+C or SIGTERM.
pub async fn run_server(config: HubConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind hub to {}", addr))?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown::wait_for_shutdown_signal().await;
        signal_token.cancel();
    });

    serve(listener, config, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` is cancelled.
///
/// Open connections receive a close frame before the listener is dropped.
pub async fn serve(
    listener: TcpListener,
    config: HubConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    let state = AppState::new(config, shutdown.clone());
    let reporter = stats::spawn_reporter(
        state.registry.clone(),
        state.config.stats_interval,
        shutdown.clone(),
    );

    info!("Hub listening on ws://{}/workflow/{{workflowId}}/execution", local_addr);

    let drain_state = state.clone();
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            drain_state.shutdown.cancelled().await;
            let stats = drain_state.registry.stats().await;
            info!(connections = stats.connections, "Shutting down, closing connections");
            if !drain_state
                .registry
                .wait_until_empty(drain_state.config.shutdown_grace)
                .await
            {
                warn!("Some connections did not close within the grace period");
            }
        })
        .await?;

    reporter.await.ok();
    info!("Hub stopped");
    Ok(())
}
