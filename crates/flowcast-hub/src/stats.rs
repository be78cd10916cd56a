//! Health and statistics endpoints, plus the periodic stats reporter.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::registry::{HubStats, Registry};
use crate::state::AppState;

/// Liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Current connection and workflow counts.
pub async fn get_stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.registry.stats().await)
}

/// Log aggregate counts every `interval` until `shutdown` fires.
pub fn spawn_reporter(
    registry: Arc<Registry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = registry.stats().await;
                    info!(
                        connections = stats.connections,
                        workflows = stats.workflows,
                        "Hub statistics"
                    );
                }
                _ = shutdown.cancelled() => break,
            }
        }
    })
}
