//! Application state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::registry::Registry;

/// Hub state shared across handlers and connection loops.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Arc<HubConfig>,
    /// Cancelled once when the hub begins shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: HubConfig, shutdown: CancellationToken) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            config: Arc::new(config),
            shutdown,
        }
    }
}
