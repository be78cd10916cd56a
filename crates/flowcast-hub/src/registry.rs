//! Workflow connection registry.
//!
//! Maps each workflow identifier to the set of live connections observing
//! it. Every mutation goes through the single lock, so a join racing a
//! broadcast is either fully before or fully after it.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier assigned to each admitted connection.
pub type ConnectionId = Uuid;

/// Outbound queue feeding one connection's socket writer.
pub type Outbox = mpsc::Sender<String>;

/// Frames buffered per connection before new frames are dropped for it.
pub const OUTBOX_CAPACITY: usize = 256;

/// Aggregate counts reported by `/stats` and the periodic reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub workflows: usize,
}

/// Result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
    pub evicted: usize,
}

/// Lock-guarded workflow -> connections map.
#[derive(Default)]
pub struct Registry {
    workflows: Mutex<HashMap<String, HashMap<ConnectionId, Outbox>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a workflow's set.
    pub async fn join(&self, workflow_id: &str, conn_id: ConnectionId, outbox: Outbox) {
        let mut workflows = self.workflows.lock().await;
        workflows
            .entry(workflow_id.to_string())
            .or_default()
            .insert(conn_id, outbox);
        debug!(workflow_id = %workflow_id, conn_id = %conn_id, "Connection joined workflow");
    }

    /// Remove a connection; the workflow entry goes away with its last member.
    pub async fn leave(&self, workflow_id: &str, conn_id: ConnectionId) -> bool {
        let mut workflows = self.workflows.lock().await;
        let Some(members) = workflows.get_mut(workflow_id) else {
            return false;
        };
        let removed = members.remove(&conn_id).is_some();
        if members.is_empty() {
            workflows.remove(workflow_id);
        }
        if removed {
            debug!(workflow_id = %workflow_id, conn_id = %conn_id, "Connection left workflow");
        }
        removed
    }

    /// Queue a frame for every connection of a workflow, sender included.
    ///
    /// Connections whose socket is gone are evicted; a full outbox only
    /// loses this frame. Neither case affects delivery to the others.
    pub async fn broadcast(&self, workflow_id: &str, frame: &str) -> Delivery {
        let mut workflows = self.workflows.lock().await;
        let Some(members) = workflows.get_mut(workflow_id) else {
            return Delivery::default();
        };

        let mut delivery = Delivery::default();
        let mut dead = Vec::new();
        for (conn_id, outbox) in members.iter() {
            if outbox.is_closed() {
                dead.push(*conn_id);
                continue;
            }
            match outbox.try_send(frame.to_string()) {
                Ok(()) => delivery.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(conn_id = %conn_id, "Outbox full, dropping frame for slow connection");
                    delivery.dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*conn_id),
            }
        }

        for conn_id in &dead {
            members.remove(conn_id);
            debug!(workflow_id = %workflow_id, conn_id = %conn_id, "Evicted closed connection");
        }
        delivery.evicted = dead.len();
        if members.is_empty() {
            workflows.remove(workflow_id);
        }
        delivery
    }

    /// Number of connections observing a workflow.
    pub async fn members(&self, workflow_id: &str) -> usize {
        let workflows = self.workflows.lock().await;
        workflows.get(workflow_id).map_or(0, HashMap::len)
    }

    pub async fn stats(&self) -> HubStats {
        let workflows = self.workflows.lock().await;
        HubStats {
            connections: workflows.values().map(HashMap::len).sum(),
            workflows: workflows.len(),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.workflows.lock().await.is_empty()
    }

    /// Wait for every connection to leave, up to `grace`.
    pub async fn wait_until_empty(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if self.is_empty().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
