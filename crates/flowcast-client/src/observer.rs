//! Observer facade: a connection manager plus the execution tracker,
//! publishing snapshots over a watch channel.

use std::time::Duration;

use flowcast_core::WorkflowExecutionState;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::manager::{ClientEvent, ConnectionManager, ConnectionState};
use crate::tracker::ExecutionTracker;

pub type Snapshot = Option<WorkflowExecutionState>;

/// Live view of one workflow's executions.
pub struct Observer {
    manager: ConnectionManager,
    snapshot: watch::Receiver<Snapshot>,
    unavailable: watch::Receiver<bool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Observer {
    /// Connect to the hub and start tracking `workflow_id`.
    pub fn connect(config: &ClientConfig, workflow_id: &str) -> ClientResult<Self> {
        let (manager, events) = ConnectionManager::connect(config, workflow_id)?;
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (unavailable_tx, unavailable_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(track(
            workflow_id.to_string(),
            events,
            ExecutionTracker::new(config.edge_pulse),
            snapshot_tx,
            unavailable_tx,
            cancel.clone(),
        ));

        Ok(Self {
            manager,
            snapshot: snapshot_rx,
            unavailable: unavailable_rx,
            cancel,
            task,
        })
    }

    pub fn workflow_id(&self) -> &str {
        self.manager.workflow_id()
    }

    /// Latest execution snapshot, `None` until the first state-changing event.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe_state()
    }

    /// True after the retry budget ran out, until the next successful open.
    pub fn live_view_unavailable(&self) -> bool {
        *self.unavailable.borrow()
    }

    pub fn subscribe_unavailable(&self) -> watch::Receiver<bool> {
        self.unavailable.clone()
    }

    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        self.manager.wait_connected(timeout).await
    }

    pub fn reconnect(&self) {
        self.manager.reconnect();
    }

    pub fn start_execution(&self, input: Option<Value>) -> bool {
        self.manager.start_execution(input)
    }

    pub fn stop_execution(&self, execution_id: Option<&str>) -> bool {
        self.manager.stop_execution(execution_id)
    }

    pub fn pause_execution(&self, execution_id: Option<&str>) -> bool {
        self.manager.pause_execution(execution_id)
    }

    pub fn resume_execution(&self, execution_id: Option<&str>) -> bool {
        self.manager.resume_execution(execution_id)
    }

    /// Drop pending edge timers, then close the hub connection.
    pub async fn dispose(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            debug!(error = %e, "Tracker task ended abnormally");
        }
        self.manager.dispose().await;
    }
}

async fn track(
    workflow_id: String,
    mut events: mpsc::UnboundedReceiver<ClientEvent>,
    mut tracker: ExecutionTracker,
    snapshot: watch::Sender<Snapshot>,
    unavailable: watch::Sender<bool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(ClientEvent::Frame(frame)) => {
                        if tracker.apply(&frame) {
                            snapshot.send_replace(tracker.state().cloned());
                        }
                    }
                    Some(ClientEvent::Connected) => {
                        unavailable.send_if_modified(|flag| std::mem::replace(flag, false));
                    }
                    Some(ClientEvent::LiveViewUnavailable) => {
                        unavailable.send_if_modified(|flag| !std::mem::replace(flag, true));
                    }
                    Some(ClientEvent::Reconnecting { attempt, delay }) => {
                        debug!(workflow_id = %workflow_id, attempt, ?delay, "Observer reconnecting");
                    }
                    Some(ClientEvent::Closed) | None => break,
                }
            }
            Some(pulse) = tracker.next_expired(), if tracker.has_pending() => {
                if tracker.settle(&pulse) {
                    snapshot.send_replace(tracker.state().cloned());
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    tracker.clear_pending();
    info!(workflow_id = %workflow_id, "Observer stopped");
}
