//! Connection manager: one hub connection per observed workflow.
//!
//! The connection is driven by a background task that reconnects with
//! bounded backoff. Losing the hub only loses the live view; it is reported
//! once as [`ClientEvent::LiveViewUnavailable`] and never as an error.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowcast_core::protocol::Frame;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{Reconnect, ReconnectState};
use crate::config::ClientConfig;
use crate::error::ClientResult;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>;

/// Transport state as seen by the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Notifications produced by the manager's background task.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Frame(Frame),
    Reconnecting { attempt: u32, delay: Duration },
    /// Retry budget exhausted. Emitted at most once until the next open.
    LiveViewUnavailable,
    /// The manager was disposed.
    Closed,
}

/// Owns the hub connection for one workflow.
pub struct ConnectionManager {
    workflow_id: String,
    outbound: OutboundSlot,
    state: watch::Receiver<ConnectionState>,
    retry: Arc<Notify>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Start connecting to the hub for `workflow_id`.
    pub fn connect(
        config: &ClientConfig,
        workflow_id: &str,
    ) -> ClientResult<(Self, mpsc::UnboundedReceiver<ClientEvent>)> {
        let url = config.endpoint(workflow_id)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let outbound: OutboundSlot = Arc::new(Mutex::new(None));
        let retry = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let driver = Driver {
            url,
            workflow_id: workflow_id.to_string(),
            reconnect: ReconnectState::new(config.reconnect_policy()),
            state: state_tx,
            events: events_tx,
            outbound: outbound.clone(),
            retry: retry.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(driver.run());

        let manager = Self {
            workflow_id: workflow_id.to_string(),
            outbound,
            state: state_rx,
            retry,
            cancel,
            task: Some(task),
        };
        Ok((manager, events_rx))
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until connected, up to `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut state = self.state.clone();
        let connected = state.wait_for(|s| *s == ConnectionState::Connected);
        let result = tokio::time::timeout(timeout, connected).await;
        matches!(result, Ok(Ok(_)))
    }

    /// Ask a manager that gave up to try once more. The budget is not
    /// refilled, so another failure stays silent.
    pub fn reconnect(&self) {
        self.retry.notify_one();
    }

    pub fn start_execution(&self, input: Option<Value>) -> bool {
        self.send_frame(&Frame::start(&self.workflow_id, input))
    }

    pub fn stop_execution(&self, execution_id: Option<&str>) -> bool {
        self.send_frame(&Frame::stop(&self.workflow_id, execution_id))
    }

    pub fn pause_execution(&self, execution_id: Option<&str>) -> bool {
        self.send_frame(&Frame::pause(&self.workflow_id, execution_id))
    }

    pub fn resume_execution(&self, execution_id: Option<&str>) -> bool {
        self.send_frame(&Frame::resume(&self.workflow_id, execution_id))
    }

    /// Application-level ping; the hub answers with `pong`.
    pub fn ping(&self) -> bool {
        self.send_frame(&Frame::ping())
    }

    /// Send a frame if connected. Frames are never queued for later.
    pub fn send_frame(&self, frame: &Frame) -> bool {
        let json = match frame.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to encode frame");
                return false;
            }
        };

        let slot = match self.outbound.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.as_ref() {
            Some(tx) if self.is_connected() => tx.send(Message::Text(json.into())).is_ok(),
            _ => {
                debug!(
                    workflow_id = %self.workflow_id,
                    frame_type = ?frame.frame_type(),
                    "Not connected, dropping frame"
                );
                false
            }
        }
    }

    /// Cancel pending reconnects and close the connection normally.
    pub async fn dispose(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Connection task ended abnormally");
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum SessionEnd {
    Dropped,
    Disposed,
}

struct Driver {
    url: String,
    workflow_id: String,
    reconnect: ReconnectState,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<ClientEvent>,
    outbound: OutboundSlot,
    retry: Arc<Notify>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        loop {
            self.state.send_replace(ConnectionState::Connecting);
            let opened = tokio::select! {
                opened = open(&self.url) => opened,
                _ = self.cancel.cancelled() => break,
            };

            match opened {
                Ok(ws) => {
                    self.reconnect.on_open();
                    info!(workflow_id = %self.workflow_id, url = %self.url, "Connected to hub");
                    let end = self.run_session(ws).await;
                    self.set_outbound(None);
                    if let SessionEnd::Disposed = end {
                        break;
                    }
                    info!(workflow_id = %self.workflow_id, "Connection to hub lost");
                }
                Err(e) => {
                    debug!(workflow_id = %self.workflow_id, error = %e, "Failed to connect to hub");
                }
            }

            self.state.send_replace(ConnectionState::Disconnected);
            match self.reconnect.on_close() {
                Reconnect::After { attempt, delay } => {
                    info!(
                        workflow_id = %self.workflow_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling reconnect"
                    );
                    self.emit(ClientEvent::Reconnecting { attempt, delay });
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => break,
                    }
                }
                Reconnect::GiveUp { notify } => {
                    if notify {
                        info!(
                            workflow_id = %self.workflow_id,
                            "Live visualization unavailable; the workflow keeps running"
                        );
                        self.emit(ClientEvent::LiveViewUnavailable);
                    }
                    tokio::select! {
                        _ = self.retry.notified() => {}
                        _ = self.cancel.cancelled() => break,
                    }
                }
            }
        }

        self.reconnect.reset();
        self.set_outbound(None);
        self.state.send_replace(ConnectionState::Disconnected);
        self.emit(ClientEvent::Closed);
        debug!(workflow_id = %self.workflow_id, "Connection manager disposed");
    }

    async fn run_session(&self, ws: WsStream) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.set_outbound(Some(tx));
        self.state.send_replace(ConnectionState::Connected);
        self.emit(ClientEvent::Connected);

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => match Frame::from_json(text.as_str()) {
                            Ok(frame) => self.emit(ClientEvent::Frame(frame)),
                            Err(e) => debug!(error = %e, "Ignoring undecodable frame"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Hub closed the connection");
                            return SessionEnd::Dropped;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(error = %e, "WebSocket receive failed");
                            return SessionEnd::Dropped;
                        }
                        None => return SessionEnd::Dropped,
                    }
                }
                Some(out) = rx.recv() => {
                    if let Err(e) = sink.send(out).await {
                        debug!(error = %e, "WebSocket send failed");
                        return SessionEnd::Dropped;
                    }
                }
                _ = self.cancel.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "Observer disposed".to_string().into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Failed to send close frame");
                    }
                    return SessionEnd::Disposed;
                }
            }
        }
    }

    fn set_outbound(&self, tx: Option<mpsc::UnboundedSender<Message>>) {
        let mut slot = match self.outbound.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = tx;
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

async fn open(url: &str) -> ClientResult<WsStream> {
    let (ws, _response) = connect_async(url).await?;
    Ok(ws)
}
