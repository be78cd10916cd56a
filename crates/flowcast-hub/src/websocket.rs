//! WebSocket admission and per-connection loop.

use axum::{
    body::Bytes,
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use flowcast_core::protocol::{parse_workflow_path, Frame};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::registry::OUTBOX_CAPACITY;
use crate::relay::{route_frame, Route};
use crate::state::AppState;

/// Close reason sent to connections on an unrecognized path.
pub const INVALID_PATH_REASON: &str = "Invalid path. Expected /workflow/{workflowId}/execution";

/// Close reason sent to every connection when the hub stops.
pub const SHUTDOWN_REASON: &str = "Server shutting down";

/// WebSocket upgrade handler for every path not claimed by an HTTP route.
pub async fn ws_handler(ws: WebSocketUpgrade, uri: Uri, State(state): State<AppState>) -> Response {
    if state.shutdown.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let path = uri.path().to_string();
    match parse_workflow_path(&path) {
        Ok(workflow_id) => {
            let workflow_id = workflow_id.to_string();
            ws.on_upgrade(move |socket| handle_socket(socket, workflow_id, state))
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Rejecting WebSocket connection");
            ws.on_upgrade(reject_socket)
        }
    }
}

/// Close a connection that asked for an unrecognized path.
async fn reject_socket(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: INVALID_PATH_REASON.to_string().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send policy close frame");
    }
}

/// Serve one admitted connection until it closes, times out or the hub stops.
async fn handle_socket(socket: WebSocket, workflow_id: String, state: AppState) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut inbox) = mpsc::channel::<String>(OUTBOX_CAPACITY);

    state.registry.join(&workflow_id, conn_id, outbox).await;
    info!(workflow_id = %workflow_id, conn_id = %conn_id, "WebSocket client connected");

    let greeting = Frame::established(&workflow_id, Utc::now()).to_json();
    let greeted = match greeting {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode greeting");
            false
        }
    };

    if greeted {
        let heartbeat_every = state.config.heartbeat_interval;
        let heartbeat_timeout = state.config.heartbeat_timeout;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_every, heartbeat_every);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_seen = Instant::now();
                            debug!(conn_id = %conn_id, message = %text.as_str(), "Received frame");
                            match route_frame(text.as_str(), Utc::now()) {
                                Route::Broadcast(json) => {
                                    let delivery = state.registry.broadcast(&workflow_id, &json).await;
                                    debug!(
                                        workflow_id = %workflow_id,
                                        delivered = delivery.delivered,
                                        evicted = delivery.evicted,
                                        "Relayed frame"
                                    );
                                }
                                Route::Reply(json) => {
                                    if sender.send(Message::Text(json.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Route::Drop => {}
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            last_seen = Instant::now();
                            if let Ok(json) = Frame::error("Invalid message format", Utc::now()).to_json() {
                                if sender.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            last_seen = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(conn_id = %conn_id, "WebSocket client sent close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            debug!(conn_id = %conn_id, error = %e, "WebSocket receive failed");
                            break;
                        }
                    }
                }
                queued = inbox.recv() => {
                    let Some(json) = queued else { break };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!(conn_id = %conn_id, "WebSocket send failed, client disconnected");
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() > heartbeat_timeout {
                        info!(conn_id = %conn_id, "Heartbeat timeout, closing");
                        break;
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                _ = state.shutdown.cancelled() => {
                    let frame = CloseFrame {
                        code: close_code::AWAY,
                        reason: SHUTDOWN_REASON.to_string().into(),
                    };
                    if let Err(e) = sender.send(Message::Close(Some(frame))).await {
                        debug!(conn_id = %conn_id, error = %e, "Failed to send shutdown close frame");
                    }
                    break;
                }
            }
        }
    }

    state.registry.leave(&workflow_id, conn_id).await;
    info!(workflow_id = %workflow_id, conn_id = %conn_id, "WebSocket client disconnected");
}
