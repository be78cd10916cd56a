//! Routing decision for inbound frames.

use chrono::{DateTime, Utc};
use flowcast_core::protocol::{Frame, FrameType, RawFrame};
use tracing::{debug, warn};

/// Where an inbound frame goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Fan out to every connection of the workflow, sender included.
    Broadcast(String),
    /// Answer the sender only.
    Reply(String),
    /// Drop silently.
    Drop,
}

/// Decide what to do with one text frame.
pub fn route_frame(text: &str, now: DateTime<Utc>) -> Route {
    let mut frame = match RawFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "Rejecting malformed frame");
            return reply(Frame::error("Invalid message format", now));
        }
    };

    match frame.frame_type() {
        Some(FrameType::Ping) => reply(Frame::pong(now)),
        Some(kind) if kind.is_relayed() => {
            frame.stamp_if_missing(now);
            Route::Broadcast(frame.to_json())
        }
        _ => {
            warn!(kind = %frame.kind(), "Unrecognized message type, dropping");
            Route::Drop
        }
    }
}

fn reply(frame: Frame) -> Route {
    match frame.to_json() {
        Ok(json) => Route::Reply(json),
        Err(e) => {
            warn!(error = %e, "Failed to encode reply");
            Route::Drop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn json(route: &Route) -> Value {
        match route {
            Route::Broadcast(text) | Route::Reply(text) => serde_json::from_str(text).unwrap(),
            Route::Drop => panic!("dropped"),
        }
    }

    #[test]
    fn test_malformed_frame_gets_error_reply() {
        let route = route_frame("not json at all", Utc::now());
        assert!(matches!(route, Route::Reply(_)));
        let value = json(&route);
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "Invalid message format");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_ping_answered_with_pong() {
        let route = route_frame(r#"{"type":"ping"}"#, Utc::now());
        assert!(matches!(route, Route::Reply(_)));
        assert_eq!(json(&route)["type"], "pong");
    }

    #[test]
    fn test_commands_and_events_are_broadcast_with_timestamp() {
        for kind in ["execution:start", "execution:stop", "node:started", "log:added"] {
            let route = route_frame(&format!(r#"{{"type":"{}","workflowId":"w"}}"#, kind), Utc::now());
            assert!(matches!(route, Route::Broadcast(_)), "{} not broadcast", kind);
            let value = json(&route);
            assert_eq!(value["type"], kind);
            assert_eq!(value["workflowId"], "w");
            assert!(value["timestamp"].is_string());
        }
    }

    #[test]
    fn test_existing_timestamp_kept() {
        let route = route_frame(
            r#"{"type":"node:started","timestamp":"2025-01-01T00:00:00.000Z","payload":{"nodeId":"n"}}"#,
            Utc::now(),
        );
        assert_eq!(json(&route)["timestamp"], "2025-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_unknown_type_dropped() {
        assert_eq!(route_frame(r#"{"type":"node:teleported"}"#, Utc::now()), Route::Drop);
        assert_eq!(route_frame(r#"{"type":"pong"}"#, Utc::now()), Route::Drop);
    }
}
