//! Wire schema exchanged between observers and the hub.
//!
//! Frames are UTF-8 JSON text frames tagged by a `type` field. The hub only
//! ever looks at `type` (see [`RawFrame`]); observers decode the full
//! [`Frame`] enum.

pub mod path;
pub mod raw;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::FlowcastResult;
use crate::execution::model::ExecutionLogEntry;

pub use path::{parse_workflow_path, workflow_path};
pub use raw::RawFrame;

/// Greeting carried by `connection:established`.
pub const ESTABLISHED_MESSAGE: &str = "Connected to workflow execution stream";

/// Every `type` value the protocol knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    ConnectionEstablished,
    Pong,
    Error,
    Ping,
    ExecutionStart,
    ExecutionStop,
    ExecutionPause,
    ExecutionResume,
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionFailed,
    ExecutionPaused,
    NodeStarted,
    NodeCompleted,
    NodeFailed,
    NodeWaiting,
    EdgeActivated,
    LogAdded,
}

impl FrameType {
    /// Parse a wire `type` value. Returns `None` for unrecognized types.
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "connection:established" => Self::ConnectionEstablished,
            "pong" => Self::Pong,
            "error" => Self::Error,
            "ping" => Self::Ping,
            "execution:start" => Self::ExecutionStart,
            "execution:stop" => Self::ExecutionStop,
            "execution:pause" => Self::ExecutionPause,
            "execution:resume" => Self::ExecutionResume,
            "execution:started" => Self::ExecutionStarted,
            "execution:completed" => Self::ExecutionCompleted,
            "execution:failed" => Self::ExecutionFailed,
            "execution:paused" => Self::ExecutionPaused,
            "node:started" => Self::NodeStarted,
            "node:completed" => Self::NodeCompleted,
            "node:failed" => Self::NodeFailed,
            "node:waiting" => Self::NodeWaiting,
            "edge:activated" => Self::EdgeActivated,
            "log:added" => Self::LogAdded,
            _ => return None,
        };
        Some(kind)
    }

    /// Convert to the wire `type` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished => "connection:established",
            Self::Pong => "pong",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::ExecutionStart => "execution:start",
            Self::ExecutionStop => "execution:stop",
            Self::ExecutionPause => "execution:pause",
            Self::ExecutionResume => "execution:resume",
            Self::ExecutionStarted => "execution:started",
            Self::ExecutionCompleted => "execution:completed",
            Self::ExecutionFailed => "execution:failed",
            Self::ExecutionPaused => "execution:paused",
            Self::NodeStarted => "node:started",
            Self::NodeCompleted => "node:completed",
            Self::NodeFailed => "node:failed",
            Self::NodeWaiting => "node:waiting",
            Self::EdgeActivated => "edge:activated",
            Self::LogAdded => "log:added",
        }
    }

    /// Control commands an observer may issue.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            Self::ExecutionStart | Self::ExecutionStop | Self::ExecutionPause | Self::ExecutionResume
        )
    }

    /// Execution and telemetry events emitted by the interpreter.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Self::ExecutionStarted
                | Self::ExecutionCompleted
                | Self::ExecutionFailed
                | Self::ExecutionPaused
                | Self::NodeStarted
                | Self::NodeCompleted
                | Self::NodeFailed
                | Self::NodeWaiting
                | Self::EdgeActivated
                | Self::LogAdded
        )
    }

    /// Whether the hub fans this type out to every observer of the workflow.
    pub fn is_relayed(&self) -> bool {
        self.is_command() || self.is_event()
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `payload` of `node:started` and `node:waiting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    pub node_id: String,
}

/// `payload` of `node:completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCompletion {
    pub node_id: String,
    #[serde(default)]
    pub output: Option<Value>,
}

/// `payload` of `node:failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFailure {
    pub node_id: String,
    #[serde(default)]
    pub error: Option<Value>,
}

/// `payload` of `edge:activated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRef {
    pub edge_id: String,
}

/// A decoded protocol frame.
///
/// Unknown `type` values decode to [`Frame::Unknown`] so newer interpreters
/// can emit event kinds this build does not understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "connection:established", rename_all = "camelCase")]
    ConnectionEstablished {
        workflow_id: String,
        #[serde(default)]
        message: Option<String>,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "pong")]
    Pong {
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "ping")]
    Ping {
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "execution:start", rename_all = "camelCase")]
    ExecutionStart {
        workflow_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "execution:stop", rename_all = "camelCase")]
    ExecutionStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workflow_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_id: Option<String>,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "execution:pause", rename_all = "camelCase")]
    ExecutionPause {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workflow_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_id: Option<String>,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "execution:resume", rename_all = "camelCase")]
    ExecutionResume {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workflow_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_id: Option<String>,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "execution:started", rename_all = "camelCase")]
    ExecutionStarted {
        execution_id: String,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "execution:completed", rename_all = "camelCase")]
    ExecutionCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_id: Option<String>,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "execution:failed", rename_all = "camelCase")]
    ExecutionFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "execution:paused", rename_all = "camelCase")]
    ExecutionPaused {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_id: Option<String>,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "node:started")]
    NodeStarted {
        payload: NodeRef,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "node:completed")]
    NodeCompleted {
        payload: NodeCompletion,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "node:failed")]
    NodeFailed {
        payload: NodeFailure,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "node:waiting")]
    NodeWaiting {
        payload: NodeRef,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "edge:activated")]
    EdgeActivated {
        payload: EdgeRef,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "log:added")]
    LogAdded {
        payload: ExecutionLogEntry,
        #[serde(
            default,
            deserialize_with = "lenient_timestamp",
            skip_serializing_if = "Option::is_none"
        )]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(other)]
    Unknown,
}

impl Frame {
    /// Decode a text frame.
    pub fn from_json(text: &str) -> FlowcastResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a text frame.
    pub fn to_json(&self) -> FlowcastResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The `type` of this frame, `None` for [`Frame::Unknown`].
    pub fn frame_type(&self) -> Option<FrameType> {
        let kind = match self {
            Self::ConnectionEstablished { .. } => FrameType::ConnectionEstablished,
            Self::Pong { .. } => FrameType::Pong,
            Self::Error { .. } => FrameType::Error,
            Self::Ping { .. } => FrameType::Ping,
            Self::ExecutionStart { .. } => FrameType::ExecutionStart,
            Self::ExecutionStop { .. } => FrameType::ExecutionStop,
            Self::ExecutionPause { .. } => FrameType::ExecutionPause,
            Self::ExecutionResume { .. } => FrameType::ExecutionResume,
            Self::ExecutionStarted { .. } => FrameType::ExecutionStarted,
            Self::ExecutionCompleted { .. } => FrameType::ExecutionCompleted,
            Self::ExecutionFailed { .. } => FrameType::ExecutionFailed,
            Self::ExecutionPaused { .. } => FrameType::ExecutionPaused,
            Self::NodeStarted { .. } => FrameType::NodeStarted,
            Self::NodeCompleted { .. } => FrameType::NodeCompleted,
            Self::NodeFailed { .. } => FrameType::NodeFailed,
            Self::NodeWaiting { .. } => FrameType::NodeWaiting,
            Self::EdgeActivated { .. } => FrameType::EdgeActivated,
            Self::LogAdded { .. } => FrameType::LogAdded,
            Self::Unknown => return None,
        };
        Some(kind)
    }

    /// Timestamp carried by the frame, if any.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::ConnectionEstablished { timestamp, .. }
            | Self::Pong { timestamp }
            | Self::Error { timestamp, .. }
            | Self::Ping { timestamp }
            | Self::ExecutionStart { timestamp, .. }
            | Self::ExecutionStop { timestamp, .. }
            | Self::ExecutionPause { timestamp, .. }
            | Self::ExecutionResume { timestamp, .. }
            | Self::ExecutionStarted { timestamp, .. }
            | Self::ExecutionCompleted { timestamp, .. }
            | Self::ExecutionFailed { timestamp, .. }
            | Self::ExecutionPaused { timestamp, .. }
            | Self::NodeStarted { timestamp, .. }
            | Self::NodeCompleted { timestamp, .. }
            | Self::NodeFailed { timestamp, .. }
            | Self::NodeWaiting { timestamp, .. }
            | Self::EdgeActivated { timestamp, .. }
            | Self::LogAdded { timestamp, .. } => *timestamp,
            Self::Unknown => None,
        }
    }

    /// Greeting sent by the hub right after a connection is admitted.
    pub fn established(workflow_id: &str, now: DateTime<Utc>) -> Self {
        Self::ConnectionEstablished {
            workflow_id: workflow_id.to_string(),
            message: Some(ESTABLISHED_MESSAGE.to_string()),
            timestamp: Some(now),
        }
    }

    pub fn pong(now: DateTime<Utc>) -> Self {
        Self::Pong { timestamp: Some(now) }
    }

    pub fn error(message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Some(now),
        }
    }

    /// Application-level keepalive sent by an observer.
    pub fn ping() -> Self {
        Self::Ping { timestamp: None }
    }

    /// `execution:start` command. The hub stamps the timestamp on relay.
    pub fn start(workflow_id: &str, input: Option<Value>) -> Self {
        Self::ExecutionStart {
            workflow_id: workflow_id.to_string(),
            input,
            timestamp: None,
        }
    }

    pub fn stop(workflow_id: &str, execution_id: Option<&str>) -> Self {
        Self::ExecutionStop {
            workflow_id: Some(workflow_id.to_string()),
            execution_id: execution_id.map(str::to_string),
            timestamp: None,
        }
    }

    pub fn pause(workflow_id: &str, execution_id: Option<&str>) -> Self {
        Self::ExecutionPause {
            workflow_id: Some(workflow_id.to_string()),
            execution_id: execution_id.map(str::to_string),
            timestamp: None,
        }
    }

    pub fn resume(workflow_id: &str, execution_id: Option<&str>) -> Self {
        Self::ExecutionResume {
            workflow_id: Some(workflow_id.to_string()),
            execution_id: execution_id.map(str::to_string),
            timestamp: None,
        }
    }
}

/// Decode an optional timestamp, accepting RFC 3339, ISO-8601 without an
/// offset (read as UTC) and epoch milliseconds. Anything else decodes to
/// `None` so the frame itself is kept.
pub fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|ts| ts.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").map(|ts| ts.and_utc())
            })
            .ok(),
        Value::Number(millis) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Format a timestamp the way server frames carry it.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_type_round_trips_wire_names() {
        for name in ["execution:start", "node:failed", "edge:activated", "ping", "log:added"] {
            let kind = FrameType::parse(name).unwrap();
            assert_eq!(kind.as_str(), name);
        }
        assert_eq!(FrameType::parse("node:exploded"), None);
    }

    #[test]
    fn test_relay_classification() {
        assert!(FrameType::ExecutionStart.is_relayed());
        assert!(FrameType::LogAdded.is_relayed());
        assert!(!FrameType::Ping.is_relayed());
        assert!(!FrameType::Pong.is_relayed());
        assert!(!FrameType::ConnectionEstablished.is_relayed());
        assert!(FrameType::ExecutionPause.is_command());
        assert!(!FrameType::ExecutionPaused.is_command());
    }

    #[test]
    fn test_decode_node_completed() {
        let text = r#"{"type":"node:completed","timestamp":"2026-03-01T10:00:00.000Z","payload":{"nodeId":"n1","output":{"rows":3}}}"#;
        let frame = Frame::from_json(text).unwrap();
        match frame {
            Frame::NodeCompleted { payload, timestamp } => {
                assert_eq!(payload.node_id, "n1");
                assert_eq!(payload.output, Some(json!({"rows": 3})));
                assert!(timestamp.is_some());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_offsetless_timestamp_read_as_utc() {
        let text = r#"{"type":"node:started","timestamp":"2026-03-01T10:00:00.000","payload":{"nodeId":"n1"}}"#;
        let frame = Frame::from_json(text).unwrap();
        let expected = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z").unwrap();
        assert_eq!(frame.timestamp(), Some(expected.with_timezone(&Utc)));
    }

    #[test]
    fn test_epoch_millis_timestamp_accepted() {
        let text = r#"{"type":"edge:activated","timestamp":1772359200000,"payload":{"edgeId":"e1"}}"#;
        let frame = Frame::from_json(text).unwrap();
        assert_eq!(frame.timestamp(), DateTime::from_timestamp_millis(1_772_359_200_000));
    }

    #[test]
    fn test_unreadable_timestamp_keeps_frame() {
        let text = r#"{"type":"node:failed","timestamp":"yesterday","payload":{"nodeId":"n1","error":"boom"}}"#;
        match Frame::from_json(text).unwrap() {
            Frame::NodeFailed { payload, timestamp } => {
                assert_eq!(payload.node_id, "n1");
                assert_eq!(timestamp, None);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        let null = r#"{"type":"execution:paused","timestamp":null}"#;
        assert_eq!(Frame::from_json(null).unwrap().timestamp(), None);
    }

    #[test]
    fn test_unknown_type_decodes_to_unknown() {
        let frame = Frame::from_json(r#"{"type":"node:retrying","payload":{"nodeId":"n1"}}"#).unwrap();
        assert_eq!(frame, Frame::Unknown);
        assert_eq!(frame.frame_type(), None);
    }

    #[test]
    fn test_start_command_uses_camel_case() {
        let text = Frame::start("wf-1", Some(json!({"x": 1}))).to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "execution:start");
        assert_eq!(value["workflowId"], "wf-1");
        assert_eq!(value["input"]["x"], 1);
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn test_stop_command_carries_execution_id() {
        let text = Frame::stop("wf-1", Some("exec-9")).to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "execution:stop");
        assert_eq!(value["executionId"], "exec-9");
    }

    #[test]
    fn test_established_frame_shape() {
        let now = Utc::now();
        let text = Frame::established("wf-7", now).to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "connection:established");
        assert_eq!(value["workflowId"], "wf-7");
        assert_eq!(value["message"], ESTABLISHED_MESSAGE);
        assert!(value["timestamp"].is_string());
    }
}
