//! Opaque frame handling for the relay path.
//!
//! The hub never materializes the execution model; it only needs the
//! `type` field and the ability to stamp a timestamp before relaying.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{format_timestamp, FrameType};
use crate::error::{FlowcastError, FlowcastResult};

/// A decoded JSON object with a string `type`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    fields: Map<String, Value>,
}

impl RawFrame {
    /// Decode a text frame. Valid JSON that is not an object, or that has
    /// no string `type`, is treated as malformed.
    pub fn parse(text: &str) -> FlowcastResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(fields) = value else {
            return Err(FlowcastError::NotAnObject);
        };
        if !matches!(fields.get("type"), Some(Value::String(_))) {
            return Err(FlowcastError::MissingType);
        }
        Ok(Self { fields })
    }

    /// The raw `type` value.
    pub fn kind(&self) -> &str {
        self.fields
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// The recognized frame type, if any.
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::parse(self.kind())
    }

    /// Whether the frame already carries a timestamp.
    pub fn has_timestamp(&self) -> bool {
        self.fields
            .get("timestamp")
            .is_some_and(|ts| !ts.is_null())
    }

    /// Inject a server timestamp if the sender omitted one.
    pub fn stamp_if_missing(&mut self, now: DateTime<Utc>) {
        if !self.has_timestamp() {
            self.fields
                .insert("timestamp".to_string(), Value::String(format_timestamp(now)));
        }
    }

    /// Read a top-level string field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Encode back into a text frame.
    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(matches!(
            RawFrame::parse("{not json"),
            Err(FlowcastError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_objects_and_missing_type() {
        assert!(matches!(RawFrame::parse("[1,2]"), Err(FlowcastError::NotAnObject)));
        assert!(matches!(
            RawFrame::parse(r#"{"payload":{}}"#),
            Err(FlowcastError::MissingType)
        ));
        assert!(matches!(
            RawFrame::parse(r#"{"type":7}"#),
            Err(FlowcastError::MissingType)
        ));
    }

    #[test]
    fn test_stamp_only_when_missing() {
        let mut frame = RawFrame::parse(r#"{"type":"node:started","payload":{"nodeId":"a"}}"#).unwrap();
        assert!(!frame.has_timestamp());
        frame.stamp_if_missing(Utc::now());
        assert!(frame.has_timestamp());

        let original = r#"{"type":"node:started","timestamp":"2020-01-01T00:00:00Z"}"#;
        let mut stamped = RawFrame::parse(original).unwrap();
        stamped.stamp_if_missing(Utc::now());
        assert_eq!(stamped.str_field("timestamp"), Some("2020-01-01T00:00:00Z"));
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let frame = RawFrame::parse(r#"{"type":"custom:thing"}"#).unwrap();
        assert_eq!(frame.kind(), "custom:thing");
        assert_eq!(frame.frame_type(), None);
    }

    #[test]
    fn test_relay_keeps_extra_fields() {
        let frame = RawFrame::parse(r#"{"type":"log:added","payload":{"nodeId":"n","message":"hi"},"extra":true}"#).unwrap();
        let value: Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(value["extra"], true);
        assert_eq!(value["payload"]["message"], "hi");
    }
}
