//! Execution state reducer.
//!
//! Folds the unordered, at-most-once event stream into a
//! [`WorkflowExecutionState`]. The fold is pure apart from one side
//! channel: `edge:activated` yields an [`EdgePulse`] that the caller must
//! settle after [`EDGE_PULSE`] has elapsed.

pub mod model;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::protocol::Frame;
use model::{
    EdgeExecutionState, ExecutionStatus, NodeExecutionState, NodeStatus, WorkflowExecutionState,
};

/// How long an edge stays lit after an activation.
pub const EDGE_PULSE: Duration = Duration::from_millis(1000);

/// A deferred deactivation of one edge activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgePulse {
    pub edge_id: String,
    pub generation: u64,
}

/// What applying a frame did to the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The frame had no effect.
    Ignored,
    /// The state changed.
    Applied,
    /// The state changed and an edge deactivation must be scheduled.
    Pulse(EdgePulse),
}

impl Outcome {
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// Result of [`reduce`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub state: Option<WorkflowExecutionState>,
    pub pulse: Option<EdgePulse>,
    pub changed: bool,
}

/// Produce the next state from the current one (or none) and one frame.
///
/// `now` stands in for frames that carry no timestamp. Frames that would not
/// change an absent state leave it absent.
pub fn reduce(
    state: Option<WorkflowExecutionState>,
    frame: &Frame,
    now: DateTime<Utc>,
) -> Reduction {
    let existed = state.is_some();
    let mut next = state.unwrap_or_default();
    let outcome = next.apply(frame, now);
    let changed = outcome.changed();

    let state = if existed || changed {
        Some(next)
    } else {
        None
    };
    let pulse = match outcome {
        Outcome::Pulse(pulse) => Some(pulse),
        _ => None,
    };
    Reduction {
        state,
        pulse,
        changed,
    }
}

impl WorkflowExecutionState {
    /// Apply one frame in place.
    pub fn apply(&mut self, frame: &Frame, now: DateTime<Utc>) -> Outcome {
        let at = frame.timestamp().unwrap_or(now);

        match frame {
            Frame::ExecutionStarted { execution_id, .. } => {
                self.execution_id = execution_id.clone();
                self.status = ExecutionStatus::Running;
                self.current_node_id = None;
                self.started_at = Some(at);
                self.completed_at = None;
                self.node_states.clear();
                self.edge_states.clear();
                self.logs.clear();
                Outcome::Applied
            }
            Frame::ExecutionCompleted { .. } => {
                self.status = ExecutionStatus::Completed;
                self.completed_at = Some(at);
                Outcome::Applied
            }
            Frame::ExecutionFailed { .. } => {
                self.status = ExecutionStatus::Failed;
                self.completed_at = Some(at);
                Outcome::Applied
            }
            Frame::ExecutionPaused { .. } => {
                self.status = ExecutionStatus::Paused;
                Outcome::Applied
            }
            Frame::NodeStarted { payload, .. } => {
                self.node_states.insert(
                    payload.node_id.clone(),
                    NodeExecutionState {
                        node_id: payload.node_id.clone(),
                        status: NodeStatus::Running,
                        started_at: at,
                        completed_at: None,
                        output: None,
                        error: None,
                    },
                );
                self.current_node_id = Some(payload.node_id.clone());
                Outcome::Applied
            }
            Frame::NodeCompleted { payload, .. } => {
                // Completions for nodes whose start was missed are dropped.
                let Some(node) = self.node_states.get_mut(&payload.node_id) else {
                    debug!(node_id = %payload.node_id, "node:completed for unknown node ignored");
                    return Outcome::Ignored;
                };
                node.status = NodeStatus::Success;
                node.completed_at = Some(at);
                node.output = payload.output.clone();
                Outcome::Applied
            }
            Frame::NodeFailed { payload, .. } => {
                let node = self
                    .node_states
                    .entry(payload.node_id.clone())
                    .or_insert_with(|| NodeExecutionState {
                        node_id: payload.node_id.clone(),
                        status: NodeStatus::Error,
                        started_at: at,
                        completed_at: None,
                        output: None,
                        error: None,
                    });
                node.status = NodeStatus::Error;
                node.completed_at = Some(at);
                node.error = payload.error.clone();
                Outcome::Applied
            }
            Frame::NodeWaiting { payload, .. } => match self.node_states.get_mut(&payload.node_id) {
                Some(node) => {
                    node.status = NodeStatus::Waiting;
                    Outcome::Applied
                }
                None => Outcome::Ignored,
            },
            Frame::EdgeActivated { payload, .. } => {
                self.pulse_seq += 1;
                let generation = self.pulse_seq;
                self.edge_states.insert(
                    payload.edge_id.clone(),
                    EdgeExecutionState {
                        edge_id: payload.edge_id.clone(),
                        is_active: true,
                        activated_at: at,
                        generation,
                    },
                );
                Outcome::Pulse(EdgePulse {
                    edge_id: payload.edge_id.clone(),
                    generation,
                })
            }
            Frame::LogAdded { payload, .. } => {
                self.logs.push(payload.clone());
                Outcome::Applied
            }
            _ => Outcome::Ignored,
        }
    }

    /// Settle a pulse: clear the edge only if no newer activation replaced it.
    pub fn settle_pulse(&mut self, pulse: &EdgePulse) -> bool {
        match self.edge_states.get_mut(&pulse.edge_id) {
            Some(edge) if edge.generation == pulse.generation && edge.is_active => {
                edge.is_active = false;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EdgeRef, NodeCompletion, NodeFailure, NodeRef};
    use serde_json::json;

    fn started(id: &str) -> Frame {
        Frame::ExecutionStarted {
            execution_id: id.to_string(),
            timestamp: None,
        }
    }

    fn node_started(id: &str) -> Frame {
        Frame::NodeStarted {
            payload: NodeRef { node_id: id.to_string() },
            timestamp: None,
        }
    }

    fn node_completed(id: &str) -> Frame {
        Frame::NodeCompleted {
            payload: NodeCompletion {
                node_id: id.to_string(),
                output: Some(json!({"ok": true})),
            },
            timestamp: None,
        }
    }

    fn node_failed(id: &str) -> Frame {
        Frame::NodeFailed {
            payload: NodeFailure {
                node_id: id.to_string(),
                error: Some(json!("boom")),
            },
            timestamp: None,
        }
    }

    fn edge(id: &str) -> Frame {
        Frame::EdgeActivated {
            payload: EdgeRef { edge_id: id.to_string() },
            timestamp: None,
        }
    }

    fn fold(frames: &[Frame]) -> Option<WorkflowExecutionState> {
        let now = Utc::now();
        frames
            .iter()
            .fold(None, |state, frame| reduce(state, frame, now).state)
    }

    #[test]
    fn test_started_resets_run() {
        let state = fold(&[started("e1"), node_started("a"), edge("x"), started("e2")]).unwrap();
        assert_eq!(state.execution_id, "e2");
        assert_eq!(state.status, ExecutionStatus::Running);
        assert!(state.node_states.is_empty());
        assert!(state.edge_states.is_empty());
        assert!(state.logs.is_empty());
        assert!(state.started_at.is_some());
    }

    #[test]
    fn test_node_states_track_started_and_failed_after_last_start() {
        let state = fold(&[
            started("e1"),
            node_started("old"),
            started("e2"),
            node_started("a"),
            node_completed("a"),
            node_failed("b"),
            node_completed("ghost"),
            Frame::ExecutionCompleted {
                execution_id: None,
                timestamp: None,
            },
        ])
        .unwrap();

        let mut nodes: Vec<&str> = state.node_states.keys().map(String::as_str).collect();
        nodes.sort_unstable();
        assert_eq!(nodes, vec!["a", "b"]);
        assert_eq!(state.status, ExecutionStatus::Completed);
        assert!(state.completed_at.is_some());
        assert_eq!(state.node("a").unwrap().status, NodeStatus::Success);
        assert_eq!(state.node("a").unwrap().output, Some(json!({"ok": true})));
    }

    #[test]
    fn test_completed_without_start_is_noop() {
        let before = fold(&[started("e1"), node_started("a")]).unwrap();
        let after = reduce(Some(before.clone()), &node_completed("missing"), Utc::now());
        assert_eq!(after.state, Some(before));
        assert_eq!(after.pulse, None);
        assert!(!after.changed);
    }

    #[test]
    fn test_completed_on_empty_state_stays_empty() {
        let after = reduce(None, &node_completed("missing"), Utc::now());
        assert_eq!(after.state, None);
    }

    #[test]
    fn test_failed_without_start_creates_entry() {
        let state = fold(&[started("e1"), node_failed("b")]).unwrap();
        assert_eq!(state.node_states.len(), 1);
        let node = state.node("b").unwrap();
        assert_eq!(node.status, NodeStatus::Error);
        assert_eq!(node.error, Some(json!("boom")));
        assert_eq!(Some(node.started_at), node.completed_at);
    }

    #[test]
    fn test_node_started_overwrites_previous_outcome() {
        let state = fold(&[started("e1"), node_failed("a"), node_started("a")]).unwrap();
        let node = state.node("a").unwrap();
        assert_eq!(node.status, NodeStatus::Running);
        assert_eq!(node.error, None);
        assert_eq!(node.completed_at, None);
        assert_eq!(state.current_node_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_wire_timestamps_without_offset_still_apply() {
        let now = Utc::now();
        let frames = [
            r#"{"type":"execution:started","executionId":"e1","timestamp":"2026-03-01T10:00:00.000"}"#,
            r#"{"type":"node:started","timestamp":"2026-03-01T10:00:01.500","payload":{"nodeId":"a"}}"#,
            r#"{"type":"node:failed","timestamp":"not a time","payload":{"nodeId":"b","error":"boom"}}"#,
        ];
        let state = frames
            .iter()
            .map(|text| Frame::from_json(text).unwrap())
            .fold(None, |state, frame| reduce(state, &frame, now).state)
            .unwrap();

        let at = |text: &str| {
            chrono::DateTime::parse_from_rfc3339(text)
                .unwrap()
                .with_timezone(&Utc)
        };
        assert_eq!(state.started_at, Some(at("2026-03-01T10:00:00Z")));
        assert_eq!(state.node("a").unwrap().started_at, at("2026-03-01T10:00:01.500Z"));
        let failed = state.node("b").unwrap();
        assert_eq!(failed.status, NodeStatus::Error);
        assert_eq!(failed.completed_at, Some(now));
    }

    #[test]
    fn test_waiting_requires_existing_node() {
        let waiting = |id: &str| Frame::NodeWaiting {
            payload: NodeRef { node_id: id.to_string() },
            timestamp: None,
        };
        let state = fold(&[started("e1"), node_started("a"), waiting("a"), waiting("b")]).unwrap();
        assert_eq!(state.node("a").unwrap().status, NodeStatus::Waiting);
        assert!(state.node("b").is_none());
    }

    #[test]
    fn test_paused_only_changes_status() {
        let before = fold(&[started("e1"), node_started("a")]).unwrap();
        let after = reduce(
            Some(before.clone()),
            &Frame::ExecutionPaused {
                execution_id: None,
                timestamp: None,
            },
            Utc::now(),
        )
        .state
        .unwrap();
        assert_eq!(after.status, ExecutionStatus::Paused);
        assert_eq!(after.node_states, before.node_states);
        assert_eq!(after.completed_at, None);
    }

    #[test]
    fn test_failed_run_keeps_snapshot() {
        let state = fold(&[
            started("e1"),
            node_started("a"),
            Frame::ExecutionFailed {
                execution_id: Some("e1".into()),
                error: Some(json!("interpreter crashed")),
                timestamp: None,
            },
        ])
        .unwrap();
        assert_eq!(state.status, ExecutionStatus::Failed);
        assert!(state.is_terminal());
        assert_eq!(state.node_states.len(), 1);
    }

    #[test]
    fn test_logs_append_in_order() {
        let log = |node: &str, msg: &str| Frame::LogAdded {
            payload: model::ExecutionLogEntry {
                node_id: node.to_string(),
                timestamp: None,
                level: None,
                message: json!(msg),
            },
            timestamp: None,
        };
        let state = fold(&[started("e1"), log("a", "one"), log("b", "two"), log("a", "three")]).unwrap();
        let messages: Vec<String> = state.logs.iter().map(|l| l.message_text()).collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
        let for_a: Vec<String> = state.logs_for_node("a").map(|l| l.message_text()).collect();
        assert_eq!(for_a, vec!["one", "three"]);
    }

    #[test]
    fn test_edge_pulse_settles_matching_generation() {
        let reduction = reduce(fold(&[started("e1")]), &edge("x"), Utc::now());
        let mut state = reduction.state.unwrap();
        let pulse = reduction.pulse.unwrap();
        assert!(state.edge("x").unwrap().is_active);

        assert!(state.settle_pulse(&pulse));
        assert!(!state.edge("x").unwrap().is_active);
    }

    #[test]
    fn test_stale_pulse_does_not_clear_newer_activation() {
        let now = Utc::now();
        let first = reduce(fold(&[started("e1")]), &edge("x"), now);
        let stale = first.pulse.unwrap();
        let second = reduce(first.state, &edge("x"), now);
        let mut state = second.state.unwrap();

        assert!(!state.settle_pulse(&stale));
        assert!(state.edge("x").unwrap().is_active);
        assert!(state.settle_pulse(&second.pulse.unwrap()));
        assert!(!state.edge("x").unwrap().is_active);
    }

    #[test]
    fn test_pulse_from_previous_run_never_matches() {
        let now = Utc::now();
        let first = reduce(fold(&[started("e1")]), &edge("x"), now);
        let old = first.pulse.unwrap();
        let restarted = reduce(first.state, &started("e2"), now).state;
        let mut state = reduce(restarted, &edge("x"), now).state.unwrap();

        assert!(!state.settle_pulse(&old));
        assert!(state.edge("x").unwrap().is_active);
    }

    #[test]
    fn test_unknown_frames_ignored() {
        let before = fold(&[started("e1")]).unwrap();
        let after = reduce(Some(before.clone()), &Frame::Unknown, Utc::now());
        assert_eq!(after.state, Some(before));
    }

    #[test]
    fn test_progress_counts() {
        let state = fold(&[
            started("e1"),
            node_started("a"),
            node_started("b"),
            node_completed("b"),
            node_failed("c"),
        ])
        .unwrap();
        let progress = state.progress();
        assert_eq!(progress.running, 1);
        assert_eq!(progress.success, 1);
        assert_eq!(progress.error, 1);
        assert_eq!(progress.total(), 3);
    }
}
