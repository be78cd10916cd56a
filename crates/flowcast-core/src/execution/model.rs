//! Execution state models.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Overall status of the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Paused,
}

impl ExecutionStatus {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }
}

/// Status of a single node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Running,
    Success,
    Error,
    Waiting,
}

impl NodeStatus {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Waiting => "waiting",
        }
    }
}

/// Per-node record of the current run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionState {
    pub node_id: String,
    pub status: NodeStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error: Option<Value>,
}

/// Transient "data flowed through this edge" indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeExecutionState {
    pub edge_id: String,
    pub is_active: bool,
    pub activated_at: DateTime<Utc>,
    /// Activation this entry reflects; only the matching pulse may clear it.
    #[serde(skip)]
    pub generation: u64,
}

/// A log line attributed to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    #[serde(default)]
    pub node_id: String,
    #[serde(
        default,
        deserialize_with = "crate::protocol::lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default)]
    pub message: Value,
}

impl ExecutionLogEntry {
    /// Render the free-form message for display.
    pub fn message_text(&self) -> String {
        match &self.message {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Node counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub running: usize,
    pub success: usize,
    pub error: usize,
    pub waiting: usize,
}

impl ExecutionProgress {
    pub fn total(&self) -> usize {
        self.running + self.success + self.error + self.waiting
    }
}

/// Everything an observer knows about the current (or last) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionState {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub current_node_id: Option<String>,
    pub node_states: HashMap<String, NodeExecutionState>,
    pub edge_states: HashMap<String, EdgeExecutionState>,
    pub logs: Vec<ExecutionLogEntry>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Monotonic across runs so a pulse from an earlier run never matches.
    #[serde(skip)]
    pub pulse_seq: u64,
}

impl WorkflowExecutionState {
    /// Whether the run has reached `completed` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    /// Look up a node.
    pub fn node(&self, node_id: &str) -> Option<&NodeExecutionState> {
        self.node_states.get(node_id)
    }

    /// Look up an edge.
    pub fn edge(&self, edge_id: &str) -> Option<&EdgeExecutionState> {
        self.edge_states.get(edge_id)
    }

    /// Logs attributed to one node, in arrival order.
    pub fn logs_for_node<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = &'a ExecutionLogEntry> + 'a {
        self.logs.iter().filter(move |entry| entry.node_id == node_id)
    }

    /// Edges currently pulsing.
    pub fn active_edges(&self) -> Vec<&str> {
        let mut edges: Vec<&str> = self
            .edge_states
            .values()
            .filter(|edge| edge.is_active)
            .map(|edge| edge.edge_id.as_str())
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Count nodes per status.
    pub fn progress(&self) -> ExecutionProgress {
        let mut progress = ExecutionProgress::default();
        for node in self.node_states.values() {
            match node.status {
                NodeStatus::Running => progress.running += 1,
                NodeStatus::Success => progress.success += 1,
                NodeStatus::Error => progress.error += 1,
                NodeStatus::Waiting => progress.waiting += 1,
            }
        }
        progress
    }
}
