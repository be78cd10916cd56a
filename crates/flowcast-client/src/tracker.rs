//! Execution tracker: drives the reducer and its edge pulse timers.

use std::collections::HashMap;
use std::future::poll_fn;
use std::time::Duration;

use chrono::Utc;
use flowcast_core::execution::{reduce, EdgePulse};
use flowcast_core::protocol::Frame;
use flowcast_core::WorkflowExecutionState;
use tokio_util::time::delay_queue::{DelayQueue, Key};

/// Holds the reduced snapshot for one workflow plus pending edge pulses.
///
/// Each edge has at most one pending timer; a newer activation restarts it.
pub struct ExecutionTracker {
    state: Option<WorkflowExecutionState>,
    pulse_delay: Duration,
    pending: DelayQueue<EdgePulse>,
    keys: HashMap<String, Key>,
}

impl ExecutionTracker {
    pub fn new(pulse_delay: Duration) -> Self {
        Self {
            state: None,
            pulse_delay,
            pending: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    /// Current snapshot, if any event has produced one.
    pub fn state(&self) -> Option<&WorkflowExecutionState> {
        self.state.as_ref()
    }

    /// Fold one frame into the snapshot. Returns whether it changed.
    pub fn apply(&mut self, frame: &Frame) -> bool {
        if matches!(frame, Frame::ExecutionStarted { .. }) {
            self.clear_pending();
        }

        let reduction = reduce(self.state.take(), frame, Utc::now());
        self.state = reduction.state;
        if let Some(pulse) = reduction.pulse {
            self.schedule(pulse);
        }
        reduction.changed
    }

    fn schedule(&mut self, pulse: EdgePulse) {
        if let Some(key) = self.keys.remove(&pulse.edge_id) {
            self.pending.try_remove(&key);
        }
        let edge_id = pulse.edge_id.clone();
        let key = self.pending.insert(pulse, self.pulse_delay);
        self.keys.insert(edge_id, key);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Wait for the next edge pulse to come due. Resolves to `None` when
    /// nothing is pending.
    pub async fn next_expired(&mut self) -> Option<EdgePulse> {
        let expired = poll_fn(|cx| self.pending.poll_expired(cx)).await?;
        let key = expired.key();
        let pulse = expired.into_inner();
        if self.keys.get(&pulse.edge_id) == Some(&key) {
            self.keys.remove(&pulse.edge_id);
        }
        Some(pulse)
    }

    /// Turn an edge off if the pulse still belongs to its latest activation.
    pub fn settle(&mut self, pulse: &EdgePulse) -> bool {
        self.state
            .as_mut()
            .is_some_and(|state| state.settle_pulse(pulse))
    }

    /// Drop every pending pulse without applying it.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcast_core::protocol::{EdgeRef, NodeRef};
    use tokio::time::{timeout, Instant};

    const PULSE: Duration = Duration::from_millis(1000);

    fn started(id: &str) -> Frame {
        Frame::ExecutionStarted {
            execution_id: id.to_string(),
            timestamp: None,
        }
    }

    fn edge(id: &str) -> Frame {
        Frame::EdgeActivated {
            payload: EdgeRef { edge_id: id.to_string() },
            timestamp: None,
        }
    }

    fn is_active(tracker: &ExecutionTracker, edge_id: &str) -> bool {
        tracker.state().unwrap().edge(edge_id).unwrap().is_active
    }

    #[tokio::test(start_paused = true)]
    async fn test_edge_turns_off_after_pulse() {
        let mut tracker = ExecutionTracker::new(PULSE);
        tracker.apply(&started("e1"));
        assert!(tracker.apply(&edge("x")));
        let begin = Instant::now();

        assert!(timeout(Duration::from_millis(999), tracker.next_expired()).await.is_err());
        assert!(is_active(&tracker, "x"));

        let pulse = tracker.next_expired().await.unwrap();
        assert!(begin.elapsed() >= PULSE);
        assert!(tracker.settle(&pulse));
        assert!(!is_active(&tracker, "x"));
        assert!(!tracker.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reactivation_restarts_timer() {
        let mut tracker = ExecutionTracker::new(PULSE);
        tracker.apply(&started("e1"));
        tracker.apply(&edge("x"));
        tokio::time::sleep(Duration::from_millis(600)).await;
        tracker.apply(&edge("x"));
        let second = Instant::now();

        let pulse = tracker.next_expired().await.unwrap();
        assert!(second.elapsed() >= PULSE);
        assert!(tracker.settle(&pulse));
        assert!(!is_active(&tracker, "x"));
        assert!(!tracker.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_drops_pending_pulses() {
        let mut tracker = ExecutionTracker::new(PULSE);
        tracker.apply(&started("e1"));
        tracker.apply(&edge("x"));
        tracker.apply(&started("e2"));
        assert!(!tracker.has_pending());
        assert!(tracker.state().unwrap().edge_states.is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_frames_report_no_change() {
        let mut tracker = ExecutionTracker::new(PULSE);
        assert!(!tracker.apply(&Frame::NodeWaiting {
            payload: NodeRef { node_id: "n".into() },
            timestamp: None,
        }));
        assert!(tracker.state().is_none());
        assert!(tracker.next_expired().await.is_none());
    }
}
