//! Flowcast Core Library
//!
//! Wire schema shared by the hub and its observers, plus the execution
//! state model and the reducer that folds events into it.

pub mod error;
pub mod execution;
pub mod protocol;

pub use error::{FlowcastError, FlowcastResult};
pub use execution::model::{
    EdgeExecutionState, ExecutionLogEntry, ExecutionProgress, ExecutionStatus, NodeExecutionState,
    NodeStatus, WorkflowExecutionState,
};
pub use execution::{reduce, EdgePulse, Outcome, Reduction, EDGE_PULSE};
pub use protocol::{Frame, FrameType};
