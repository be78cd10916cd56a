//! Centralized error types for Flowcast.

use thiserror::Error;

/// Main error type for schema and path handling.
#[derive(Error, Debug)]
pub enum FlowcastError {
    #[error("Invalid workflow path: {0}")]
    InvalidWorkflowPath(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("Frame is missing a string 'type' field")]
    MissingType,

    #[error("Frame must be a JSON object")]
    NotAnObject,
}

/// Result type for Flowcast operations.
pub type FlowcastResult<T> = Result<T, FlowcastError>;

impl FlowcastError {
    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidWorkflowPath(path.into())
    }
}
