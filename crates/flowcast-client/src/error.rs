//! Client error types.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid hub URL '{0}': expected ws:// or wss://")]
    InvalidUrl(String),

    #[error("Invalid workflow id '{0}': must be a non-empty URL path segment")]
    InvalidWorkflowId(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
