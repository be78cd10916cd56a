//! Observer configuration.

use std::time::Duration;

use flowcast_core::execution::EDGE_PULSE;
use flowcast_core::protocol::workflow_path;

use crate::backoff::ReconnectPolicy;
use crate::error::{ClientError, ClientResult};

/// Default hub URL.
pub const DEFAULT_HUB_URL: &str = "ws://127.0.0.1:8080";

/// Settings for one observer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hub base URL without the workflow path.
    pub base_url: String,
    pub max_reconnect_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// How long an activated edge stays lit.
    pub edge_pulse: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_HUB_URL.to_string(),
            max_reconnect_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            edge_pulse: EDGE_PULSE,
        }
    }
}

impl ClientConfig {
    /// Uses the `FLOWCAST_HUB_URL` environment variable if set,
    /// otherwise defaults to `ws://127.0.0.1:8080`.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("FLOWCAST_HUB_URL").unwrap_or_else(|_| DEFAULT_HUB_URL.to_string());
        Self::default().with_base_url(&base_url)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Full endpoint for a workflow.
    pub fn endpoint(&self, workflow_id: &str) -> ClientResult<String> {
        if !(self.base_url.starts_with("ws://") || self.base_url.starts_with("wss://")) {
            return Err(ClientError::InvalidUrl(self.base_url.clone()));
        }
        if !is_path_segment(workflow_id) {
            return Err(ClientError::InvalidWorkflowId(workflow_id.to_string()));
        }
        Ok(format!("{}{}", self.base_url, workflow_path(workflow_id)))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_reconnect_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
        }
    }
}

/// The hub matches ids against the raw request path, so they are sent as-is
/// and must not need escaping.
fn is_path_segment(id: &str) -> bool {
    !id.is_empty()
        && !id
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let config = ClientConfig::default();
        assert_eq!(
            config.endpoint("wf-1").unwrap(),
            "ws://127.0.0.1:8080/workflow/wf-1/execution"
        );
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = ClientConfig::default().with_base_url("wss://hub.example.com/");
        assert_eq!(
            config.endpoint("abc").unwrap(),
            "wss://hub.example.com/workflow/abc/execution"
        );
    }

    #[test]
    fn test_non_websocket_url_rejected() {
        let config = ClientConfig::default().with_base_url("http://127.0.0.1:8080");
        assert!(matches!(config.endpoint("abc"), Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_workflow_id_must_be_path_segment() {
        let config = ClientConfig::default();
        for id in ["", "a/b", "a b", "x?y", "x#y", "50%"] {
            assert!(
                matches!(config.endpoint(id), Err(ClientError::InvalidWorkflowId(_))),
                "accepted {:?}",
                id
            );
        }
        assert!(config.endpoint("order-flow_2.v1").is_ok());
    }
}
