//! Workflow endpoint path grammar: `/workflow/{workflowId}/execution`.

use crate::error::{FlowcastError, FlowcastResult};

const PREFIX: &str = "/workflow/";
const SUFFIX: &str = "/execution";

/// Extract the workflow identifier from a request path.
///
/// The identifier must be a single non-empty path segment; anything else
/// (extra segments, trailing slash, empty id) is rejected.
pub fn parse_workflow_path(path: &str) -> FlowcastResult<&str> {
    let id = path
        .strip_prefix(PREFIX)
        .and_then(|rest| rest.strip_suffix(SUFFIX))
        .ok_or_else(|| FlowcastError::invalid_path(path))?;

    if id.is_empty() || id.contains('/') {
        return Err(FlowcastError::invalid_path(path));
    }

    Ok(id)
}

/// Build the endpoint path for a workflow.
pub fn workflow_path(workflow_id: &str) -> String {
    format!("{}{}{}", PREFIX, workflow_id, SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_path() {
        assert_eq!(parse_workflow_path("/workflow/abc-123/execution").unwrap(), "abc-123");
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(parse_workflow_path("/workflow//execution").is_err());
    }

    #[test]
    fn test_unrelated_path_rejected() {
        assert!(parse_workflow_path("/not-a-workflow-path").is_err());
        assert!(parse_workflow_path("/").is_err());
    }

    #[test]
    fn test_extra_segments_rejected() {
        assert!(parse_workflow_path("/workflow/a/b/execution").is_err());
        assert!(parse_workflow_path("/workflow/a/execution/").is_err());
        assert!(parse_workflow_path("/api/workflow/a/execution").is_err());
    }

    #[test]
    fn test_workflow_path_round_trip() {
        let path = workflow_path("wf-42");
        assert_eq!(path, "/workflow/wf-42/execution");
        assert_eq!(parse_workflow_path(&path).unwrap(), "wf-42");
    }
}
