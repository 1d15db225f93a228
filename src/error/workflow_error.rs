//! Run-level error types.

use super::NodeError;
use thiserror::Error;

/// Workflow-level errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Definition parse error: {0}")]
    ParseError(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Graph build error: {0}")]
    GraphBuildError(String),
    #[error("Cycle detected in graph")]
    CycleDetected,
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Node executor not found for type: {0}")]
    ExecutorNotFound(String),
    #[error("Level execution timeout after {timeout_secs}s")]
    LevelTimeout { timeout_secs: f64 },
    #[error("Node execution failed: node={node_id}, error={error}")]
    NodeFailed { node_id: String, error: String },
    #[error("Run cancelled")]
    Cancelled,
    #[error("Node error: {0}")]
    NodeError(Box<NodeError>),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<NodeError> for WorkflowError {
    fn from(value: NodeError) -> Self {
        WorkflowError::NodeError(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_error_display() {
        assert_eq!(
            WorkflowError::ParseError("x".into()).to_string(),
            "Definition parse error: x"
        );
        assert_eq!(
            WorkflowError::ValidationError("no start node".into()).to_string(),
            "Validation failed: no start node"
        );
        assert_eq!(
            WorkflowError::CycleDetected.to_string(),
            "Cycle detected in graph"
        );
        assert_eq!(
            WorkflowError::LevelTimeout { timeout_secs: 2.0 }.to_string(),
            "Level execution timeout after 2s"
        );
    }

    #[test]
    fn test_node_failed_display() {
        let err = WorkflowError::NodeFailed {
            node_id: "http_1".into(),
            error: "Transport error: refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("http_1"));
        assert!(msg.contains("refused"));
    }

    #[test]
    fn test_from_node_error() {
        let wf: WorkflowError = NodeError::Timeout.into();
        assert!(matches!(wf, WorkflowError::NodeError(_)));
        assert!(wf.to_string().contains("Timeout"));
    }
}
