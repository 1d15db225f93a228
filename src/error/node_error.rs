use thiserror::Error;

/// Node-level errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Template error: {0}")]
    TemplateError(String),
    #[error("Expression parse error: {0}")]
    ExpressionParseError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Transport error: {0}")]
    TransportError(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Timeout: node execution exceeded time limit")]
    Timeout,
    #[error("Node budget exceeded: {0}")]
    BudgetExceeded(String),
    #[error("Cancelled")]
    Cancelled,
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl NodeError {
    /// Whether another attempt may succeed. Timeouts consume the attempt but
    /// stay retryable within the retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NodeError::TemplateError(_)
                | NodeError::ExpressionParseError(_)
                | NodeError::TransportError(_)
                | NodeError::Timeout
        )
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::SerializationError(e.to_string())
    }
}
