//! Definition schema: the immutable shape of a workflow as loaded from JSON,
//! plus the execution statuses and step records the engine produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{WorkflowError, WorkflowResult};

/// A complete workflow definition. Immutable after load.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub config: WorkflowConfig,
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Workflow-level options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Deadline in seconds for each scheduler level.
    #[serde(default = "default_level_timeout")]
    pub level_timeout: f64,
    /// Workflow variables, visible as `{{variables.<name>}}`.
    #[serde(default)]
    pub variables: serde_json::Map<String, Value>,
    /// Upper bound on concurrently running nodes per level.
    #[serde(default = "default_level_workers")]
    pub max_workers: usize,
}

pub(crate) fn default_level_timeout() -> f64 {
    300.0
}

fn default_level_workers() -> usize {
    10
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        WorkflowConfig {
            level_timeout: default_level_timeout(),
            variables: serde_json::Map::new(),
            max_workers: default_level_workers(),
        }
    }
}

/// A single node descriptor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeDef {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// The closed set of node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    HttpRequest,
    Condition,
    Loop,
    Fork,
    Path,
    Noop,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::HttpRequest => "http_request",
            NodeType::Condition => "condition",
            NodeType::Loop => "loop",
            NodeType::Fork => "fork",
            NodeType::Path => "path",
            NodeType::Noop => "noop",
        }
    }

    /// Container nodes own a sub-graph whose configs are resolved lazily,
    /// when each child actually runs.
    pub fn is_container(&self) -> bool {
        matches!(self, NodeType::Loop | NodeType::Fork | NodeType::Path)
    }
}

/// Error handling options for a node.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ErrorHandling {
    #[serde(default)]
    pub continue_on_error: bool,
}

/// Retry policy for a node. One initial attempt plus `max_retries` retries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub delay_seconds: f64,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 0,
            delay_seconds: 0.0,
            backoff: Backoff::Fixed,
            multiplier: default_backoff_multiplier(),
        }
    }
}

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
    ExponentialJitter,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub kind: EdgeKind,
}

/// Edge kinds determine when an edge is traversable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Traversed when the source finished with status `success`.
    Success,
    /// Traversed when the source failed but was allowed to continue.
    Failure,
    /// Traversed when a condition source took its true branch.
    True,
    /// Traversed when a condition source took its false branch.
    False,
    /// Unconditional traversal once the source is resolved.
    #[default]
    Default,
}

/// Terminal status of one node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Success,
    Failed,
    Skipped,
    Cancelled,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Success => "success",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
            NodeStatus::Cancelled => "cancelled",
        }
    }
}

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Timeout,
}

/// What a finished node left behind in the execution context.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StepRecord {
    pub status: NodeStatus,
    pub outputs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn cancelled(attempts: u32, duration_ms: u64) -> Self {
        StepRecord {
            status: NodeStatus::Cancelled,
            outputs: Value::Object(serde_json::Map::new()),
            error: Some("cancelled".to_string()),
            attempts,
            duration_ms,
        }
    }
}

/// Parse a workflow definition from a JSON document.
pub fn parse_definition(text: &str) -> WorkflowResult<WorkflowDefinition> {
    serde_json::from_str(text).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_definition() {
        let text = r#"{
            "id": "wf1",
            "name": "demo",
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "end", "type": "end"}
            ],
            "edges": [
                {"from": "start", "to": "end"}
            ]
        }"#;
        let def = parse_definition(text).unwrap();
        assert_eq!(def.id, "wf1");
        assert_eq!(def.version, "1.0.0");
        assert_eq!(def.config.level_timeout, 300.0);
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.edges[0].kind, EdgeKind::Default);
    }

    #[test]
    fn test_parse_node_defaults() {
        let node: NodeDef = serde_json::from_value(json!({
            "id": "n1",
            "type": "http_request",
            "config": {"url": "https://api/x"}
        }))
        .unwrap();
        assert_eq!(node.node_type, NodeType::HttpRequest);
        assert!(!node.error_handling.continue_on_error);
        assert_eq!(node.retry.max_retries, 0);
        assert_eq!(node.retry.delay_seconds, 0.0);
        assert_eq!(node.retry.backoff, Backoff::Fixed);
    }

    #[test]
    fn test_parse_edge_kinds() {
        for (raw, kind) in [
            ("success", EdgeKind::Success),
            ("failure", EdgeKind::Failure),
            ("true", EdgeKind::True),
            ("false", EdgeKind::False),
            ("default", EdgeKind::Default),
        ] {
            let edge: EdgeDef =
                serde_json::from_value(json!({"from": "a", "to": "b", "kind": raw})).unwrap();
            assert_eq!(edge.kind, kind);
        }
    }

    #[test]
    fn test_parse_retry_policy() {
        let retry: RetryPolicy = serde_json::from_value(json!({
            "max_retries": 2,
            "delay_seconds": 0.5,
            "backoff": "exponential"
        }))
        .unwrap();
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.backoff, Backoff::Exponential);
        assert_eq!(retry.multiplier, 2.0);
    }

    #[test]
    fn test_parse_rejects_unknown_node_type() {
        let result: Result<NodeDef, _> =
            serde_json::from_value(json!({"id": "n", "type": "teleport"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_error_message() {
        let err = parse_definition("{not json").unwrap_err();
        assert!(matches!(err, WorkflowError::ParseError(_)));
    }

    #[test]
    fn test_node_status_serde() {
        assert_eq!(
            serde_json::to_value(NodeStatus::Success).unwrap(),
            json!("success")
        );
        assert_eq!(
            serde_json::to_value(NodeStatus::Cancelled).unwrap(),
            json!("cancelled")
        );
    }
}
