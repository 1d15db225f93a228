use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::cancel::CancelToken;
use crate::core::context::ExecutionContext;
use crate::core::runtime::RuntimeContext;
use crate::dsl::schema::NodeStatus;
use crate::error::NodeResult;

/// What one executor invocation produced. Returning `Err` marks the attempt
/// failed and retryable per policy; returning an outcome with a non-success
/// status (a fork whose paths failed, a path whose gate was false) is
/// terminal for the node — outputs are kept, no retry happens.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub status: NodeStatus,
    pub outputs: Value,
    pub error: Option<String>,
}

impl ExecOutcome {
    pub fn success(outputs: Value) -> Self {
        ExecOutcome {
            status: NodeStatus::Success,
            outputs,
            error: None,
        }
    }

    pub fn failed(outputs: Value, error: impl Into<String>) -> Self {
        ExecOutcome {
            status: NodeStatus::Failed,
            outputs,
            error: Some(error.into()),
        }
    }

    pub fn skipped(outputs: Value) -> Self {
        ExecOutcome {
            status: NodeStatus::Skipped,
            outputs,
            error: None,
        }
    }
}

/// Trait for node execution. Each node type implements this.
///
/// `config` arrives template-resolved for leaf nodes; container nodes
/// (loop, fork, path) receive it raw and resolve the parts they own at the
/// moment they need them.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        context: &ExecutionContext,
        runtime: &RuntimeContext,
        cancel: &CancelToken,
    ) -> NodeResult<ExecOutcome>;
}

/// Registry of node executors by node type string.
pub struct NodeExecutorRegistry {
    executors: HashMap<String, Box<dyn NodeExecutor>>,
}

impl NodeExecutorRegistry {
    pub fn new() -> Self {
        Self::with_builtins()
    }

    pub fn empty() -> Self {
        NodeExecutorRegistry {
            executors: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = NodeExecutorRegistry::empty();
        registry.register("start", Box::new(super::control_flow::StartExecutor));
        registry.register("end", Box::new(super::control_flow::EndExecutor));
        registry.register("noop", Box::new(super::control_flow::NoopExecutor));
        registry.register(
            "condition",
            Box::new(super::control_flow::ConditionExecutor),
        );
        registry.register(
            "http_request",
            Box::new(super::http_request::HttpRequestExecutor),
        );
        registry.register("loop", Box::new(super::flow::LoopExecutor));
        registry.register("fork", Box::new(super::flow::ForkExecutor));
        registry.register("path", Box::new(super::flow::PathExecutor));
        registry
    }

    pub fn register(&mut self, node_type: &str, executor: Box<dyn NodeExecutor>) {
        self.executors.insert(node_type.to_string(), executor);
    }

    pub fn get(&self, node_type: &str) -> Option<&dyn NodeExecutor> {
        self.executors.get(node_type).map(|e| e.as_ref())
    }
}

impl Default for NodeExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
