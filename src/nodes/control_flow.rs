//! Structural node executors: start, end, noop, condition.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::cancel::CancelToken;
use crate::core::context::ExecutionContext;
use crate::core::runtime::RuntimeContext;
use crate::error::{NodeError, NodeResult};
use crate::evaluator::evaluate_condition_value;
use crate::nodes::executor::{ExecOutcome, NodeExecutor};

/// Entry marker. Produces no outputs of its own.
pub struct StartExecutor;

#[async_trait]
impl NodeExecutor for StartExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        _config: &Value,
        _context: &ExecutionContext,
        _runtime: &RuntimeContext,
        _cancel: &CancelToken,
    ) -> NodeResult<ExecOutcome> {
        Ok(ExecOutcome::success(json!({})))
    }
}

/// Terminal marker.
pub struct EndExecutor;

#[async_trait]
impl NodeExecutor for EndExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        _config: &Value,
        _context: &ExecutionContext,
        _runtime: &RuntimeContext,
        _cancel: &CancelToken,
    ) -> NodeResult<ExecOutcome> {
        Ok(ExecOutcome::success(json!({})))
    }
}

/// Does nothing, successfully.
pub struct NoopExecutor;

#[async_trait]
impl NodeExecutor for NoopExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        _config: &Value,
        _context: &ExecutionContext,
        _runtime: &RuntimeContext,
        _cancel: &CancelToken,
    ) -> NodeResult<ExecOutcome> {
        Ok(ExecOutcome::success(json!({})))
    }
}

/// Evaluates `config.expression` and publishes the branch taken. The
/// scheduler routes `true`/`false` edges off `outputs.branch`.
pub struct ConditionExecutor;

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        config: &Value,
        _context: &ExecutionContext,
        _runtime: &RuntimeContext,
        _cancel: &CancelToken,
    ) -> NodeResult<ExecOutcome> {
        let expression = config.get("expression").ok_or_else(|| {
            NodeError::ConfigError("Condition node requires config.expression".to_string())
        })?;

        let result = evaluate_condition_value(expression)?;

        Ok(ExecOutcome::success(json!({
            "result": result,
            "branch": if result { "true" } else { "false" },
        })))
    }
}
