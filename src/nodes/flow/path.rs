//! Path node: a conditionally entered sub-DAG.
//!
//! The gate is evaluated first; a false gate publishes
//! `{condition_met: false, status: "skipped"}` without touching children.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::core::cancel::CancelToken;
use crate::core::context::ExecutionContext;
use crate::core::runtime::RuntimeContext;
use crate::dsl::schema::{default_level_timeout, EdgeDef, NodeDef, NodeStatus};
use crate::error::{NodeError, NodeResult};
use crate::evaluator::evaluate_condition_value;
use crate::nodes::executor::{ExecOutcome, NodeExecutor};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::template::resolve_value;

#[derive(Debug, Clone, Deserialize)]
pub struct PathConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_condition")]
    pub condition: Value,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
    #[serde(default = "default_level_timeout")]
    pub level_timeout: f64,
}

fn default_condition() -> Value {
    Value::String("true".to_string())
}

/// Outcome of running one path, shared between the path node and fork paths.
#[derive(Debug, Clone)]
pub struct PathRun {
    pub condition_met: bool,
    pub status: NodeStatus,
    pub nodes: Value,
    pub error: Option<String>,
}

impl PathRun {
    pub fn to_value(&self) -> Value {
        let mut out = json!({
            "condition_met": self.condition_met,
            "status": self.status.as_str(),
            "nodes": self.nodes,
        });
        if let Some(error) = &self.error {
            out["error"] = json!(error);
        }
        out
    }

    pub fn cancelled() -> Self {
        PathRun {
            condition_met: false,
            status: NodeStatus::Cancelled,
            nodes: json!({}),
            error: Some("cancelled".to_string()),
        }
    }
}

/// Evaluate the gate and, if met, run the sub-graph in a child scope.
pub async fn execute_path(
    config: &PathConfig,
    context: &ExecutionContext,
    runtime: &RuntimeContext,
    cancel: &CancelToken,
) -> NodeResult<PathRun> {
    let snapshot = context.snapshot();
    let condition = resolve_value(&config.condition, &snapshot)?;
    let condition_met = evaluate_condition_value(&condition)?;

    if !condition_met {
        debug!("path gate evaluated false, skipping sub-graph");
        return Ok(PathRun {
            condition_met: false,
            status: NodeStatus::Skipped,
            nodes: json!({}),
            error: None,
        });
    }

    let child = context.child_scope();
    let scheduler = Scheduler::new(
        &config.nodes,
        &config.edges,
        SchedulerConfig {
            level_timeout: Duration::from_secs_f64(config.level_timeout.max(0.0)),
            ..Default::default()
        },
    )
    .map_err(|e| NodeError::ConfigError(e.to_string()))?;

    let result = scheduler.run(&child, runtime, cancel).await;

    let mut nodes = serde_json::Map::new();
    for node in &config.nodes {
        if let Some(record) = child.get_step(&node.id) {
            nodes.insert(
                node.id.clone(),
                json!({"status": record.status.as_str(), "output": record.outputs}),
            );
        }
    }

    Ok(match result {
        Ok(()) => PathRun {
            condition_met: true,
            status: NodeStatus::Success,
            nodes: Value::Object(nodes),
            error: None,
        },
        Err(e) => PathRun {
            condition_met: true,
            status: NodeStatus::Failed,
            nodes: Value::Object(nodes),
            error: Some(e.to_string()),
        },
    })
}

pub struct PathExecutor;

#[async_trait]
impl NodeExecutor for PathExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        config: &Value,
        context: &ExecutionContext,
        runtime: &RuntimeContext,
        cancel: &CancelToken,
    ) -> NodeResult<ExecOutcome> {
        let config: PathConfig = serde_json::from_value(config.clone())
            .map_err(|e| NodeError::ConfigError(format!("Invalid path config: {}", e)))?;

        let run = execute_path(&config, context, runtime, cancel).await?;
        let outputs = run.to_value();
        Ok(match run.status {
            NodeStatus::Skipped => ExecOutcome::skipped(outputs),
            NodeStatus::Success => ExecOutcome::success(outputs),
            _ => {
                let error = run
                    .error
                    .unwrap_or_else(|| "path sub-graph failed".to_string());
                ExecOutcome::failed(outputs, error)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> (ExecutionContext, RuntimeContext, CancelToken) {
        (
            ExecutionContext::new("run", serde_json::Map::new()),
            RuntimeContext::default(),
            CancelToken::new(),
        )
    }

    #[tokio::test]
    async fn test_false_gate_skips_children() {
        let (ctx, rt, cancel) = fixtures();
        let config = json!({
            "condition": "1 > 2",
            "nodes": [{"id": "child", "type": "noop"}],
            "edges": []
        });
        let outcome = PathExecutor
            .execute("p", &config, &ctx, &rt, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.status, NodeStatus::Skipped);
        assert_eq!(outcome.outputs["condition_met"], json!(false));
        assert_eq!(outcome.outputs["status"], json!("skipped"));
        // Children were never entered.
        assert!(!ctx.has_step("child"));
    }

    #[tokio::test]
    async fn test_default_gate_is_true() {
        let (ctx, rt, cancel) = fixtures();
        let config = json!({
            "nodes": [
                {"id": "a", "type": "noop"},
                {"id": "b", "type": "noop"}
            ],
            "edges": [{"from": "a", "to": "b"}]
        });
        let outcome = PathExecutor
            .execute("p", &config, &ctx, &rt, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.status, NodeStatus::Success);
        assert_eq!(outcome.outputs["condition_met"], json!(true));
        assert_eq!(outcome.outputs["nodes"]["a"]["status"], json!("success"));
        assert_eq!(outcome.outputs["nodes"]["b"]["status"], json!("success"));
    }

    #[tokio::test]
    async fn test_child_failure_fails_path() {
        let (ctx, rt, cancel) = fixtures();
        let config = json!({
            "nodes": [{"id": "c", "type": "condition", "config": {}}],
            "edges": []
        });
        let outcome = PathExecutor
            .execute("p", &config, &ctx, &rt, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.status, NodeStatus::Failed);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_gate_template_against_parent_steps() {
        let (ctx, rt, cancel) = fixtures();
        ctx.record_step(
            "http",
            crate::dsl::schema::StepRecord {
                status: NodeStatus::Success,
                outputs: json!({"status_code": 200}),
                error: None,
                attempts: 1,
                duration_ms: 0,
            },
        );
        let config = json!({
            "condition": "{{steps.http.outputs.status_code}} == 200",
            "nodes": [{"id": "child", "type": "noop"}],
            "edges": []
        });
        let outcome = PathExecutor
            .execute("p", &config, &ctx, &rt, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.outputs["condition_met"], json!(true));
        assert_eq!(outcome.outputs["nodes"]["child"]["status"], json!("success"));
    }
}
