//! Fork node: parallel fan-out over conditionally gated paths.

use std::cmp::min;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::cancel::CancelToken;
use crate::core::context::ExecutionContext;
use crate::core::runtime::RuntimeContext;
use crate::dsl::schema::{NodeDef, NodeStatus, NodeType};
use crate::error::{NodeError, NodeResult};
use crate::nodes::executor::{ExecOutcome, NodeExecutor};
use crate::nodes::flow::path::{execute_path, PathConfig, PathRun};

#[derive(Debug, Clone, Deserialize)]
struct ForkConfig {
    #[serde(default)]
    paths: Vec<PathConfig>,
    #[serde(default = "default_max_workers")]
    max_workers: usize,
    #[serde(default = "default_timeout")]
    timeout: f64,
    #[serde(default = "default_max_nodes_per_path")]
    max_nodes_per_path: usize,
    #[serde(default = "default_max_total_nodes")]
    max_total_nodes: usize,
}

fn default_max_workers() -> usize {
    5
}

fn default_timeout() -> f64 {
    600.0
}

fn default_max_nodes_per_path() -> usize {
    50
}

fn default_max_total_nodes() -> usize {
    200
}

pub struct ForkExecutor;

#[async_trait]
impl NodeExecutor for ForkExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        context: &ExecutionContext,
        runtime: &RuntimeContext,
        cancel: &CancelToken,
    ) -> NodeResult<ExecOutcome> {
        let config: ForkConfig = serde_json::from_value(config.clone())
            .map_err(|e| NodeError::ConfigError(format!("Invalid fork config: {}", e)))?;

        validate_budgets(&config)?;

        if config.paths.is_empty() {
            return Ok(ExecOutcome::success(fork_output(&[])));
        }

        let path_ids: Vec<String> = config
            .paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                path.id
                    .clone()
                    .unwrap_or_else(|| format!("path_{}", i + 1))
            })
            .collect();

        debug!(node_id, paths = ?path_ids, "fork dispatching paths");

        let fork_cancel = cancel.child();
        let semaphore = Arc::new(tokio::sync::Semaphore::new(min(
            config.max_workers.max(1),
            config.paths.len(),
        )));
        // Completed paths land here even if the deadline fires while others
        // are still in flight.
        let completed: Arc<Mutex<HashMap<usize, PathRun>>> = Arc::new(Mutex::new(HashMap::new()));
        let mut join = tokio::task::JoinSet::new();

        for (index, path) in config.paths.iter().enumerate() {
            let path = path.clone();
            let child = context.child_scope();
            let runtime = runtime.clone();
            let token = fork_cancel.clone();
            let semaphore = semaphore.clone();
            let completed = completed.clone();
            join.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let run = match execute_path(&path, &child, &runtime, &token).await {
                    Ok(run) => run,
                    Err(e) => PathRun {
                        condition_met: false,
                        status: NodeStatus::Failed,
                        nodes: json!({}),
                        error: Some(e.to_string()),
                    },
                };
                completed.lock().insert(index, run);
            });
        }

        let deadline = Duration::from_secs_f64(config.timeout.max(0.0));
        let finished = tokio::time::timeout(deadline, async {
            while join.join_next().await.is_some() {}
        })
        .await;

        if finished.is_err() {
            warn!(node_id, timeout_secs = config.timeout, "fork timeout, cancelling pending paths");
            fork_cancel.cancel();
            join.abort_all();
        }

        let completed = completed.lock();
        let runs: Vec<(String, PathRun)> = path_ids
            .iter()
            .enumerate()
            .map(|(index, id)| {
                let run = completed
                    .get(&index)
                    .cloned()
                    .unwrap_or_else(PathRun::cancelled);
                (id.clone(), run)
            })
            .collect();

        let all_ok = runs
            .iter()
            .all(|(_, run)| matches!(run.status, NodeStatus::Success | NodeStatus::Skipped));
        let outputs = fork_output(&runs);

        Ok(if all_ok {
            ExecOutcome::success(outputs)
        } else {
            let failed: Vec<&str> = runs
                .iter()
                .filter(|(_, run)| {
                    !matches!(run.status, NodeStatus::Success | NodeStatus::Skipped)
                })
                .map(|(id, _)| id.as_str())
                .collect();
            ExecOutcome::failed(
                outputs,
                format!("fork paths did not succeed: {}", failed.join(", ")),
            )
        })
    }
}

fn fork_output(runs: &[(String, PathRun)]) -> Value {
    let mut paths = serde_json::Map::new();
    for (id, run) in runs {
        paths.insert(id.clone(), run.to_value());
    }
    json!({
        "type": "fork",
        "total_paths": runs.len(),
        "paths_executed": runs.iter().filter(|(_, run)| run.condition_met).count(),
        "paths": paths,
    })
}

/// Enforce fork node-count caps. Nested container sub-graphs count against
/// the budgets of every enclosing fork.
fn validate_budgets(config: &ForkConfig) -> NodeResult<()> {
    let mut total = 0usize;
    for (i, path) in config.paths.iter().enumerate() {
        let count = count_nodes(&path.nodes);
        if count > config.max_nodes_per_path {
            return Err(NodeError::BudgetExceeded(format!(
                "path {} has {} nodes, limit {}",
                path.id.clone().unwrap_or_else(|| format!("path_{}", i + 1)),
                count,
                config.max_nodes_per_path
            )));
        }
        total += count;
    }
    if total > config.max_total_nodes {
        return Err(NodeError::BudgetExceeded(format!(
            "fork spans {} nodes, limit {}",
            total, config.max_total_nodes
        )));
    }
    Ok(())
}

fn count_nodes(nodes: &[NodeDef]) -> usize {
    nodes.iter().map(|node| 1 + count_embedded(node)).sum()
}

fn count_embedded(node: &NodeDef) -> usize {
    fn nodes_of(container: &Value) -> usize {
        container
            .get("nodes")
            .cloned()
            .and_then(|v| serde_json::from_value::<Vec<NodeDef>>(v).ok())
            .map(|nodes| count_nodes(&nodes))
            .unwrap_or(0)
    }

    match node.node_type {
        NodeType::Loop | NodeType::Path => nodes_of(&node.config),
        NodeType::Fork => node
            .config
            .get("paths")
            .and_then(Value::as_array)
            .map(|paths| paths.iter().map(nodes_of).sum())
            .unwrap_or(0),
        _ => 0,
    }
}
