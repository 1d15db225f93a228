//! Loop node: iterate a sub-graph over a collection.
//!
//! Each iteration runs in an isolated scope seeded from the parent context
//! with a loop frame pushed; children write plain ids inside the scope, and
//! the loop folds the records back into the parent under composite
//! `<id>[<index>]` keys so iterations never overwrite one another.

use std::cmp::min;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::core::cancel::CancelToken;
use crate::core::context::{ExecutionContext, LoopFrame};
use crate::core::runtime::RuntimeContext;
use crate::dsl::schema::{default_level_timeout, EdgeDef, NodeDef, StepRecord};
use crate::error::{NodeError, NodeResult};
use crate::nodes::executor::{ExecOutcome, NodeExecutor};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::template::resolve_value;

#[derive(Debug, Clone, Deserialize)]
struct LoopConfig {
    items: Value,
    #[serde(default)]
    nodes: Vec<NodeDef>,
    #[serde(default)]
    edges: Vec<EdgeDef>,
    #[serde(default = "default_level_timeout")]
    level_timeout: f64,
    #[serde(default)]
    parallel: bool,
    #[serde(default = "default_loop_workers")]
    max_workers: usize,
}

fn default_loop_workers() -> usize {
    4
}

struct Iteration {
    index: usize,
    steps: Vec<(String, StepRecord)>,
}

impl Iteration {
    fn to_value(&self) -> Value {
        let mut out = serde_json::Map::new();
        for (id, record) in &self.steps {
            out.insert(
                id.clone(),
                json!({"status": record.status.as_str(), "outputs": record.outputs}),
            );
        }
        Value::Object(out)
    }
}

pub struct LoopExecutor;

#[async_trait]
impl NodeExecutor for LoopExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        context: &ExecutionContext,
        runtime: &RuntimeContext,
        cancel: &CancelToken,
    ) -> NodeResult<ExecOutcome> {
        let config: LoopConfig = serde_json::from_value(config.clone())
            .map_err(|e| NodeError::ConfigError(format!("Invalid loop config: {}", e)))?;

        let snapshot = context.snapshot();
        let items = resolve_value(&config.items, &snapshot)?;
        let items = items
            .as_array()
            .ok_or_else(|| NodeError::TypeError("Loop items must resolve to an array".to_string()))?
            .clone();

        if items.is_empty() {
            return Ok(ExecOutcome::success(
                json!({"iterations": [], "total_iterations": 0}),
            ));
        }

        debug!(node_id, count = items.len(), parallel = config.parallel, "loop starting");

        let iterations = if config.parallel {
            run_parallel(&config, &items, context, runtime, cancel).await?
        } else {
            run_sequential(&config, &items, context, runtime, cancel).await?
        };

        let rendered: Vec<Value> = iterations.iter().map(Iteration::to_value).collect();
        Ok(ExecOutcome::success(json!({
            "iterations": rendered,
            "total_iterations": rendered.len(),
        })))
    }
}

async fn run_sequential(
    config: &LoopConfig,
    items: &[Value],
    context: &ExecutionContext,
    runtime: &RuntimeContext,
    cancel: &CancelToken,
) -> NodeResult<Vec<Iteration>> {
    let mut iterations = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let iteration =
            run_iteration(config, item.clone(), index, items.len(), context, runtime, cancel)
                .await?;
        fold_into_parent(context, &iteration);
        iterations.push(iteration);
    }
    Ok(iterations)
}

async fn run_parallel(
    config: &LoopConfig,
    items: &[Value],
    context: &ExecutionContext,
    runtime: &RuntimeContext,
    cancel: &CancelToken,
) -> NodeResult<Vec<Iteration>> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(min(
        config.max_workers.max(1),
        items.len(),
    )));
    let mut join = tokio::task::JoinSet::new();

    for (index, item) in items.iter().enumerate() {
        let config = config.clone();
        let item = item.clone();
        let length = items.len();
        let context = context.clone();
        let runtime = runtime.clone();
        let token = cancel.clone();
        let semaphore = semaphore.clone();
        join.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            run_iteration(&config, item, index, length, &context, &runtime, &token).await
        });
    }

    let mut collected: Vec<Option<Iteration>> = std::iter::repeat_with(|| None)
        .take(items.len())
        .collect();
    let mut first_error: Option<NodeError> = None;
    while let Some(joined) = join.join_next().await {
        match joined {
            Ok(Ok(iteration)) => {
                let idx = iteration.index;
                collected[idx] = Some(iteration);
            }
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(join_error) => {
                if first_error.is_none() {
                    first_error = Some(NodeError::ExecutionError(join_error.to_string()));
                }
            }
        }
    }

    if let Some(error) = first_error {
        return Err(error);
    }

    let iterations: Vec<Iteration> = collected.into_iter().flatten().collect();
    for iteration in &iterations {
        fold_into_parent(context, iteration);
    }
    Ok(iterations)
}

async fn run_iteration(
    config: &LoopConfig,
    item: Value,
    index: usize,
    length: usize,
    context: &ExecutionContext,
    runtime: &RuntimeContext,
    cancel: &CancelToken,
) -> NodeResult<Iteration> {
    let mut child = context.child_scope();
    child.push_loop_frame(LoopFrame {
        item,
        index,
        length,
    });

    let scheduler = Scheduler::new(
        &config.nodes,
        &config.edges,
        SchedulerConfig {
            level_timeout: Duration::from_secs_f64(config.level_timeout.max(0.0)),
            ..Default::default()
        },
    )
    .map_err(|e| NodeError::ConfigError(e.to_string()))?;

    scheduler
        .run(&child, runtime, cancel)
        .await
        .map_err(|e| NodeError::ExecutionError(format!("Iteration {} failed: {}", index, e)))?;

    let mut steps = Vec::new();
    for node in &config.nodes {
        if let Some(record) = child.get_step(&node.id) {
            steps.push((node.id.clone(), record));
        }
    }
    Ok(Iteration { index, steps })
}

fn fold_into_parent(context: &ExecutionContext, iteration: &Iteration) {
    for (id, record) in &iteration.steps {
        context.record_step(&format!("{}[{}]", id, iteration.index), record.clone());
    }
}
