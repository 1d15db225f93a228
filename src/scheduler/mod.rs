//! Level scheduler.
//!
//! Executes a (sub-)graph to completion with maximum safe parallelism. Each
//! round gathers the nodes whose every predecessor has been decided; those
//! with at least one taken incoming edge form the next level and run on a
//! bounded pool under the level deadline, the rest are skipped and their
//! outgoing edges disabled in the same round.
//!
//! The scheduler is a plain value over (nodes, edges, pool size, deadline):
//! fork, path, and loop bodies build their own instances.

use std::cmp::min;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::core::cancel::CancelToken;
use crate::core::context::ExecutionContext;
use crate::core::events::EngineEvent;
use crate::core::runtime::RuntimeContext;
use crate::dsl::schema::{EdgeDef, EdgeKind, NodeDef, NodeStatus, StepRecord};
use crate::error::{WorkflowError, WorkflowResult};
use crate::graph::types::{build_graph, Graph};
use crate::nodes::harness::{run_node, NodeOutcome};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub level_timeout: Duration,
    pub max_workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            level_timeout: Duration::from_secs(300),
            max_workers: 10,
        }
    }
}

pub struct Scheduler {
    graph: Graph,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        nodes: &[NodeDef],
        edges: &[EdgeDef],
        config: SchedulerConfig,
    ) -> WorkflowResult<Self> {
        Ok(Scheduler {
            graph: build_graph(nodes, edges)?,
            config,
        })
    }

    /// Run the graph to completion, writing step records into `context`.
    pub async fn run(
        &self,
        context: &ExecutionContext,
        runtime: &RuntimeContext,
        cancel: &CancelToken,
    ) -> WorkflowResult<()> {
        // Undecided predecessors per node, and the set of nodes with at
        // least one taken incoming edge. Roots start enabled.
        let mut remaining: HashMap<String, HashSet<String>> = HashMap::new();
        let mut enabled: HashSet<String> = HashSet::new();
        let mut settled: HashSet<String> = HashSet::new();

        for id in self.graph.node_ids() {
            let sources = self.graph.incoming_sources(id);
            if sources.is_empty() {
                enabled.insert(id.clone());
            }
            remaining.insert(id.clone(), sources);
        }

        loop {
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }

            // Nodes whose predecessors all resolved without enabling any
            // incoming edge are skipped; their own edges disable in turn.
            loop {
                let skippable: Vec<String> = self
                    .graph
                    .node_ids()
                    .iter()
                    .filter(|id| !settled.contains(id.as_str()))
                    .filter(|id| remaining.get(id.as_str()).is_some_and(HashSet::is_empty))
                    .filter(|id| !enabled.contains(id.as_str()))
                    .cloned()
                    .collect();
                if skippable.is_empty() {
                    break;
                }
                for id in skippable {
                    debug!(node_id = %id, "node skipped: no incoming edge taken");
                    settled.insert(id.clone());
                    self.resolve_edges(&id, NodeStatus::Cancelled, None, &mut remaining, &mut enabled);
                }
            }

            let level: Vec<NodeDef> = self
                .graph
                .node_ids()
                .iter()
                .filter(|id| !settled.contains(id.as_str()))
                .filter(|id| remaining.get(id.as_str()).is_some_and(HashSet::is_empty))
                .filter(|id| enabled.contains(id.as_str()))
                .filter_map(|id| self.graph.node(id).cloned())
                .collect();

            if level.is_empty() {
                return Ok(());
            }

            let outcomes = self.dispatch_level(&level, context, runtime, cancel).await?;

            // Route edges for every completed node, then surface the first
            // unrecovered failure in level order.
            for node in &level {
                if let Some(outcome) = outcomes.get(&node.id) {
                    settled.insert(node.id.clone());
                    self.resolve_edges(
                        &node.id,
                        outcome.status(),
                        outcome.branch,
                        &mut remaining,
                        &mut enabled,
                    );
                }
            }

            for node in &level {
                match outcomes.get(&node.id) {
                    Some(outcome) => {
                        if let Some(failure) = &outcome.hard_failure {
                            return Err(WorkflowError::NodeFailed {
                                node_id: node.id.clone(),
                                error: failure.to_string(),
                            });
                        }
                    }
                    None => {
                        error!(node_id = %node.id, "node task vanished without an outcome");
                        return Err(WorkflowError::InternalError(format!(
                            "node '{}' produced no outcome",
                            node.id
                        )));
                    }
                }
            }
        }
    }

    /// Dispatch one level on a bounded pool and await it under the level
    /// deadline. On deadline: abort in-flight tasks, record them cancelled,
    /// and return the level-timeout error.
    async fn dispatch_level(
        &self,
        level: &[NodeDef],
        context: &ExecutionContext,
        runtime: &RuntimeContext,
        cancel: &CancelToken,
    ) -> WorkflowResult<HashMap<String, NodeOutcome>> {
        debug!(
            nodes = ?level.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            "dispatching level"
        );

        let level_cancel = cancel.child();
        let semaphore = Arc::new(Semaphore::new(min(
            self.config.max_workers.max(1),
            level.len(),
        )));
        let mut join = JoinSet::new();

        for node in level {
            let node = node.clone();
            let context = context.clone();
            let runtime = runtime.clone();
            let token = level_cancel.clone();
            let semaphore = semaphore.clone();
            join.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                run_node(&node, &context, &runtime, &token).await
            });
        }

        let collected = tokio::time::timeout(self.config.level_timeout, async {
            let mut outcomes: HashMap<String, NodeOutcome> = HashMap::new();
            while let Some(joined) = join.join_next().await {
                match joined {
                    Ok(outcome) => {
                        outcomes.insert(outcome.node_id.clone(), outcome);
                    }
                    Err(join_error) => {
                        error!(error = %join_error, "level task failed to join");
                    }
                }
            }
            outcomes
        })
        .await;

        match collected {
            Ok(outcomes) => Ok(outcomes),
            Err(_elapsed) => {
                let timeout_secs = self.config.level_timeout.as_secs_f64();
                level_cancel.cancel();
                join.abort_all();

                // Finished nodes already wrote their records; whatever has
                // no record was still in flight.
                let mut cancelled_ids = Vec::new();
                for node in level {
                    if !context.has_step(&node.id) {
                        context.record_step(&node.id, StepRecord::cancelled(1, 0));
                        cancelled_ids.push(node.id.clone());
                    }
                }
                warn!(timeout_secs, cancelled = ?cancelled_ids, "level timeout");
                runtime
                    .emitter
                    .emit(EngineEvent::LevelTimeout {
                        timeout_secs,
                        cancelled_nodes: cancelled_ids,
                    })
                    .await;
                Err(WorkflowError::LevelTimeout { timeout_secs })
            }
        }
    }

    fn resolve_edges(
        &self,
        node_id: &str,
        status: NodeStatus,
        branch: Option<bool>,
        remaining: &mut HashMap<String, HashSet<String>>,
        enabled: &mut HashSet<String>,
    ) {
        let mut targets: HashSet<&str> = HashSet::new();
        for edge in self.graph.outgoing_edges(node_id) {
            targets.insert(edge.to.as_str());
            if edge_taken(edge.kind, status, branch) {
                enabled.insert(edge.to.clone());
            }
        }
        for target in targets {
            if let Some(sources) = remaining.get_mut(target) {
                sources.remove(node_id);
            }
        }
    }
}

/// Routing rule for one edge, given the source's terminal status.
fn edge_taken(kind: EdgeKind, status: NodeStatus, branch: Option<bool>) -> bool {
    match status {
        NodeStatus::Success => match kind {
            EdgeKind::Success | EdgeKind::Default => true,
            EdgeKind::True => branch == Some(true),
            EdgeKind::False => branch == Some(false),
            EdgeKind::Failure => false,
        },
        // Reached only under continue_on_error; hard failures abort first.
        NodeStatus::Failed => matches!(kind, EdgeKind::Failure | EdgeKind::Default),
        // A skipped path gate resolved without error.
        NodeStatus::Skipped => matches!(kind, EdgeKind::Success | EdgeKind::Default),
        NodeStatus::Cancelled => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_taken_on_success() {
        assert!(edge_taken(EdgeKind::Success, NodeStatus::Success, None));
        assert!(edge_taken(EdgeKind::Default, NodeStatus::Success, None));
        assert!(!edge_taken(EdgeKind::Failure, NodeStatus::Success, None));
        assert!(edge_taken(EdgeKind::True, NodeStatus::Success, Some(true)));
        assert!(!edge_taken(EdgeKind::True, NodeStatus::Success, Some(false)));
        assert!(edge_taken(EdgeKind::False, NodeStatus::Success, Some(false)));
    }

    #[test]
    fn test_edge_taken_on_recovered_failure() {
        assert!(edge_taken(EdgeKind::Failure, NodeStatus::Failed, None));
        assert!(edge_taken(EdgeKind::Default, NodeStatus::Failed, None));
        assert!(!edge_taken(EdgeKind::Success, NodeStatus::Failed, None));
        assert!(!edge_taken(EdgeKind::True, NodeStatus::Failed, Some(true)));
    }

    #[test]
    fn test_edge_taken_on_skip_and_cancel() {
        assert!(edge_taken(EdgeKind::Success, NodeStatus::Skipped, None));
        assert!(!edge_taken(EdgeKind::Failure, NodeStatus::Skipped, None));
        assert!(!edge_taken(EdgeKind::Default, NodeStatus::Cancelled, None));
        assert!(!edge_taken(EdgeKind::Success, NodeStatus::Cancelled, None));
    }
}
