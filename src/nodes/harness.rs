//! Node execution harness.
//!
//! Runs one node through its full lifecycle: template resolution, the
//! per-attempt timeout, retry with backoff, `continue_on_error` handling,
//! step recording, and event emission. Template resolution happens inside
//! the timed region, so expensive resolution counts against the node's
//! timeout.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::cancel::CancelToken;
use crate::core::context::ExecutionContext;
use crate::core::events::EngineEvent;
use crate::core::runtime::RuntimeContext;
use crate::dsl::schema::{Backoff, NodeDef, NodeStatus, RetryPolicy, StepRecord};
use crate::error::NodeError;
use crate::nodes::executor::ExecOutcome;
use crate::template::resolve_value;

/// Result of running one node through the harness. A hard failure
/// (`continue_on_error = false`) is carried alongside the record so the
/// scheduler can let the rest of the level drain before failing the run.
#[derive(Debug)]
pub struct NodeOutcome {
    pub node_id: String,
    pub record: StepRecord,
    /// Branch taken by a condition node.
    pub branch: Option<bool>,
    pub hard_failure: Option<NodeError>,
}

impl NodeOutcome {
    pub fn status(&self) -> NodeStatus {
        self.record.status
    }
}

/// Execute a node to a terminal status, recording the step in the context.
pub async fn run_node(
    node: &NodeDef,
    context: &ExecutionContext,
    runtime: &RuntimeContext,
    cancel: &CancelToken,
) -> NodeOutcome {
    let started = runtime.clock.now_millis();
    debug!(node_id = %node.id, node_type = node.node_type.as_str(), "node started");
    runtime
        .emitter
        .emit(EngineEvent::NodeStarted {
            node_id: node.id.clone(),
            node_type: node.node_type.as_str().to_string(),
        })
        .await;

    let attempts_allowed = node.retry.max_retries + 1;
    // Container nodes own their deadline semantics: a fork's config.timeout
    // is the fork deadline, not a per-attempt limit.
    let timeout_secs = if node.node_type.is_container() {
        None
    } else {
        node.config.get("timeout").and_then(Value::as_f64)
    };

    let mut attempt = 0;
    let mut last_error: Option<NodeError> = None;
    let mut final_outcome: Option<ExecOutcome> = None;

    while attempt < attempts_allowed {
        attempt += 1;

        if cancel.is_cancelled() {
            last_error = Some(NodeError::Cancelled);
            break;
        }

        let result = execute_attempt(node, context, runtime, cancel, timeout_secs).await;

        match result {
            Ok(outcome) => {
                final_outcome = Some(outcome);
                break;
            }
            Err(error) => {
                let retryable = error.is_retryable() && attempt < attempts_allowed;
                if retryable {
                    warn!(node_id = %node.id, attempt, error = %error, "node attempt failed, retrying");
                    runtime
                        .emitter
                        .emit(EngineEvent::NodeRetrying {
                            node_id: node.id.clone(),
                            attempt,
                            error: error.to_string(),
                        })
                        .await;
                    let delay = retry_delay(&node.retry, attempt - 1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(error);
                } else {
                    last_error = Some(error);
                    break;
                }
            }
        }
    }

    let duration_ms = runtime.clock.elapsed_millis(started);
    let outcome = match final_outcome {
        Some(exec) => {
            let branch = extract_branch(node, &exec);
            let hard_failure = match exec.status {
                NodeStatus::Failed if !node.error_handling.continue_on_error => Some(
                    NodeError::ExecutionError(
                        exec.error
                            .clone()
                            .unwrap_or_else(|| "node failed".to_string()),
                    ),
                ),
                _ => None,
            };
            NodeOutcome {
                node_id: node.id.clone(),
                record: StepRecord {
                    status: exec.status,
                    outputs: exec.outputs,
                    error: exec.error,
                    attempts: attempt,
                    duration_ms,
                },
                branch,
                hard_failure,
            }
        }
        None => {
            let error = last_error.unwrap_or_else(|| {
                NodeError::ExecutionError("node produced no outcome".to_string())
            });
            let cancelled = matches!(error, NodeError::Cancelled);
            let status = if cancelled {
                NodeStatus::Cancelled
            } else {
                NodeStatus::Failed
            };
            let hard_failure = if cancelled || node.error_handling.continue_on_error {
                None
            } else {
                Some(error_clone(&error))
            };
            NodeOutcome {
                node_id: node.id.clone(),
                record: StepRecord {
                    status,
                    outputs: Value::Object(serde_json::Map::new()),
                    error: Some(error.to_string()),
                    attempts: attempt,
                    duration_ms,
                },
                branch: None,
                hard_failure,
            }
        }
    };

    context.record_step(&node.id, outcome.record.clone());
    debug!(
        node_id = %node.id,
        status = outcome.record.status.as_str(),
        attempts = outcome.record.attempts,
        "node finished"
    );
    runtime
        .emitter
        .emit(EngineEvent::NodeFinished {
            node_id: node.id.clone(),
            status: outcome.record.status,
            attempts: outcome.record.attempts,
            duration_ms,
        })
        .await;

    outcome
}

async fn execute_attempt(
    node: &NodeDef,
    context: &ExecutionContext,
    runtime: &RuntimeContext,
    cancel: &CancelToken,
    timeout_secs: Option<f64>,
) -> Result<ExecOutcome, NodeError> {
    let executor = runtime
        .registry
        .get(node.node_type.as_str())
        .ok_or_else(|| {
            NodeError::ConfigError(format!(
                "No executor registered for node type: {}",
                node.node_type.as_str()
            ))
        })?;

    let attempt_future = async {
        // Container configs stay raw: their sub-graph children resolve
        // their own templates when they actually run.
        let config = if node.node_type.is_container() {
            node.config.clone()
        } else {
            let snapshot = context.snapshot();
            resolve_value(&node.config, &snapshot)?
        };
        executor
            .execute(&node.id, &config, context, runtime, cancel)
            .await
    };

    match timeout_secs {
        Some(secs) => {
            let limit = Duration::from_secs_f64(secs.max(0.0));
            match tokio::time::timeout(limit, attempt_future).await {
                Ok(result) => result,
                Err(_) => Err(NodeError::Timeout),
            }
        }
        None => attempt_future.await,
    }
}

fn extract_branch(node: &NodeDef, exec: &ExecOutcome) -> Option<bool> {
    if node.node_type != crate::dsl::schema::NodeType::Condition {
        return None;
    }
    exec.outputs.get("result").and_then(Value::as_bool)
}

/// Delay before the retry following 0-based `attempt`.
fn retry_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy.delay_seconds.max(0.0);
    let secs = match policy.backoff {
        Backoff::Fixed => base,
        Backoff::Exponential => base * policy.multiplier.powi(attempt as i32),
        Backoff::ExponentialJitter => {
            let scaled = base * policy.multiplier.powi(attempt as i32);
            scaled + rand::random::<f64>() * scaled * 0.1
        }
    };
    Duration::from_secs_f64(secs.max(0.0))
}

// NodeError is not Clone (error sources aren't); rebuild the variants the
// harness can actually observe here.
fn error_clone(error: &NodeError) -> NodeError {
    match error {
        NodeError::Timeout => NodeError::Timeout,
        NodeError::Cancelled => NodeError::Cancelled,
        NodeError::TransportError(msg) => NodeError::TransportError(msg.clone()),
        other => NodeError::ExecutionError(other.to_string()),
    }
}
