//! Run driver: validates a definition, seeds the context, runs the top-level
//! scheduler, and assembles the run result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::cancel::CancelToken;
use crate::core::clock::{Clock, IdGenerator};
use crate::core::context::ExecutionContext;
use crate::core::events::{EngineEvent, EventEmitter};
use crate::core::http::HttpClient;
use crate::core::runtime::RuntimeContext;
use crate::dsl::schema::{RunStatus, StepRecord, WorkflowDefinition};
use crate::error::WorkflowError;
use crate::graph::validator::validate_definition;
use crate::nodes::executor::NodeExecutorRegistry;
use crate::scheduler::{Scheduler, SchedulerConfig};

/// Final result of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub steps: BTreeMap<String, StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Executes workflow definitions against a set of collaborators.
pub struct WorkflowRunner {
    runtime: RuntimeContext,
}

impl WorkflowRunner {
    pub fn new() -> Self {
        WorkflowRunner {
            runtime: RuntimeContext::default(),
        }
    }

    pub fn builder() -> WorkflowRunnerBuilder {
        WorkflowRunnerBuilder {
            runtime: RuntimeContext::default(),
        }
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    /// Execute a workflow to completion. Validation errors abort before any
    /// node runs; scheduling errors surface in `status` and `error` with
    /// partial step outputs preserved.
    pub async fn execute(&self, definition: &WorkflowDefinition) -> RunResult {
        let run_id = self.runtime.ids.next_id();
        let started = self.runtime.clock.now_millis();

        let report = validate_definition(definition);
        for warning in &report.warnings {
            warn!(workflow_id = %definition.id, "{}", warning);
        }
        if !report.is_valid() {
            let error = WorkflowError::ValidationError(report.errors.join("; "));
            return RunResult {
                run_id,
                status: RunStatus::Failed,
                duration_ms: self.runtime.clock.elapsed_millis(started),
                steps: BTreeMap::new(),
                error: Some(error.to_string()),
            };
        }

        info!(workflow_id = %definition.id, run_id = %run_id, "run started");
        self.runtime
            .emitter
            .emit(EngineEvent::RunStarted {
                run_id: run_id.clone(),
                workflow_id: definition.id.clone(),
            })
            .await;

        let context = ExecutionContext::new(run_id.clone(), definition.config.variables.clone());
        let cancel = CancelToken::new();

        let outcome = match Scheduler::new(
            &definition.nodes,
            &definition.edges,
            SchedulerConfig {
                level_timeout: Duration::from_secs_f64(definition.config.level_timeout.max(0.0)),
                max_workers: definition.config.max_workers,
            },
        ) {
            Ok(scheduler) => scheduler.run(&context, &self.runtime, &cancel).await,
            Err(e) => Err(e),
        };

        let (status, error) = match outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(WorkflowError::LevelTimeout { timeout_secs }) => (
                RunStatus::Timeout,
                Some(WorkflowError::LevelTimeout { timeout_secs }.to_string()),
            ),
            Err(e) => (RunStatus::Failed, Some(e.to_string())),
        };

        let duration_ms = self.runtime.clock.elapsed_millis(started);
        info!(run_id = %run_id, status = ?status, duration_ms, "run finished");
        self.runtime
            .emitter
            .emit(EngineEvent::RunFinished {
                run_id: run_id.clone(),
                status,
                duration_ms,
            })
            .await;

        RunResult {
            run_id,
            status,
            duration_ms,
            steps: context.steps(),
            error,
        }
    }
}

impl Default for WorkflowRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder that swaps collaborators, mainly for tests.
pub struct WorkflowRunnerBuilder {
    runtime: RuntimeContext,
}

impl WorkflowRunnerBuilder {
    pub fn http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.runtime = self.runtime.with_http(http);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.runtime = self.runtime.with_clock(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.runtime = self.runtime.with_ids(ids);
        self
    }

    pub fn event_emitter(mut self, emitter: EventEmitter) -> Self {
        self.runtime = self.runtime.with_emitter(emitter);
        self
    }

    pub fn registry(mut self, registry: Arc<NodeExecutorRegistry>) -> Self {
        self.runtime = self.runtime.with_registry(registry);
        self
    }

    pub fn build(self) -> WorkflowRunner {
        WorkflowRunner {
            runtime: self.runtime,
        }
    }
}
