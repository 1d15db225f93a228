//! Per-run execution context.
//!
//! The context is the single shared mutable resource of a run: workflow
//! variables, step records, and the loop-frame stack. Step writes serialize
//! through one mutex; template evaluation reads a cloned snapshot so
//! long-running resolution never blocks writers. The loop stack lives on the
//! per-lineage half of the handle — cloning the context gives a task its own
//! stack while the step map stays shared.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::dsl::schema::StepRecord;

/// One loop iteration frame, visible to lexically enclosed executions as
/// `{{loop.item}}`, `{{loop.index}}`, `{{loop.length}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopFrame {
    pub item: Value,
    pub index: usize,
    pub length: usize,
}

#[derive(Debug, Default)]
struct ContextState {
    variables: serde_json::Map<String, Value>,
    steps: BTreeMap<String, StepRecord>,
}

/// Shared per-run execution state.
#[derive(Clone)]
pub struct ExecutionContext {
    run_id: String,
    shared: Arc<Mutex<ContextState>>,
    loop_frames: Vec<LoopFrame>,
}

/// An immutable copy of the context taken at one instant, used by the
/// template and expression evaluators.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub variables: serde_json::Map<String, Value>,
    pub steps: BTreeMap<String, StepRecord>,
    pub loop_frames: Vec<LoopFrame>,
}

impl ContextSnapshot {
    /// The innermost loop frame, if any.
    pub fn current_loop(&self) -> Option<&LoopFrame> {
        self.loop_frames.last()
    }
}

impl ExecutionContext {
    pub fn new(run_id: impl Into<String>, variables: serde_json::Map<String, Value>) -> Self {
        ExecutionContext {
            run_id: run_id.into(),
            shared: Arc::new(Mutex::new(ContextState {
                variables,
                steps: BTreeMap::new(),
            })),
            loop_frames: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Clone variables, steps, and the lineage's loop stack under the lock.
    pub fn snapshot(&self) -> ContextSnapshot {
        let state = self.shared.lock();
        ContextSnapshot {
            variables: state.variables.clone(),
            steps: state.steps.clone(),
            loop_frames: self.loop_frames.clone(),
        }
    }

    /// Record a terminal step. Later writes under the same key overwrite;
    /// loop iterations avoid collisions via composite `id[index]` keys.
    pub fn record_step(&self, node_id: &str, record: StepRecord) {
        self.shared.lock().steps.insert(node_id.to_string(), record);
    }

    pub fn get_step(&self, node_id: &str) -> Option<StepRecord> {
        self.shared.lock().steps.get(node_id).cloned()
    }

    pub fn has_step(&self, node_id: &str) -> bool {
        self.shared.lock().steps.contains_key(node_id)
    }

    pub fn steps(&self) -> BTreeMap<String, StepRecord> {
        self.shared.lock().steps.clone()
    }

    pub fn variables(&self) -> serde_json::Map<String, Value> {
        self.shared.lock().variables.clone()
    }

    /// A detached scope seeded with a snapshot of this context. Used for loop
    /// iterations and fork paths: children read everything the parent has
    /// produced so far, but their writes stay local until folded back.
    pub fn child_scope(&self) -> ExecutionContext {
        let state = self.shared.lock();
        ExecutionContext {
            run_id: self.run_id.clone(),
            shared: Arc::new(Mutex::new(ContextState {
                variables: state.variables.clone(),
                steps: state.steps.clone(),
            })),
            loop_frames: self.loop_frames.clone(),
        }
    }

    pub fn push_loop_frame(&mut self, frame: LoopFrame) {
        self.loop_frames.push(frame);
    }

    pub fn pop_loop_frame(&mut self) -> Option<LoopFrame> {
        self.loop_frames.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::schema::NodeStatus;
    use serde_json::json;

    fn record(outputs: Value) -> StepRecord {
        StepRecord {
            status: NodeStatus::Success,
            outputs,
            error: None,
            attempts: 1,
            duration_ms: 0,
        }
    }

    fn variables() -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("env".to_string(), json!("prod"));
        map
    }

    #[test]
    fn test_record_and_snapshot() {
        let ctx = ExecutionContext::new("run-1", variables());
        ctx.record_step("a", record(json!({"v": 1})));

        let snap = ctx.snapshot();
        assert_eq!(snap.variables.get("env"), Some(&json!("prod")));
        assert_eq!(snap.steps.get("a").unwrap().outputs, json!({"v": 1}));
        assert!(snap.current_loop().is_none());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let ctx = ExecutionContext::new("run-1", variables());
        let snap = ctx.snapshot();
        ctx.record_step("late", record(json!({})));
        assert!(!snap.steps.contains_key("late"));
        assert!(ctx.has_step("late"));
    }

    #[test]
    fn test_clone_shares_steps_but_not_loop_stack() {
        let mut ctx = ExecutionContext::new("run-1", variables());
        let peer = ctx.clone();

        ctx.push_loop_frame(LoopFrame {
            item: json!(1),
            index: 0,
            length: 3,
        });
        ctx.record_step("a", record(json!({})));

        // Step writes are shared; the loop stack is per lineage.
        assert!(peer.has_step("a"));
        assert!(peer.snapshot().current_loop().is_none());
        assert_eq!(ctx.snapshot().current_loop().unwrap().index, 0);
    }

    #[test]
    fn test_child_scope_isolation() {
        let ctx = ExecutionContext::new("run-1", variables());
        ctx.record_step("before", record(json!({"n": 1})));

        let child = ctx.child_scope();
        assert!(child.has_step("before"));

        child.record_step("inner", record(json!({})));
        assert!(!ctx.has_step("inner"));
    }

    #[test]
    fn test_loop_frame_push_pop() {
        let mut ctx = ExecutionContext::new("run-1", serde_json::Map::new());
        ctx.push_loop_frame(LoopFrame {
            item: json!("x"),
            index: 2,
            length: 5,
        });
        assert_eq!(ctx.snapshot().current_loop().unwrap().length, 5);
        let frame = ctx.pop_loop_frame().unwrap();
        assert_eq!(frame.index, 2);
        assert!(ctx.pop_loop_frame().is_none());
    }
}
