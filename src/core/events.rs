//! Engine event bus.
//!
//! The engine narrates a run as a stream of [`EngineEvent`]s: one per node
//! start, one per node end, one per retry, one per timeout. Consumers attach
//! an mpsc receiver through [`EventEmitter::channel`]; when nothing listens,
//! emission is a single relaxed atomic load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::dsl::schema::{NodeStatus, RunStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    RunStarted {
        run_id: String,
        workflow_id: String,
    },
    RunFinished {
        run_id: String,
        status: RunStatus,
        duration_ms: u64,
    },
    NodeStarted {
        node_id: String,
        node_type: String,
    },
    NodeFinished {
        node_id: String,
        status: NodeStatus,
        attempts: u32,
        duration_ms: u64,
    },
    NodeRetrying {
        node_id: String,
        attempt: u32,
        error: String,
    },
    LevelTimeout {
        timeout_secs: f64,
        cancelled_nodes: Vec<String>,
    },
}

/// Sender wrapper with an atomic active flag so emission can be cheaply
/// skipped when no listener is attached.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<EngineEvent>,
    active: Arc<AtomicBool>,
}

impl EventEmitter {
    /// An emitter with an attached listener.
    pub fn channel(capacity: usize) -> (EventEmitter, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            EventEmitter {
                tx,
                active: Arc::new(AtomicBool::new(true)),
            },
            rx,
        )
    }

    /// An emitter that drops every event.
    pub fn disabled() -> EventEmitter {
        let (tx, _rx) = mpsc::channel(1);
        EventEmitter {
            tx,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub async fn emit(&self, event: EngineEvent) {
        if self.is_active() {
            let _ = self.tx.send(event).await;
        }
    }
}
