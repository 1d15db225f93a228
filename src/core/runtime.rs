use std::sync::Arc;

use crate::core::clock::{Clock, IdGenerator, MonotonicClock, UuidGenerator};
use crate::core::events::EventEmitter;
use crate::core::http::{HttpClient, ReqwestClient};
use crate::nodes::executor::NodeExecutorRegistry;

/// Bundle of injectable collaborators shared by every executor in a run.
#[derive(Clone)]
pub struct RuntimeContext {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub http: Arc<dyn HttpClient>,
    pub registry: Arc<NodeExecutorRegistry>,
    pub emitter: EventEmitter,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        RuntimeContext {
            clock: Arc::new(MonotonicClock::new()),
            ids: Arc::new(UuidGenerator),
            http: Arc::new(ReqwestClient::new()),
            registry: Arc::new(NodeExecutorRegistry::new()),
            emitter: EventEmitter::disabled(),
        }
    }
}

impl RuntimeContext {
    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = http;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_registry(mut self, registry: Arc<NodeExecutorRegistry>) -> Self {
        self.registry = registry;
        self
    }
}
