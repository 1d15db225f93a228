//! Shared runtime machinery: execution context, collaborators, events.

pub mod cancel;
pub mod clock;
pub mod context;
pub mod events;
pub mod http;
pub mod runtime;

pub use cancel::CancelToken;
pub use clock::{Clock, FakeClock, IdGenerator, MonotonicClock, SequentialIdGenerator, UuidGenerator};
pub use context::{ContextSnapshot, ExecutionContext, LoopFrame};
pub use events::{EngineEvent, EventEmitter};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use runtime::RuntimeContext;
