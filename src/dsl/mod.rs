//! Workflow definition model and JSON parsing.

pub mod schema;

pub use schema::{
    parse_definition, Backoff, EdgeDef, EdgeKind, ErrorHandling, NodeDef, NodeStatus, NodeType,
    RetryPolicy, RunStatus, StepRecord, WorkflowConfig, WorkflowDefinition,
};
