//! Graph construction and validation.

pub mod types;
pub mod validator;

pub use types::{build_graph, Graph};
pub use validator::{validate_definition, validate_sub_graph, ValidationReport};
