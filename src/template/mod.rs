//! Template substitution for `{{ … }}` placeholders inside node
//! configuration.
//!
//! The path inside a placeholder is parsed into a small AST ([`ValuePath`])
//! rather than split ad hoc, and a single traversal routine serves both the
//! renderer and anything else that needs dotted lookup into output trees.

pub mod path;
pub mod renderer;

pub use path::{lookup_path, parse_path, PathRoot, ValuePath};
pub use renderer::{resolve_str, resolve_value, stringify};
