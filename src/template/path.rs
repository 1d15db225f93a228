//! The placeholder path language.
//!
//! Grammar: `variables.<name>[.<seg>…]`, `steps.<id>.outputs[.<seg>…]`,
//! `loop.item[.<seg>…]`, `loop.index`, `loop.length`, each optionally
//! followed by `|length`.

use serde_json::Value;

use crate::core::context::ContextSnapshot;
use crate::error::{NodeError, NodeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRoot {
    /// `variables.<name>`
    Variables,
    /// `steps.<id>.outputs`
    Steps { node_id: String },
    /// `loop.item` / `loop.index` / `loop.length`
    Loop { field: LoopField },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopField {
    Item,
    Index,
    Length,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePath {
    pub root: PathRoot,
    /// Remaining dotted segments below the root value.
    pub segments: Vec<String>,
    /// Trailing `|length` filter.
    pub length: bool,
}

/// Parse a placeholder body into a [`ValuePath`].
pub fn parse_path(expr: &str) -> NodeResult<ValuePath> {
    let expr = expr.trim();
    let (path_part, length) = match expr.split_once('|') {
        Some((path, filter)) => {
            if filter.trim() != "length" {
                return Err(NodeError::TemplateError(format!(
                    "Unknown filter '{}' in '{}'",
                    filter.trim(),
                    expr
                )));
            }
            (path.trim(), true)
        }
        None => (expr, false),
    };

    let mut segments = path_part.split('.').map(str::trim);
    let root_name = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| NodeError::TemplateError(format!("Empty template path: '{}'", expr)))?;
    let rest: Vec<String> = segments.map(str::to_string).collect();
    if rest.iter().any(String::is_empty) {
        return Err(NodeError::TemplateError(format!(
            "Empty segment in template path: '{}'",
            expr
        )));
    }

    let (root, segments) = match root_name {
        "variables" => {
            if rest.is_empty() {
                return Err(NodeError::TemplateError(
                    "Path 'variables' requires a variable name".to_string(),
                ));
            }
            (PathRoot::Variables, rest)
        }
        "steps" => {
            if rest.len() < 2 || rest[1] != "outputs" {
                return Err(NodeError::TemplateError(format!(
                    "Step paths must take the form steps.<id>.outputs[...]: '{}'",
                    expr
                )));
            }
            (
                PathRoot::Steps {
                    node_id: rest[0].clone(),
                },
                rest[2..].to_vec(),
            )
        }
        "loop" => {
            let field = match rest.first().map(String::as_str) {
                Some("item") => LoopField::Item,
                Some("index") => LoopField::Index,
                Some("length") => LoopField::Length,
                _ => {
                    return Err(NodeError::TemplateError(format!(
                        "Loop paths must be loop.item, loop.index, or loop.length: '{}'",
                        expr
                    )))
                }
            };
            if field != LoopField::Item && rest.len() > 1 {
                return Err(NodeError::TemplateError(format!(
                    "loop.{} takes no sub-path: '{}'",
                    rest[0], expr
                )));
            }
            (PathRoot::Loop { field }, rest[1..].to_vec())
        }
        other => {
            return Err(NodeError::TemplateError(format!(
                "Unknown template root '{}': '{}'",
                other, expr
            )))
        }
    };

    Ok(ValuePath {
        root,
        segments,
        length,
    })
}

/// Dotted traversal into a JSON tree. Numeric segments index arrays.
pub fn lookup_path<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

impl ValuePath {
    /// Resolve against a context snapshot. Resolution is deterministic for a
    /// given snapshot; any missing hop is a template error.
    pub fn resolve(&self, snapshot: &ContextSnapshot) -> NodeResult<Value> {
        let base: Value = match &self.root {
            PathRoot::Variables => {
                let name = &self.segments[0];
                snapshot
                    .variables
                    .get(name)
                    .cloned()
                    .ok_or_else(|| NodeError::TemplateError(format!("Unknown variable '{}'", name)))?
            }
            PathRoot::Steps { node_id } => snapshot
                .steps
                .get(node_id)
                .map(|record| record.outputs.clone())
                .ok_or_else(|| {
                    NodeError::TemplateError(format!("No step outputs recorded for '{}'", node_id))
                })?,
            PathRoot::Loop { field } => {
                let frame = snapshot.current_loop().ok_or_else(|| {
                    NodeError::TemplateError("loop.* referenced outside a loop".to_string())
                })?;
                match field {
                    LoopField::Item => frame.item.clone(),
                    LoopField::Index => Value::from(frame.index),
                    LoopField::Length => Value::from(frame.length),
                }
            }
        };

        let segments = match self.root {
            // The variable name itself was consumed above.
            PathRoot::Variables => &self.segments[1..],
            _ => &self.segments[..],
        };

        let resolved = lookup_path(&base, segments).cloned().ok_or_else(|| {
            NodeError::TemplateError(format!("Unresolved path segment(s) {:?}", segments))
        })?;

        if self.length {
            value_length(&resolved)
        } else {
            Ok(resolved)
        }
    }
}

fn value_length(value: &Value) -> NodeResult<Value> {
    match value {
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::Object(map) => Ok(Value::from(map.len())),
        other => Err(NodeError::TypeError(format!(
            "|length is not defined for {:?}",
            other
        ))),
    }
}
