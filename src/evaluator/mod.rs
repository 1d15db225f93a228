//! Boolean expression evaluation for condition nodes and path gates.
//!
//! Expressions are evaluated *after* template substitution, so the input is
//! a closed little language of literals, comparisons, `&&`/`||`, and
//! parentheses. Bare identifiers are rejected — string operands must be
//! quoted in the template.

pub mod operators;
pub mod parser;

use serde_json::Value;

use crate::error::{NodeError, NodeResult};

use parser::{parse_expression, CmpOp, Expr};

/// Evaluate a substituted expression string to a boolean.
pub fn evaluate_predicate(input: &str) -> NodeResult<bool> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(false);
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Ok(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Ok(false);
    }

    let expr = parse_expression(trimmed)?;
    Ok(operators::truthy(&eval(&expr)?))
}

/// Evaluate a condition that may already have a native type after
/// whole-string template substitution.
pub fn evaluate_condition_value(value: &Value) -> NodeResult<bool> {
    match value {
        Value::String(s) => evaluate_predicate(s),
        other => Ok(operators::truthy(other)),
    }
}

fn eval(expr: &Expr) -> NodeResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::And(lhs, rhs) => {
            // Short-circuit.
            if !operators::truthy(&eval(lhs)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(operators::truthy(&eval(rhs)?)))
        }
        Expr::Or(lhs, rhs) => {
            if operators::truthy(&eval(lhs)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(operators::truthy(&eval(rhs)?)))
        }
        Expr::Cmp { op, lhs, rhs } => {
            let left = eval(lhs)?;
            let right = eval(rhs)?;
            let result = match op {
                CmpOp::Eq => operators::equal(&left, &right),
                CmpOp::Ne => !operators::equal(&left, &right),
                CmpOp::Lt => operators::compare_numeric(&left, &right, |a, b| a < b)?,
                CmpOp::Le => operators::compare_numeric(&left, &right, |a, b| a <= b)?,
                CmpOp::Gt => operators::compare_numeric(&left, &right, |a, b| a > b)?,
                CmpOp::Ge => operators::compare_numeric(&left, &right, |a, b| a >= b)?,
            };
            Ok(Value::Bool(result))
        }
    }
}

// Exposed so the parser's errors share one kind.
pub(crate) fn parse_error(msg: impl Into<String>) -> NodeError {
    NodeError::ExpressionParseError(msg.into())
}
