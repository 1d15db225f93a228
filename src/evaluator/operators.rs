use serde_json::Value;

use crate::error::{NodeError, NodeResult};

/// Equality with cross-type coercion: numeric strings compare numerically,
/// boolean-looking strings compare as booleans.
pub fn equal(value: &Value, target: &Value) -> bool {
    if value == target {
        return true;
    }

    match (value, target) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            match s.parse::<f64>() {
                Ok(parsed) => Some(parsed) == n.as_f64(),
                Err(_) => false,
            }
        }
        // Two numeric strings compare numerically ("200" == "200.0").
        (Value::String(a), Value::String(b)) => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        },
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            match s.to_lowercase().as_str() {
                "true" => *b,
                "false" => !*b,
                _ => false,
            }
        }
        _ => false,
    }
}

/// Convert a value to f64 for relational comparison.
pub fn to_f64(value: &Value) -> NodeResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| NodeError::TypeError("Cannot convert number to f64".to_string())),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| NodeError::TypeError(format!("Cannot convert '{}' to number: {}", s, e))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        other => Err(NodeError::TypeError(format!(
            "Cannot convert {:?} to number",
            other
        ))),
    }
}

/// Relational comparison after numeric coercion.
pub fn compare_numeric<F>(value: &Value, target: &Value, compare_fn: F) -> NodeResult<bool>
where
    F: Fn(f64, f64) -> bool,
{
    let a = to_f64(value)?;
    let b = to_f64(target)?;
    Ok(compare_fn(a, b))
}

/// Boolean coercion of a bare value.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
