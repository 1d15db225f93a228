//! Placeholder substitution over JSON-like values.
//!
//! Every string leaf is scanned for `{{ expr }}` occurrences (non-greedy).
//! A string that is exactly one placeholder takes the native type of its
//! resolution; otherwise each resolution is stringified in place.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::context::ContextSnapshot;
use crate::error::NodeResult;

use super::path::parse_path;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder regex"))
}

fn whole_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{\{\s*([^{}]+?)\s*\}\}$").expect("placeholder regex"))
}

/// Recursively resolve templates in a JSON value against a snapshot.
pub fn resolve_value(value: &Value, snapshot: &ContextSnapshot) -> NodeResult<Value> {
    match value {
        Value::String(s) => resolve_str(s, snapshot),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, snapshot))
            .collect::<NodeResult<Vec<Value>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), resolve_value(item, snapshot)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve templates inside one string, applying the whole-string rule.
pub fn resolve_str(s: &str, snapshot: &ContextSnapshot) -> NodeResult<Value> {
    if let Some(caps) = whole_placeholder_re().captures(s) {
        let expr = caps.get(1).expect("capture group").as_str();
        return parse_path(expr)?.resolve(snapshot);
    }

    let re = placeholder_re();
    if !re.is_match(s) {
        return Ok(Value::String(s.to_string()));
    }

    let mut rendered = String::with_capacity(s.len());
    let mut last = 0;
    for caps in re.captures_iter(s) {
        let whole = caps.get(0).expect("match");
        let expr = caps.get(1).expect("capture group").as_str();
        rendered.push_str(&s[last..whole.start()]);
        let value = parse_path(expr)?.resolve(snapshot)?;
        rendered.push_str(&stringify(&value));
        last = whole.end();
    }
    rendered.push_str(&s[last..]);
    Ok(Value::String(rendered))
}

/// How a value reads when embedded inside a larger string.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{ExecutionContext, LoopFrame};
    use crate::dsl::schema::{NodeStatus, StepRecord};
    use crate::error::NodeError;
    use serde_json::json;

    fn snapshot() -> ContextSnapshot {
        let mut vars = serde_json::Map::new();
        vars.insert("region".into(), json!("eu"));
        vars.insert("retries".into(), json!(3));
        vars.insert("flag".into(), json!(true));
        vars.insert("payload".into(), json!({"a": 1}));

        let mut ctx = ExecutionContext::new("run", vars);
        ctx.record_step(
            "http",
            StepRecord {
                status: NodeStatus::Success,
                outputs: json!({"status_code": 200, "body": {"ids": [7, 8]}}),
                error: None,
                attempts: 1,
                duration_ms: 5,
            },
        );
        ctx.push_loop_frame(LoopFrame {
            item: json!(42),
            index: 0,
            length: 1,
        });
        ctx.snapshot()
    }

    #[test]
    fn test_plain_string_passthrough() {
        let snap = snapshot();
        assert_eq!(
            resolve_str("no templates here", &snap).unwrap(),
            json!("no templates here")
        );
    }

    #[test]
    fn test_whole_string_preserves_native_type() {
        let snap = snapshot();
        assert_eq!(resolve_str("{{variables.retries}}", &snap).unwrap(), json!(3));
        assert_eq!(resolve_str("{{variables.flag}}", &snap).unwrap(), json!(true));
        assert_eq!(
            resolve_str("{{variables.payload}}", &snap).unwrap(),
            json!({"a": 1})
        );
        assert_eq!(
            resolve_str("{{steps.http.outputs}}", &snap).unwrap(),
            json!({"status_code": 200, "body": {"ids": [7, 8]}})
        );
    }

    #[test]
    fn test_embedded_placeholders_stringify() {
        let snap = snapshot();
        assert_eq!(
            resolve_str("region={{variables.region}} retries={{variables.retries}}", &snap)
                .unwrap(),
            json!("region=eu retries=3")
        );
        assert_eq!(
            resolve_str("https://api/{{loop.item}}", &snap).unwrap(),
            json!("https://api/42")
        );
    }

    #[test]
    fn test_nested_config_resolution() {
        let snap = snapshot();
        let config = json!({
            "url": "https://api/{{variables.region}}/items",
            "headers": {"X-Count": "{{steps.http.outputs.body.ids|length}}"},
            "expect": ["{{steps.http.outputs.status_code}}", 404],
            "limit": 10
        });
        let resolved = resolve_value(&config, &snap).unwrap();
        assert_eq!(resolved["url"], json!("https://api/eu/items"));
        assert_eq!(resolved["headers"]["X-Count"], json!("2"));
        assert_eq!(resolved["expect"], json!([200, 404]));
        assert_eq!(resolved["limit"], json!(10));
    }

    #[test]
    fn test_unresolved_path_is_template_error() {
        let snap = snapshot();
        let err = resolve_str("{{variables.missing}}", &snap).unwrap_err();
        assert!(matches!(err, NodeError::TemplateError(_)));
        let err = resolve_str("x {{steps.nope.outputs}} y", &snap).unwrap_err();
        assert!(matches!(err, NodeError::TemplateError(_)));
    }

    #[test]
    fn test_resolution_is_pure() {
        let snap = snapshot();
        let config = json!({"u": "{{variables.region}}-{{loop.index}}"});
        let once = resolve_value(&config, &snap).unwrap();
        let twice = resolve_value(&config, &snap).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_stringify_forms() {
        assert_eq!(stringify(&json!(null)), "");
        assert_eq!(stringify(&json!("s")), "s");
        assert_eq!(stringify(&json!(2.5)), "2.5");
        assert_eq!(stringify(&json!([1, 2])), "[1,2]");
    }
}
