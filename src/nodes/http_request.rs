//! HTTP request node executor.
//!
//! A received response always succeeds, whatever its status code — branching
//! on status is the condition node's job. Only transport-level failures
//! (DNS, connect, read) fail the node, and those are retryable.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::core::cancel::CancelToken;
use crate::core::context::ExecutionContext;
use crate::core::http::HttpRequest;
use crate::core::runtime::RuntimeContext;
use crate::error::{NodeError, NodeResult};
use crate::nodes::executor::{ExecOutcome, NodeExecutor};

#[derive(Debug, Clone, Deserialize)]
struct HttpRequestConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    timeout: Option<f64>,
    #[serde(default = "default_verify_ssl")]
    verify_ssl: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_verify_ssl() -> bool {
    true
}

pub struct HttpRequestExecutor;

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        _context: &ExecutionContext,
        runtime: &RuntimeContext,
        _cancel: &CancelToken,
    ) -> NodeResult<ExecOutcome> {
        let config: HttpRequestConfig = serde_json::from_value(config.clone())
            .map_err(|e| NodeError::ConfigError(format!("Invalid http_request config: {}", e)))?;
        if config.url.is_empty() {
            return Err(NodeError::ConfigError(
                "http_request requires a non-empty url".to_string(),
            ));
        }

        debug!(node_id, method = %config.method, url = %config.url, "sending http request");

        let started = runtime.clock.now_millis();
        let response = runtime
            .http
            .send(HttpRequest {
                method: config.method.clone(),
                url: config.url.clone(),
                headers: config.headers,
                body: config.body,
                timeout: config.timeout.map(Duration::from_secs_f64),
                verify_ssl: config.verify_ssl,
            })
            .await?;
        let duration_ms = runtime.clock.elapsed_millis(started);

        // Parsed body when the server said JSON, raw text otherwise.
        let result = if response.is_json() {
            serde_json::from_str::<Value>(&response.body)
                .unwrap_or_else(|_| Value::String(response.body.clone()))
        } else {
            Value::String(response.body.clone())
        };

        Ok(ExecOutcome::success(json!({
            "status_code": response.status_code,
            "headers": response.headers,
            "body": response.body,
            "result": result,
            "url": config.url,
            "duration_ms": duration_ms,
        })))
    }
}
