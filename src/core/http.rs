//! HTTP client collaborator.
//!
//! The engine talks to the network through the [`HttpClient`] trait so tests
//! can inject deterministic stubs. The production implementation wraps a
//! pooled `reqwest` client, plus a second lazily-built client that skips TLS
//! verification for nodes configured with `verify_ssl: false`.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{NodeError, NodeResult};

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    pub verify_ssl: bool,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    /// Whether the response declared a JSON content type.
    pub fn is_json(&self) -> bool {
        self.headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("content-type") && v.contains("application/json"))
    }
}

/// Transport contract: a response means the server answered, whatever the
/// status code; errors are transport-level failures only.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> NodeResult<HttpResponse>;
}

pub struct ReqwestClient {
    pooled: reqwest::Client,
    insecure: OnceLock<reqwest::Client>,
}

impl ReqwestClient {
    pub fn new() -> Self {
        ReqwestClient {
            pooled: reqwest::Client::builder()
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            insecure: OnceLock::new(),
        }
    }

    fn client_for(&self, verify_ssl: bool) -> &reqwest::Client {
        if verify_ssl {
            &self.pooled
        } else {
            self.insecure.get_or_init(|| {
                reqwest::Client::builder()
                    .danger_accept_invalid_certs(true)
                    .pool_max_idle_per_host(10)
                    .build()
                    .unwrap_or_default()
            })
        }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> NodeResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| NodeError::ConfigError(format!("Invalid HTTP method: {}", request.method)))?;

        let client = self.client_for(request.verify_ssl);
        let mut builder = client.request(method, &request.url);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NodeError::TransportError(e.to_string()))?;

        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| NodeError::TransportError(format!("Failed to read response body: {}", e)))?;

        Ok(HttpResponse {
            status_code,
            headers,
            body,
        })
    }
}
