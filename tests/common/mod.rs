//! Shared test fixtures: a scripted HTTP stub and definition helpers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use dagrun::{HttpClient, HttpRequest, HttpResponse, NodeError, NodeResult};

/// One scripted reply for a URL.
#[derive(Debug, Clone)]
pub enum StubReply {
    /// JSON body with the given status code.
    Json(u16, Value),
    /// Transport-level failure.
    Error(&'static str),
    /// Sleep, then answer with the given JSON body.
    Delay(Duration, u16, Value),
}

/// Deterministic HTTP collaborator. Replies are consumed per URL in order;
/// the last reply repeats. Unrouted URLs get `200 {}`.
pub struct StubHttpClient {
    routes: Mutex<HashMap<String, VecDeque<StubReply>>>,
    calls: Mutex<Vec<String>>,
}

impl StubHttpClient {
    pub fn new() -> Self {
        StubHttpClient {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn route(self, url: &str, replies: Vec<StubReply>) -> Self {
        self.routes
            .lock()
            .insert(url.to_string(), replies.into_iter().collect());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn next_reply(&self, url: &str) -> StubReply {
        let mut routes = self.routes.lock();
        match routes.get_mut(url) {
            Some(replies) if replies.len() > 1 => replies.pop_front().expect("non-empty"),
            Some(replies) => replies
                .front()
                .cloned()
                .unwrap_or(StubReply::Json(200, Value::Object(Default::default()))),
            None => StubReply::Json(200, Value::Object(Default::default())),
        }
    }
}

#[async_trait]
impl HttpClient for StubHttpClient {
    async fn send(&self, request: HttpRequest) -> NodeResult<HttpResponse> {
        self.calls.lock().push(request.url.clone());
        let reply = self.next_reply(&request.url);
        let (status_code, body) = match reply {
            StubReply::Json(status, body) => (status, body),
            StubReply::Error(message) => return Err(NodeError::TransportError(message.into())),
            StubReply::Delay(pause, status, body) => {
                tokio::time::sleep(pause).await;
                (status, body)
            }
        };

        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/json".to_string(),
        );
        Ok(HttpResponse {
            status_code,
            headers,
            body: body.to_string(),
        })
    }
}

pub fn stub(client: StubHttpClient) -> Arc<StubHttpClient> {
    Arc::new(client)
}

/// Parse a definition from a `serde_json::Value`.
pub fn definition(value: Value) -> dagrun::WorkflowDefinition {
    dagrun::parse_definition(&value.to_string()).expect("valid definition")
}
