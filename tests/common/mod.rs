//! In-process stand-in for the GraphQL log API.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
    pub received_at: Instant,
}

impl RecordedRequest {
    /// The `variables.query` object of the GraphQL body.
    pub fn query(&self) -> &Value {
        &self.body["variables"]["query"]
    }
}

#[derive(Clone, Default)]
pub struct MockLogApi {
    responses: Arc<Mutex<VecDeque<(u16, String)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockLogApi {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Builds a successful response body for one page.
pub fn page_body(prefix: &str, count: usize, has_more: bool, next_end: Option<&str>) -> String {
    let logs: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "id": format!("{}-{}", prefix, i),
                "labels": [{"label": "type", "value": "app"}],
                "timestamp": format!("2024-01-01T10:00:{:02}Z", i),
                "text": format!("{} line {}", prefix, i),
            })
        })
        .collect();

    json!({
        "data": {
            "logs": {
                "logs": logs,
                "nextStartTime": "2024-01-01T00:00:00Z",
                "nextEndTime": next_end,
                "hasMore": has_more,
            }
        }
    })
    .to_string()
}

async fn handle(State(api): State<MockLogApi>, headers: HeaderMap, body: String) -> (StatusCode, String) {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    api.requests.lock().unwrap().push(RecordedRequest {
        authorization: header(AUTHORIZATION),
        content_type: header(CONTENT_TYPE),
        body: serde_json::from_str(&body).unwrap_or(Value::Null),
        received_at: Instant::now(),
    });

    let (status, body) = api
        .responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| (200, page_body("tail", 0, false, None)));

    (StatusCode::from_u16(status).unwrap(), body)
}

/// Starts the mock on an ephemeral port and returns its GraphQL URL.
pub async fn start_mock(responses: Vec<(u16, String)>) -> (String, MockLogApi) {
    let api = MockLogApi {
        responses: Arc::new(Mutex::new(responses.into())),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/graphql", post(handle))
        .with_state(api.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/graphql", addr), api)
}
