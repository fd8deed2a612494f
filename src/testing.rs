//! In-process HTTP stubs standing in for record sources and webhook receivers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

struct StubState {
    status: StatusCode,
    responses: Vec<serde_json::Value>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

/// A running stub answering requests with canned JSON responses
pub(crate) struct StubServer {
    pub base_url: String,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl StubServer {
    pub async fn start(status: StatusCode, response: serde_json::Value) -> Self {
        Self::sequence(status, vec![response]).await
    }

    /// Answer the n-th request with the n-th response, repeating the last one
    pub async fn sequence(status: StatusCode, responses: Vec<serde_json::Value>) -> Self {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(StubState {
            status,
            responses,
            captured: Arc::clone(&captured),
        });

        let app = Router::new().fallback(capture).with_state(state);
        let base_url = serve(app).await;

        Self { base_url, captured }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.captured.lock().len()
    }
}

async fn capture(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let index = {
        let mut captured = state.captured.lock();
        captured.push(CapturedRequest {
            method,
            path: uri.path().to_string(),
            query: uri.query().map(String::from),
            headers,
            body,
        });
        captured.len() - 1
    };

    let response = state
        .responses
        .get(index)
        .or_else(|| state.responses.last())
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    (state.status, Json(response))
}

/// Serve `app` on an ephemeral localhost port and return its base URL
pub(crate) async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Poll `condition` every 20ms until it holds or `timeout` passes
pub(crate) async fn wait_for(timeout: std::time::Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    condition()
}

/// Base URL of a port nothing listens on
pub(crate) async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
