//! Mock fal.ai queue and storage backend for integration tests
//!
//! One server plays both roles: `/upload` is the storage API, everything
//! else is the queue API. Status polls walk a scripted sequence so tests
//! can drive the orchestrator through any lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Canned image the mock serves as the job result
pub const RESULT_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nedited-by-mock-fal";

/// Script for the mock's behavior
pub struct MockFalOptions {
    /// Statuses returned by successive polls; the last one repeats
    pub statuses: Vec<&'static str>,
    /// Failure reason reported alongside a `FAILED` status
    pub failure_reason: Option<&'static str>,
    /// Fail this many uploads with 500 before accepting them
    pub fail_uploads: u32,
    /// Reject every upload with 400
    pub reject_uploads: bool,
    /// Fail this many status polls with 500 before serving the script
    pub fail_polls: u32,
    /// Return the result as a `data:` URI instead of a downloadable URL
    pub result_data_uri: bool,
}

impl Default for MockFalOptions {
    fn default() -> Self {
        Self {
            statuses: vec!["COMPLETED"],
            failure_reason: None,
            fail_uploads: 0,
            reject_uploads: false,
            fail_polls: 0,
            result_data_uri: false,
        }
    }
}

pub struct MockFal {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockFalState>,
}

struct MockFalState {
    addr: SocketAddr,
    options: MockFalOptions,
    upload_count: AtomicU32,
    submit_count: AtomicU32,
    poll_count: AtomicU32,
    /// Arrival time of each status poll
    poll_times: Mutex<Vec<Instant>>,
    /// `Authorization` values seen on submit, in arrival order
    keys: Mutex<Vec<String>>,
    /// Prompts seen on submit, in arrival order
    prompts: Mutex<Vec<String>>,
    /// The `image_urls` array of each submit, verbatim
    image_urls: Mutex<Vec<Vec<String>>>,
}

impl MockFal {
    /// Start a mock that completes on the first poll
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(MockFalOptions::default()).await
    }

    /// Start a mock driven by the given script
    pub async fn start_with(options: MockFalOptions) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockFalState {
            addr,
            options,
            upload_count: AtomicU32::new(0),
            submit_count: AtomicU32::new(0),
            poll_count: AtomicU32::new(0),
            poll_times: Mutex::new(Vec::new()),
            keys: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            image_urls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/upload", routing::post(handle_upload))
            .route("/requests/{id}/status", routing::get(handle_status))
            .route("/requests/{id}", routing::get(handle_result))
            .route("/files/{name}", routing::get(handle_file))
            .route("/{*model_path}", routing::post(handle_submit))
            .with_state(Arc::clone(&state));

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as both queue and storage
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn upload_count(&self) -> u32 {
        self.state.upload_count.load(Ordering::Relaxed)
    }

    pub fn submit_count(&self) -> u32 {
        self.state.submit_count.load(Ordering::Relaxed)
    }

    pub fn poll_count(&self) -> u32 {
        self.state.poll_count.load(Ordering::Relaxed)
    }

    /// Arrival times of status polls, for asserting the backoff schedule
    pub fn poll_times(&self) -> Vec<Instant> {
        self.state.poll_times.lock().unwrap().clone()
    }

    /// The `Authorization` value sent with the most recent submit
    pub fn last_key(&self) -> Option<String> {
        self.state.keys.lock().unwrap().last().cloned()
    }

    /// The prompt sent with the most recent submit
    pub fn last_prompt(&self) -> Option<String> {
        self.state.prompts.lock().unwrap().last().cloned()
    }

    /// The `image_urls` array of the most recent submit
    pub fn last_image_urls(&self) -> Option<Vec<String>> {
        self.state.image_urls.lock().unwrap().last().cloned()
    }
}

impl Drop for MockFal {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_upload(
    State(state): State<Arc<MockFalState>>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let n = state.upload_count.fetch_add(1, Ordering::Relaxed);

    if state.options.reject_uploads {
        return (StatusCode::BAD_REQUEST, "unsupported media").into_response();
    }
    if n < state.options.fail_uploads {
        return (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable").into_response();
    }

    // Derive the URL from the payload size so tests can tell uploads apart
    // regardless of arrival order.
    let url = format!("http://{}/files/input-{}", state.addr, body.len());
    Json(json!({ "url": url })).into_response()
}

async fn handle_submit(
    State(state): State<Arc<MockFalState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.submit_count.fetch_add(1, Ordering::Relaxed);

    if let Some(key) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.keys.lock().unwrap().push(key.to_owned());
    }
    if let Some(prompt) = body["prompt"].as_str() {
        state.prompts.lock().unwrap().push(prompt.to_owned());
    }
    let urls: Vec<String> = body["image_urls"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                .collect()
        })
        .unwrap_or_default();
    state.image_urls.lock().unwrap().push(urls);

    Json(json!({
        "request_id": "req-1",
        "status_url": format!("http://{}/requests/req-1/status", state.addr),
        "response_url": format!("http://{}/requests/req-1", state.addr),
    }))
}

async fn handle_status(State(state): State<Arc<MockFalState>>) -> Response {
    state.poll_times.lock().unwrap().push(Instant::now());
    let n = state.poll_count.fetch_add(1, Ordering::Relaxed) as usize;

    if n < state.options.fail_polls as usize {
        return (StatusCode::INTERNAL_SERVER_ERROR, "queue unavailable").into_response();
    }

    let index = n - state.options.fail_polls as usize;
    let statuses = &state.options.statuses;
    let status = statuses[index.min(statuses.len() - 1)];

    let mut body = json!({ "status": status });
    if status == "FAILED" {
        if let Some(reason) = state.options.failure_reason {
            body["error"] = json!(reason);
        }
    }
    Json(body).into_response()
}

async fn handle_result(State(state): State<Arc<MockFalState>>) -> Json<Value> {
    let url = if state.options.result_data_uri {
        format!("data:image/png;base64,{}", BASE64.encode(RESULT_BYTES))
    } else {
        format!("http://{}/files/result", state.addr)
    };

    Json(json!({ "images": [{ "url": url, "content_type": "image/png" }] }))
}

async fn handle_file() -> impl IntoResponse {
    ([("content-type", "image/png")], RESULT_BYTES)
}
