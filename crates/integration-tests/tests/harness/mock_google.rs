//! Mock Gemini backend for integration tests
//!
//! Implements just enough of `generateContent` to answer edit requests with
//! a canned image, recording what the gateway sent.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Json, Router, routing};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Canned image the mock hands back for every edit
pub const RESULT_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nedited-by-mock-gemini";

pub struct MockGoogle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockGoogleState>,
}

struct MockGoogleState {
    request_count: AtomicU32,
    /// `x-goog-api-key` values seen, in arrival order
    keys: Mutex<Vec<String>>,
    /// Text prompts seen, in arrival order
    prompts: Mutex<Vec<String>>,
}

impl MockGoogle {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockGoogleState {
            request_count: AtomicU32::new(0),
            keys: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/models/{model}", routing::post(handle_generate))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
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

    /// Base URL for configuring the mock as the Gemini endpoint
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of generate requests received
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// The API key sent with the most recent request
    pub fn last_key(&self) -> Option<String> {
        self.state.keys.lock().unwrap().last().cloned()
    }

    /// The prompt sent with the most recent request
    pub fn last_prompt(&self) -> Option<String> {
        self.state.prompts.lock().unwrap().last().cloned()
    }
}

impl Drop for MockGoogle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_generate(
    State(state): State<Arc<MockGoogleState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    if let Some(key) = headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) {
        state.keys.lock().unwrap().push(key.to_owned());
    }

    let prompt = body["contents"][0]["parts"]
        .as_array()
        .and_then(|parts| parts.iter().find_map(|part| part["text"].as_str()))
        .unwrap_or_default();
    state.prompts.lock().unwrap().push(prompt.to_owned());

    Json(json!({
        "candidates": [{
            "content": {
                "parts": [{
                    "inlineData": {
                        "mimeType": "image/png",
                        "data": BASE64.encode(RESULT_BYTES),
                    }
                }]
            }
        }]
    }))
}
