use std::collections::HashMap;

use axum::body::Body;
use secrecy::SecretString;

use crate::types::EditRequest;

/// Header carrying a per-request key for the `google` namespace
const GOOGLE_KEY_HEADER: &str = "x-google-api-key";

/// Header carrying a per-request key for the `fal` namespace
const FAL_KEY_HEADER: &str = "x-fal-key";

/// Body limit for image uploads (32 MiB)
const BODY_LIMIT_BYTES: usize = 32 << 20;

/// Runtime context for one edit request
///
/// Carries the per-namespace credential overrides extracted from request
/// headers. Overrides live only for the duration of the request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    key_overrides: HashMap<String, SecretString>,
}

impl RequestContext {
    /// Context with no overrides, for embedded and test use
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a context from request headers
    pub fn from_headers(headers: &http::HeaderMap) -> Self {
        let mut key_overrides = HashMap::new();

        for (header, namespace) in [(GOOGLE_KEY_HEADER, "google"), (FAL_KEY_HEADER, "fal")] {
            if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
                key_overrides.insert(namespace.to_string(), SecretString::from(value));
            }
        }

        Self { key_overrides }
    }

    /// Set an override directly (test and embedded use)
    pub fn with_key_override(mut self, namespace: &str, key: SecretString) -> Self {
        self.key_overrides.insert(namespace.to_string(), key);
        self
    }

    /// The caller-supplied key for a namespace, if any
    pub fn key_override(&self, namespace: &str) -> Option<&SecretString> {
        self.key_overrides.get(namespace)
    }
}

/// Extractor for multipart form data containing source images
pub struct ExtractMultipart(pub RequestContext, pub EditRequest);

impl<S> axum::extract::FromRequest<S> for ExtractMultipart
where
    S: Send + Sync,
{
    type Rejection = axum::response::Response;

    async fn from_request(request: http::Request<Body>, _state: &S) -> Result<Self, Self::Rejection> {
        use axum::response::IntoResponse;

        let (parts, body) = request.into_parts();

        let content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !content_type.starts_with("multipart/form-data") {
            return Err((
                axum::http::StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Unsupported Content-Type, expected: 'Content-Type: multipart/form-data'",
            )
                .into_response());
        }

        let bytes = axum::body::to_bytes(body, BODY_LIMIT_BYTES).await.map_err(|err| {
            (
                axum::http::StatusCode::BAD_REQUEST,
                format!("Failed to read request body: {err}"),
            )
                .into_response()
        })?;

        // Reassemble the request for multipart parsing
        let mut rebuilt = http::Request::builder()
            .method(parts.method.clone())
            .uri(parts.uri.clone());

        for (key, value) in &parts.headers {
            rebuilt = rebuilt.header(key, value);
        }

        let rebuilt = rebuilt.body(Body::from(bytes)).map_err(|e| {
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to rebuild request: {e}"),
            )
                .into_response()
        })?;

        let mut multipart = axum::extract::Multipart::from_request(rebuilt, &())
            .await
            .map_err(|e| {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    format!("Failed to parse multipart form: {e}"),
                )
                    .into_response()
            })?;

        let mut images: Vec<Vec<u8>> = Vec::new();
        let mut prompt: Option<String> = None;
        let mut provider: Option<String> = None;

        while let Ok(Some(field)) = multipart.next_field().await {
            let field_name = field.name().unwrap_or("").to_string();

            match field_name.as_str() {
                "image" | "images" => {
                    let data = field.bytes().await.map_err(|e| {
                        (
                            axum::http::StatusCode::BAD_REQUEST,
                            format!("Failed to read image data: {e}"),
                        )
                            .into_response()
                    })?;

                    // Browsers submit an empty part for unset file inputs
                    if !data.is_empty() {
                        images.push(data.to_vec());
                    }
                }
                "prompt" => {
                    let text = field.text().await.map_err(|e| {
                        (
                            axum::http::StatusCode::BAD_REQUEST,
                            format!("Failed to read prompt field: {e}"),
                        )
                            .into_response()
                    })?;
                    if !text.trim().is_empty() {
                        prompt = Some(text);
                    }
                }
                "provider" => {
                    let text = field.text().await.map_err(|e| {
                        (
                            axum::http::StatusCode::BAD_REQUEST,
                            format!("Failed to read provider field: {e}"),
                        )
                            .into_response()
                    })?;
                    if !text.trim().is_empty() {
                        provider = Some(text);
                    }
                }
                _ => {
                    tracing::debug!(field = %field_name, "ignoring unknown multipart field");
                }
            }
        }

        let context = RequestContext::from_headers(&parts.headers);

        Ok(Self(context, EditRequest { images, prompt, provider }))
    }
}
