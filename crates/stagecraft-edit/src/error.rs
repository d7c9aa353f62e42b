use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EditError>;

/// Longest remote error excerpt carried into a client-visible message
const REMOTE_MESSAGE_LIMIT: usize = 200;

/// Orchestration stage at which a remote call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Single-shot provider request
    Request,
    /// Image upload to provider storage
    Upload,
    /// Job submission to the provider queue
    Submit,
    /// Job status polling
    Poll,
    /// Result download
    Download,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Request => "request",
            Self::Upload => "upload",
            Self::Submit => "submit",
            Self::Poll => "poll",
            Self::Download => "download",
        };
        f.write_str(name)
    }
}

/// Image editing errors with appropriate HTTP status codes
#[derive(Debug, Error)]
pub enum EditError {
    /// Invalid request parameters (missing images, bad fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An input buffer does not decode as an image
    #[error("Invalid image format: {0}")]
    InvalidImageFormat(String),

    /// Provider identifier not recognized (strict lookup only)
    #[error("Provider '{0}' not found")]
    ProviderNotFound(String),

    /// Remote AI service failure, tagged with the failing stage
    #[error("AI service error during {stage}: {message}")]
    AiService {
        stage: Stage,
        status: Option<u16>,
        message: String,
    },

    /// Missing or unusable provider configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Asynchronous run exceeded its deadline
    #[error("AI job exceeded deadline of {deadline:?}")]
    TimedOut { deadline: Duration },

    /// Internal server error
    /// If Some(message), it came from a provider and can be shown
    /// If None, details must not leak
    #[error("Internal server error")]
    Internal(Option<String>),
}

impl EditError {
    /// Build an `AiService` error from a remote response, reducing the body
    /// to a short excerpt so credentials or large payloads never surface
    pub fn ai_service(stage: Stage, status: Option<u16>, body: &str) -> Self {
        Self::AiService {
            stage,
            status,
            message: truncate_remote(body),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidImageFormat(_) => StatusCode::BAD_REQUEST,
            Self::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            Self::AiService { .. } => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Get the error type string for the response
    pub fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::InvalidImageFormat(_) => "invalid_image_error",
            Self::ProviderNotFound(_) => "not_found_error",
            Self::AiService { .. } => "ai_service_error",
            Self::Config(_) => "config_error",
            Self::TimedOut { .. } => "timeout_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message that is safe to expose to API consumers
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(Some(provider_msg)) => provider_msg.clone(),
            Self::Internal(None) => "Internal server error".to_string(),
            Self::AiService { stage, status, message } => match status {
                Some(code) => format!("AI service error during {stage} (HTTP {code}): {message}"),
                None => format!("AI service error during {stage}: {message}"),
            },
            _ => self.to_string(),
        }
    }
}

/// Reduce a remote response body to a short single-line excerpt
fn truncate_remote(body: &str) -> String {
    let flattened = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.len() <= REMOTE_MESSAGE_LIMIT {
        flattened
    } else {
        let mut cut = REMOTE_MESSAGE_LIMIT;
        while !flattened.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &flattened[..cut])
    }
}

/// JSON error body: `detail` matches the previously published API shape
#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for EditError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match status {
            StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = ?self, "request failed");
            }
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                tracing::warn!(error = %self, "client error");
            }
            _ => {
                tracing::info!(error = %self, "upstream error");
            }
        }

        let body = ErrorResponse {
            detail: self.client_message(),
            r#type: self.error_type().to_string(),
            code: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}
