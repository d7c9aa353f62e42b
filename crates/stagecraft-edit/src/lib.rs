#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

mod backoff;
mod credentials;
mod error;
mod http_client;
mod provider;
mod registry;
mod request;
mod server;
mod sniff;
mod types;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};

pub use error::{EditError, Result, Stage};
pub use request::RequestContext;
pub use server::Server;
pub use types::{DEFAULT_PROMPT, EditOutput, EditRequest};
use request::ExtractMultipart;
use server::EditServerBuilder;

/// Build the edit server from configuration
///
/// # Errors
///
/// Returns an error if the server fails to initialize
pub fn build_server(config: &stagecraft_config::Config) -> anyhow::Result<Arc<Server>> {
    let server = Arc::new(
        EditServerBuilder::new(config)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to initialize edit server: {e}"))?,
    );
    Ok(server)
}

/// Create the endpoint router for image editing
pub fn endpoint_router() -> Router<Arc<Server>> {
    Router::new()
        .route("/api/edit", post(edit))
        .route("/api/providers", get(providers))
}

/// Handle edit requests
///
/// The response body is the edited image verbatim, with its media type in
/// the `Content-Type` header.
async fn edit(
    State(server): State<Arc<Server>>,
    ExtractMultipart(context, request): ExtractMultipart,
) -> Result<Response> {
    tracing::debug!(
        provider = request.provider.as_deref().unwrap_or("<default>"),
        "edit handler called"
    );

    let output = server.edit(request, &context).await?;

    tracing::debug!("edit complete");

    Ok(([(header::CONTENT_TYPE, output.mime_type)], output.bytes).into_response())
}

/// Handle provider listing requests
async fn providers(State(server): State<Arc<Server>>) -> Json<Vec<String>> {
    Json(server.providers())
}
