use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::future::try_join_all;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use stagecraft_config::{FalProviderConfig, OrchestratorConfig};
use tokio::time::Instant;

use super::EditProvider;
use crate::{
    backoff::Backoff,
    error::{EditError, Result, Stage},
    http_client::http_client,
    sniff,
    types::EditOutput,
};

/// Default fal.ai queue base URL
const DEFAULT_QUEUE_URL: &str = "https://queue.fal.run";

/// Default fal.ai storage base URL for image uploads
const DEFAULT_STORAGE_URL: &str = "https://rest.alpha.fal.ai/storage";

/// Consecutive status-poll transport failures tolerated before the run fails
const MAX_CONSECUTIVE_POLL_FAILURES: u32 = 3;

/// fal.ai queue provider
///
/// One edit is a full queue run: upload every input image, submit a job
/// against the model path, poll until it settles, download the result.
/// Every remote call happens before the run's deadline; once the deadline
/// passes the run stops without issuing further requests.
#[derive(Debug)]
pub(crate) struct FalProvider {
    client: Client,
    /// Full identifier the request used, e.g. `fal:acme/model-x`
    identifier: String,
    /// Model path within the queue, e.g. `acme/model-x`
    model_path: String,
    queue_url: String,
    storage_url: String,
    api_key: Option<SecretString>,
    orchestrator: OrchestratorConfig,
}

/// Lifecycle of one queue run, logged at every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobState {
    Uploading,
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uploading => "uploading",
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// Tracks the wall-clock budget of one run
///
/// `check` fails once the deadline has passed; `sleep` never waits beyond
/// it, so no remote call is ever issued after expiry.
struct RunClock {
    deadline_at: Instant,
    deadline: std::time::Duration,
}

impl RunClock {
    fn start(orchestrator: &OrchestratorConfig) -> Self {
        let deadline = orchestrator.deadline();
        Self {
            deadline_at: Instant::now() + deadline,
            deadline,
        }
    }

    fn check(&self) -> Result<()> {
        if Instant::now() >= self.deadline_at {
            return Err(EditError::TimedOut { deadline: self.deadline });
        }
        Ok(())
    }

    async fn sleep(&self, delay: std::time::Duration) -> Result<()> {
        let remaining = self.deadline_at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(EditError::TimedOut { deadline: self.deadline });
        }
        tokio::time::sleep(delay.min(remaining)).await;
        self.check()
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    prompt: &'a str,
    image_urls: Vec<String>,
}

/// Handle to a queued job, as returned by the submit call
#[derive(Debug, Deserialize)]
struct JobHandle {
    request_id: String,
    #[serde(default)]
    status_url: Option<String>,
    #[serde(default)]
    response_url: Option<String>,
}

impl JobHandle {
    fn status_url(&self, queue_url: &str, model_path: &str) -> String {
        self.status_url.clone().unwrap_or_else(|| {
            format!("{queue_url}/{model_path}/requests/{}/status", self.request_id)
        })
    }

    fn response_url(&self, queue_url: &str, model_path: &str) -> String {
        self.response_url
            .clone()
            .unwrap_or_else(|| format!("{queue_url}/{model_path}/requests/{}", self.request_id))
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct QueueResult {
    #[serde(default)]
    images: Vec<ResultImage>,
}

#[derive(Deserialize)]
struct ResultImage {
    url: String,
    #[serde(default)]
    content_type: Option<String>,
}

/// Upload failures split into retry classes
enum UploadFailure {
    /// Network error or 5xx; worth another attempt
    Transient(String),
    /// 4xx or malformed response; retrying cannot help
    Permanent(EditError),
}

impl FalProvider {
    pub fn new(
        config: &FalProviderConfig,
        orchestrator: &OrchestratorConfig,
        identifier: String,
        model_path: String,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            client: http_client(),
            identifier,
            model_path,
            queue_url: trim_base(config.queue_url.as_deref().unwrap_or(DEFAULT_QUEUE_URL)),
            storage_url: trim_base(config.storage_url.as_deref().unwrap_or(DEFAULT_STORAGE_URL)),
            api_key,
            orchestrator: orchestrator.clone(),
        }
    }

    fn auth_header(key: &SecretString) -> String {
        format!("Key {}", key.expose_secret())
    }

    /// Upload one image, retrying transient failures on the backoff schedule
    async fn upload_image(&self, key: &SecretString, image: &[u8], clock: &RunClock) -> Result<String> {
        let mut backoff = Backoff::new(
            self.orchestrator.initial_backoff(),
            self.orchestrator.upload_backoff_cap(),
        );
        let mut attempt = 1u32;

        loop {
            clock.check()?;
            match self.try_upload(key, image).await {
                Ok(url) => return Ok(url),
                Err(UploadFailure::Transient(reason)) if attempt < self.orchestrator.upload_attempts => {
                    tracing::warn!(attempt, reason, "image upload failed; retrying");
                    clock.sleep(backoff.next_delay()).await?;
                    attempt += 1;
                }
                Err(UploadFailure::Transient(reason)) => {
                    return Err(EditError::ai_service(Stage::Upload, None, &reason));
                }
                Err(UploadFailure::Permanent(err)) => return Err(err),
            }
        }
    }

    async fn try_upload(
        &self,
        key: &SecretString,
        image: &[u8],
    ) -> std::result::Result<String, UploadFailure> {
        let mime_type = sniff::sniff_mime_or_png(image);

        let response = self
            .client
            .post(format!("{}/upload", self.storage_url))
            .header("Authorization", Self::auth_header(key))
            .header("Content-Type", mime_type)
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| UploadFailure::Transient(format!("upload request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadFailure::Transient(format!("storage returned {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadFailure::Permanent(EditError::ai_service(
                Stage::Upload,
                Some(status.as_u16()),
                &body,
            )));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadFailure::Permanent(EditError::ai_service(
                Stage::Upload,
                None,
                &format!("malformed upload response: {e}"),
            )))?;

        Ok(upload.url)
    }

    async fn submit(
        &self,
        key: &SecretString,
        prompt: &str,
        image_urls: Vec<String>,
    ) -> Result<JobHandle> {
        let url = format!("{}/{}", self.queue_url, self.model_path);

        let response = self
            .client
            .post(&url)
            .header("Authorization", Self::auth_header(key))
            .json(&SubmitRequest { prompt, image_urls })
            .send()
            .await
            .map_err(|e| EditError::AiService {
                stage: Stage::Submit,
                status: None,
                message: format!("job submission failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EditError::ai_service(Stage::Submit, Some(status.as_u16()), &body));
        }

        response.json().await.map_err(|e| EditError::AiService {
            stage: Stage::Submit,
            status: None,
            message: format!("malformed submit response: {e}"),
        })
    }

    /// Poll the job until it settles or the run's deadline passes
    ///
    /// Transport failures (network errors, 5xx) are tolerated up to
    /// `MAX_CONSECUTIVE_POLL_FAILURES` in a row; a successful poll resets
    /// the count.
    async fn poll(&self, key: &SecretString, status_url: &str, clock: &RunClock) -> Result<()> {
        let mut backoff = Backoff::new(
            self.orchestrator.initial_backoff(),
            self.orchestrator.poll_interval_cap(),
        );
        let mut transport_failures = 0u32;

        loop {
            clock.check()?;

            let response = self
                .client
                .get(status_url)
                .header("Authorization", Self::auth_header(key))
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_client_error() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(EditError::ai_service(Stage::Poll, Some(status.as_u16()), &body));
                    }
                    if !status.is_success() {
                        transport_failures += 1;
                        if transport_failures >= MAX_CONSECUTIVE_POLL_FAILURES {
                            let body = response.text().await.unwrap_or_default();
                            return Err(EditError::ai_service(Stage::Poll, Some(status.as_u16()), &body));
                        }
                        tracing::warn!(status = %status, transport_failures, "status poll failed; will retry");
                    } else {
                        transport_failures = 0;
                        let parsed: StatusResponse = response.json().await.map_err(|e| {
                            EditError::AiService {
                                stage: Stage::Poll,
                                status: None,
                                message: format!("malformed status response: {e}"),
                            }
                        })?;

                        match parsed.status.as_str() {
                            "COMPLETED" => return Ok(()),
                            "FAILED" | "ERROR" => {
                                let reason = parsed.error.unwrap_or_else(|| "job failed".to_string());
                                tracing::info!(state = %JobState::Failed, reason, "fal job failed");
                                return Err(EditError::ai_service(Stage::Poll, None, &reason));
                            }
                            "IN_QUEUE" | "IN_PROGRESS" => {}
                            other => {
                                tracing::warn!(status = other, "unrecognized job status; treating as in progress");
                            }
                        }
                    }
                }
                Err(e) => {
                    transport_failures += 1;
                    if transport_failures >= MAX_CONSECUTIVE_POLL_FAILURES {
                        return Err(EditError::AiService {
                            stage: Stage::Poll,
                            status: None,
                            message: format!("status poll failed repeatedly: {e}"),
                        });
                    }
                    tracing::warn!(error = %e, transport_failures, "status poll request failed; will retry");
                }
            }

            clock.sleep(backoff.next_delay()).await?;
        }
    }

    async fn fetch_result(&self, key: &SecretString, response_url: &str, clock: &RunClock) -> Result<EditOutput> {
        clock.check()?;

        let response = self
            .client
            .get(response_url)
            .header("Authorization", Self::auth_header(key))
            .send()
            .await
            .map_err(|e| EditError::AiService {
                stage: Stage::Download,
                status: None,
                message: format!("result fetch failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EditError::ai_service(Stage::Download, Some(status.as_u16()), &body));
        }

        let result: QueueResult = response.json().await.map_err(|e| EditError::AiService {
            stage: Stage::Download,
            status: None,
            message: format!("malformed result payload: {e}"),
        })?;

        let image = result.images.into_iter().next().ok_or_else(|| EditError::AiService {
            stage: Stage::Download,
            status: None,
            message: "job completed without an output image".to_string(),
        })?;

        if image.url.starts_with("data:") {
            return decode_data_uri(&image.url);
        }

        clock.check()?;
        self.download_image(key, &image).await
    }

    async fn download_image(&self, key: &SecretString, image: &ResultImage) -> Result<EditOutput> {
        let response = self
            .client
            .get(&image.url)
            .header("Authorization", Self::auth_header(key))
            .send()
            .await
            .map_err(|e| EditError::AiService {
                stage: Stage::Download,
                status: None,
                message: format!("image download failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EditError::ai_service(Stage::Download, Some(status.as_u16()), &body));
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EditError::AiService {
                stage: Stage::Download,
                status: None,
                message: format!("image download interrupted: {e}"),
            })?
            .to_vec();

        let mime_type = image
            .content_type
            .clone()
            .or(header_mime)
            .filter(|m| m.starts_with("image/"))
            .unwrap_or_else(|| sniff::sniff_mime_or_png(&bytes).to_string());

        Ok(EditOutput { bytes, mime_type })
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Decode a `data:<mime>;base64,<payload>` URI into image bytes
fn decode_data_uri(uri: &str) -> Result<EditOutput> {
    let stripped = uri.strip_prefix("data:").unwrap_or(uri);
    let (header, payload) = stripped.split_once(',').ok_or_else(|| EditError::AiService {
        stage: Stage::Download,
        status: None,
        message: "malformed data URI in result".to_string(),
    })?;

    if !header.ends_with(";base64") {
        return Err(EditError::AiService {
            stage: Stage::Download,
            status: None,
            message: "data URI in result is not base64 encoded".to_string(),
        });
    }

    let bytes = BASE64.decode(payload.as_bytes()).map_err(|e| EditError::AiService {
        stage: Stage::Download,
        status: None,
        message: format!("invalid base64 in result data URI: {e}"),
    })?;

    let declared = header.trim_end_matches(";base64");
    let mime_type = if declared.starts_with("image/") {
        declared.to_string()
    } else {
        sniff::sniff_mime_or_png(&bytes).to_string()
    };

    Ok(EditOutput { bytes, mime_type })
}

#[async_trait]
impl EditProvider for FalProvider {
    async fn edit(&self, images: &[Vec<u8>], prompt: &str) -> Result<EditOutput> {
        // No credential means no run at all; there is no anonymous queue
        // access and no development fallback for queued jobs.
        let Some(key) = self.api_key.clone() else {
            return Err(EditError::Config(
                "fal provider requires an API key (configure one or send the x-fal-key header)".to_string(),
            ));
        };

        let clock = RunClock::start(&self.orchestrator);

        tracing::info!(
            model_path = %self.model_path,
            image_count = images.len(),
            state = %JobState::Uploading,
            "starting fal queue run"
        );

        let image_urls = try_join_all(
            images.iter().map(|image| self.upload_image(&key, image, &clock)),
        )
        .await
        .inspect_err(|_| tracing::info!(state = %JobState::Failed, "fal run aborted during upload"))?;

        clock.check()?;
        let handle = self.submit(&key, prompt, image_urls).await?;

        tracing::info!(
            request_id = %handle.request_id,
            state = %JobState::Submitted,
            "fal job submitted"
        );

        let status_url = handle.status_url(&self.queue_url, &self.model_path);
        let response_url = handle.response_url(&self.queue_url, &self.model_path);

        tracing::debug!(state = %JobState::Polling, "polling fal job status");
        self.poll(&key, &status_url, &clock).await.inspect_err(|err| {
            if matches!(err, EditError::TimedOut { .. }) {
                tracing::warn!(
                    request_id = %handle.request_id,
                    state = %JobState::TimedOut,
                    "fal job exceeded deadline"
                );
            }
        })?;

        let output = self.fetch_result(&key, &response_url, &clock).await?;

        tracing::info!(
            request_id = %handle.request_id,
            state = %JobState::Completed,
            result_size = output.bytes.len(),
            "fal job complete"
        );

        Ok(output)
    }

    fn name(&self) -> &str {
        &self.identifier
    }
}
