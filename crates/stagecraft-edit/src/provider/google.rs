use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use stagecraft_config::GoogleProviderConfig;

use super::EditProvider;
use crate::{
    error::{EditError, Result, Stage},
    http_client::http_client,
    sniff,
    types::EditOutput,
};

/// Default Gemini API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini image editing provider
///
/// One blocking `generateContent` call per edit; the caller retries whole
/// requests, never this provider. Without a key it either returns the first
/// input unchanged (development fallback) or fails, depending on config.
#[derive(Debug)]
pub(crate) struct GoogleProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    dev_fallback: bool,
}

impl GoogleProvider {
    pub fn new(config: &GoogleProviderConfig, api_key: Option<SecretString>, dev_fallback: bool) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        if api_key.is_none() {
            tracing::warn!("google provider constructed without API key");
        }

        Self {
            client: http_client(),
            base_url,
            model: config.model.clone(),
            api_key,
            dev_fallback,
        }
    }
}

/// Wire format for the Gemini `generateContent` request
#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart {
    InlineData(InlineData),
    Text(String),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

/// Wire format for the Gemini `generateContent` response
#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    inline_data: Option<InlineData>,
    #[serde(default)]
    #[allow(dead_code)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// First inline image part, if the model returned one
    fn first_image(self) -> Option<InlineData> {
        self.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|content| content.parts)
            .find_map(|part| part.inline_data)
    }
}

#[async_trait]
impl EditProvider for GoogleProvider {
    async fn edit(&self, images: &[Vec<u8>], prompt: &str) -> Result<EditOutput> {
        let Some(api_key) = self.api_key.as_ref() else {
            if self.dev_fallback {
                tracing::warn!("google provider fallback: no API key; returning original image");
                let original = images[0].clone();
                let mime_type = sniff::sniff_mime_or_png(&original).to_string();
                return Ok(EditOutput { bytes: original, mime_type });
            }
            return Err(EditError::Config(
                "Google provider requires an API key and the development fallback is disabled".to_string(),
            ));
        };

        let mut parts = Vec::with_capacity(images.len() + 1);
        for image in images {
            let mime_type = sniff::sniff_mime(image).ok_or_else(|| {
                EditError::InvalidImageFormat("input does not look like a supported image".to_string())
            })?;
            parts.push(RequestPart::InlineData(InlineData {
                mime_type: mime_type.to_string(),
                data: BASE64.encode(image),
            }));
        }
        parts.push(RequestPart::Text(prompt.to_string()));

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        tracing::debug!(
            model = %self.model,
            image_count = images.len(),
            "sending Gemini edit request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&GenerateContentRequest {
                contents: vec![Content { parts }],
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gemini request failed");
                EditError::AiService {
                    stage: Stage::Request,
                    status: None,
                    message: format!("Failed to send request to Gemini: {e}"),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status = %status, "Gemini API error");
            return Err(EditError::ai_service(Stage::Request, Some(status.as_u16()), &error_text));
        }

        let wire: GenerateContentResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Gemini response");
            EditError::Internal(None)
        })?;

        let image = wire.first_image().ok_or_else(|| EditError::AiService {
            stage: Stage::Request,
            status: None,
            message: "no image returned by Gemini".to_string(),
        })?;

        let bytes = BASE64.decode(image.data.as_bytes()).map_err(|e| EditError::AiService {
            stage: Stage::Request,
            status: None,
            message: format!("invalid base64 image data in Gemini response: {e}"),
        })?;

        tracing::debug!(result_size = bytes.len(), "Gemini edit complete");

        Ok(EditOutput {
            mime_type: if image.mime_type.is_empty() {
                sniff::sniff_mime_or_png(&bytes).to_string()
            } else {
                image.mime_type
            },
            bytes,
        })
    }

    fn name(&self) -> &str {
        "google"
    }
}
