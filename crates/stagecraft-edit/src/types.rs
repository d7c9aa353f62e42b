/// Prompt used when the caller supplies none
///
/// Must stay byte-identical to the previously published default.
pub const DEFAULT_PROMPT: &str = "Stage this room with minimalist modern furniture in neutral tones. \
     Preserve architecture and lighting; add realistic shadows and reflections.";

/// Parsed edit request from the multipart form
#[derive(Debug)]
pub struct EditRequest {
    /// Source images in upload order; order is meaningful for
    /// multi-reference providers
    pub images: Vec<Vec<u8>>,
    /// Prompt or style instructions
    pub prompt: Option<String>,
    /// Provider identifier (e.g. "google" or "fal:fal-ai/qwen-image-edit")
    pub provider: Option<String>,
}

impl EditRequest {
    /// The prompt to send upstream: trimmed caller prompt, or the default
    /// when the caller supplied none (or only whitespace)
    pub fn prompt_or_default(&self) -> String {
        self.prompt
            .as_deref()
            .map(str::trim)
            .filter(|trimmed| !trimmed.is_empty())
            .map_or_else(|| DEFAULT_PROMPT.to_string(), str::to_string)
    }
}

/// Edited image result
#[derive(Debug)]
pub struct EditOutput {
    /// Raw image bytes
    pub bytes: Vec<u8>,
    /// MIME type for the Content-Type response header
    pub mime_type: String,
}
