use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// Image editing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditConfig {
    /// Provider used when the request names none (or names an unknown one)
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Fail unrecognized provider identifiers with 404 instead of falling
    /// back to the default provider
    #[serde(default)]
    pub strict_provider_lookup: bool,
    /// When the synchronous provider has no credential, return the original
    /// image unchanged instead of failing
    #[serde(default = "default_dev_fallback")]
    pub dev_fallback: bool,
    /// Retry, backoff, and deadline tuning for asynchronous jobs
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Google Gemini provider settings
    #[serde(default)]
    pub google: GoogleProviderConfig,
    /// fal.ai queue provider settings
    #[serde(default)]
    pub fal: FalProviderConfig,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            strict_provider_lookup: false,
            dev_fallback: default_dev_fallback(),
            orchestrator: OrchestratorConfig::default(),
            google: GoogleProviderConfig::default(),
            fal: FalProviderConfig::default(),
        }
    }
}

fn default_provider() -> String {
    "google".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_dev_fallback() -> bool {
    true
}

/// Timing knobs for one asynchronous orchestration run
///
/// Every value is overridable so tests can shrink the clock.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Attempts per image upload before the run fails
    #[serde(default = "default_upload_attempts")]
    pub upload_attempts: u32,
    /// First retry/poll delay in milliseconds; doubles each attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound on upload retry delay in milliseconds
    #[serde(default = "default_upload_backoff_cap_ms")]
    pub upload_backoff_cap_ms: u64,
    /// Upper bound on the poll interval in milliseconds
    #[serde(default = "default_poll_interval_cap_ms")]
    pub poll_interval_cap_ms: u64,
    /// Hard wall-clock deadline for one run in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            upload_attempts: default_upload_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            upload_backoff_cap_ms: default_upload_backoff_cap_ms(),
            poll_interval_cap_ms: default_poll_interval_cap_ms(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// First retry/poll delay
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Upper bound on upload retry delay
    pub const fn upload_backoff_cap(&self) -> Duration {
        Duration::from_millis(self.upload_backoff_cap_ms)
    }

    /// Upper bound on the poll interval
    pub const fn poll_interval_cap(&self) -> Duration {
        Duration::from_millis(self.poll_interval_cap_ms)
    }

    /// Hard wall-clock deadline for one run
    pub const fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

const fn default_upload_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_upload_backoff_cap_ms() -> u64 {
    2_000
}

const fn default_poll_interval_cap_ms() -> u64 {
    5_000
}

const fn default_deadline_ms() -> u64 {
    60_000
}

/// Configuration for the Google Gemini provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleProviderConfig {
    /// API key; absent means the development fallback applies
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Model identifier
    #[serde(default = "default_google_model")]
    pub model: String,
    /// Base URL override (tests point this at a mock)
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for GoogleProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_google_model(),
            base_url: None,
        }
    }
}

fn default_google_model() -> String {
    "gemini-2.5-flash-image-preview".to_string()
}

/// Configuration for the fal.ai queue provider
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FalProviderConfig {
    /// API key; required for any `fal:` identifier
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Queue base URL override (tests point this at a mock)
    #[serde(default)]
    pub queue_url: Option<String>,
    /// Storage base URL override for image uploads
    #[serde(default)]
    pub storage_url: Option<String>,
}
