use serde::Deserialize;

/// Rate limiting configuration
///
/// Absent section means no limiting. Only edit requests are limited;
/// listing and health endpoints stay open.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Per-IP limit on edit requests
    #[serde(default)]
    pub per_ip: Option<RequestRateLimit>,
}

/// A request-count limit over a time window
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestRateLimit {
    /// Maximum requests per window
    pub requests: u32,
    /// Window duration (e.g. "1h", "30s")
    pub window: String,
}
