//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use secrecy::SecretString;
use stagecraft_config::{
    Config, EditConfig, HealthConfig, RateLimitConfig, RequestRateLimit, ServerConfig,
};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults
    ///
    /// The development fallback is off so tests fail loudly when a mock is
    /// not wired up; tests that want the fallback enable it explicitly.
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig {
                        enabled: true,
                        ..HealthConfig::default()
                    },
                    ..ServerConfig::default()
                },
                edit: EditConfig {
                    dev_fallback: false,
                    ..EditConfig::default()
                },
            },
        }
    }

    /// Point the Google provider at a mock backend with a configured key
    pub fn with_google(mut self, base_url: &str, api_key: &str) -> Self {
        self.config.edit.google.base_url = Some(base_url.to_owned());
        self.config.edit.google.api_key = Some(SecretString::from(api_key));
        self
    }

    /// Point the fal provider at a mock backend with a configured key
    ///
    /// The mock serves both the queue and storage APIs.
    pub fn with_fal(mut self, base_url: &str, api_key: Option<&str>) -> Self {
        self.config.edit.fal.queue_url = Some(base_url.to_owned());
        self.config.edit.fal.storage_url = Some(base_url.to_owned());
        self.config.edit.fal.api_key = api_key.map(SecretString::from);
        self
    }

    /// Shrink orchestrator timings so timeout tests run in milliseconds
    pub fn with_fast_orchestrator(mut self, deadline_ms: u64) -> Self {
        self.config.edit.orchestrator.initial_backoff_ms = 10;
        self.config.edit.orchestrator.upload_backoff_cap_ms = 40;
        self.config.edit.orchestrator.poll_interval_cap_ms = 50;
        self.config.edit.orchestrator.deadline_ms = deadline_ms;
        self
    }

    /// Enable the no-key development fallback
    pub fn with_dev_fallback(mut self) -> Self {
        self.config.edit.dev_fallback = true;
        self
    }

    /// Fail unknown provider identifiers instead of falling back
    pub fn with_strict_provider_lookup(mut self) -> Self {
        self.config.edit.strict_provider_lookup = true;
        self
    }

    /// Limit edit requests per client IP
    pub fn with_rate_limit(mut self, requests: u32, window: &str) -> Self {
        self.config.server.rate_limit = Some(RateLimitConfig {
            per_ip: Some(RequestRateLimit {
                requests,
                window: window.to_owned(),
            }),
        });
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
