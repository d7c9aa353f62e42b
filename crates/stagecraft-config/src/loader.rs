use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let expanded = crate::env::expand_env(&raw)
            .map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self =
            toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestrator timing values are degenerate or
    /// the default provider is empty
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.edit.default_provider.trim().is_empty() {
            anyhow::bail!("edit.default_provider must not be empty");
        }

        let orchestrator = &self.edit.orchestrator;
        if orchestrator.upload_attempts == 0 {
            anyhow::bail!("edit.orchestrator.upload_attempts must be at least 1");
        }
        if orchestrator.deadline_ms == 0 {
            anyhow::bail!("edit.orchestrator.deadline_ms must be greater than 0");
        }
        if orchestrator.initial_backoff_ms == 0 {
            anyhow::bail!("edit.orchestrator.initial_backoff_ms must be greater than 0");
        }

        if self.edit.google.api_key.is_none() && self.edit.fal.api_key.is_none() {
            tracing::warn!(
                "no provider API keys configured; requests without key overrides will use the development fallback or fail"
            );
        }

        Ok(())
    }
}
