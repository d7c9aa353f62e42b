use secrecy::SecretString;
use stagecraft_config::EditConfig;

use crate::request::RequestContext;

/// Resolve the key to use for a provider namespace
///
/// A per-request override always wins over the process-wide configured key.
/// The result is computed fresh per call and never cached, so overrides are
/// honored even when a configured key exists.
pub(crate) fn resolve_key(
    namespace: &str,
    context: &RequestContext,
    config: &EditConfig,
) -> Option<SecretString> {
    if let Some(override_key) = context.key_override(namespace) {
        tracing::debug!(namespace, "using request-supplied API key");
        return Some(override_key.clone());
    }

    match namespace {
        "google" => config.google.api_key.clone(),
        "fal" => config.fal.api_key.clone(),
        _ => None,
    }
}
