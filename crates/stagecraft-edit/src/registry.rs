use std::sync::Arc;

use stagecraft_config::EditConfig;

use crate::{
    credentials::resolve_key,
    error::{EditError, Result},
    provider::{EditProvider, fal::FalProvider, google::GoogleProvider},
    request::RequestContext,
};

/// Static provider names resolvable without a namespace
///
/// `nano-banana` is the historical alias for the Gemini image model and maps
/// to the same provider as `google`.
const STATIC_NAMES: &[&str] = &["google", "nano-banana"];

/// Namespace for dynamic fal.ai queue identifiers
const FAL_NAMESPACE: &str = "fal";

/// Illustrative dynamic identifiers advertised by `list()`
///
/// Any `fal:<model-path>` is accepted; these are known-good model paths a
/// caller can use verbatim.
const SAMPLE_DYNAMIC_IDS: &[&str] = &["fal:fal-ai/flux/dev", "fal:fal-ai/nano-banana/edit"];

/// A parsed provider identifier
///
/// Identifiers are either a bare static name (`google`) or a namespaced
/// dynamic pair (`fal:acme/model-x`). Names and namespaces are
/// case-insensitive; the model path is preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProviderId {
    Static(String),
    Dynamic { namespace: String, model_path: String },
}

impl ProviderId {
    pub(crate) fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.split_once(':') {
            Some((namespace, model_path)) => Self::Dynamic {
                namespace: namespace.trim().to_ascii_lowercase(),
                model_path: model_path.trim().to_string(),
            },
            None => Self::Static(trimmed.to_ascii_lowercase()),
        }
    }
}

/// Resolves provider identifiers to ready-to-call provider instances
///
/// Providers are built per request because the credential may come from a
/// request header; construction is cheap (the HTTP client is shared).
pub(crate) struct ProviderRegistry {
    config: Arc<EditConfig>,
}

impl ProviderRegistry {
    pub(crate) const fn new(config: Arc<EditConfig>) -> Self {
        Self { config }
    }

    /// Resolve the requested identifier, or the configured default when the
    /// request names none
    ///
    /// Unrecognized identifiers fall back to the default provider unless
    /// strict lookup is configured, in which case they fail with not-found.
    pub(crate) fn resolve(
        &self,
        requested: Option<&str>,
        context: &RequestContext,
    ) -> Result<Box<dyn EditProvider>> {
        let raw = requested
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.config.default_provider);

        match ProviderId::parse(raw) {
            ProviderId::Dynamic { namespace, model_path } if namespace == FAL_NAMESPACE => {
                if model_path.is_empty() {
                    return Err(EditError::ProviderNotFound(raw.to_string()));
                }
                Ok(self.fal(model_path, context))
            }
            ProviderId::Static(name) if STATIC_NAMES.contains(&name.as_str()) => {
                Ok(self.google(context))
            }
            _ => self.unrecognized(raw, context),
        }
    }

    /// Identifiers this registry accepts, sorted and stable across calls
    ///
    /// Static names plus a few resolvable dynamic examples; any other
    /// `fal:<model-path>` works too.
    pub(crate) fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = STATIC_NAMES
            .iter()
            .chain(SAMPLE_DYNAMIC_IDS)
            .map(ToString::to_string)
            .collect();
        names.sort();
        names
    }

    fn google(&self, context: &RequestContext) -> Box<dyn EditProvider> {
        let key = resolve_key("google", context, &self.config);
        Box::new(GoogleProvider::new(
            &self.config.google,
            key,
            self.config.dev_fallback,
        ))
    }

    fn fal(&self, model_path: String, context: &RequestContext) -> Box<dyn EditProvider> {
        let key = resolve_key(FAL_NAMESPACE, context, &self.config);
        Box::new(FalProvider::new(
            &self.config.fal,
            &self.config.orchestrator,
            format!("{FAL_NAMESPACE}:{model_path}"),
            model_path,
            key,
        ))
    }

    fn unrecognized(&self, raw: &str, context: &RequestContext) -> Result<Box<dyn EditProvider>> {
        if self.config.strict_provider_lookup {
            return Err(EditError::ProviderNotFound(raw.to_string()));
        }

        tracing::warn!(
            requested = raw,
            default = %self.config.default_provider,
            "unrecognized provider; using default"
        );

        // Build the default directly rather than re-resolving, so a
        // misconfigured default cannot loop.
        match ProviderId::parse(&self.config.default_provider) {
            ProviderId::Static(name) if STATIC_NAMES.contains(&name.as_str()) => {
                Ok(self.google(context))
            }
            ProviderId::Dynamic { namespace, model_path }
                if namespace == FAL_NAMESPACE && !model_path.is_empty() =>
            {
                Ok(self.fal(model_path, context))
            }
            _ => Err(EditError::Config(format!(
                "default provider '{}' is not a recognized identifier",
                self.config.default_provider
            ))),
        }
    }
}
