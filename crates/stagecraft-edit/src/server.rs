use std::sync::Arc;

use crate::{
    error::EditError,
    registry::ProviderRegistry,
    request::RequestContext,
    sniff,
    types::{EditOutput, EditRequest},
};

/// Edit server that routes requests to the appropriate provider
pub struct Server {
    registry: ProviderRegistry,
}

impl Server {
    /// Edit images using the provider named by the request
    ///
    /// Validates the inputs before any provider work: every request needs at
    /// least one image and every buffer must look like a supported format.
    pub(crate) async fn edit(
        &self,
        request: EditRequest,
        context: &RequestContext,
    ) -> crate::error::Result<EditOutput> {
        if request.images.is_empty() {
            return Err(EditError::InvalidRequest(
                "at least one image is required".to_string(),
            ));
        }

        for (index, image) in request.images.iter().enumerate() {
            if image.is_empty() {
                return Err(EditError::InvalidRequest(format!("image {index} is empty")));
            }
            if sniff::sniff_mime(image).is_none() {
                return Err(EditError::InvalidImageFormat(format!(
                    "image {index} is not a recognized image format"
                )));
            }
        }

        let prompt = request.prompt_or_default();
        let provider = self.registry.resolve(request.provider.as_deref(), context)?;

        tracing::debug!(
            provider = provider.name(),
            image_count = request.images.len(),
            "dispatching edit request"
        );

        provider.edit(&request.images, &prompt).await
    }

    /// Provider identifiers this server accepts
    pub(crate) fn providers(&self) -> Vec<String> {
        self.registry.list()
    }
}

/// Builder for constructing the edit server from configuration
pub(crate) struct EditServerBuilder<'a> {
    config: &'a stagecraft_config::Config,
}

impl<'a> EditServerBuilder<'a> {
    pub fn new(config: &'a stagecraft_config::Config) -> Self {
        Self { config }
    }

    pub fn build(self) -> crate::error::Result<Server> {
        let edit = Arc::new(self.config.edit.clone());

        tracing::debug!(
            default_provider = %edit.default_provider,
            strict_provider_lookup = edit.strict_provider_lookup,
            "edit server initialized"
        );

        Ok(Server {
            registry: ProviderRegistry::new(edit),
        })
    }
}
