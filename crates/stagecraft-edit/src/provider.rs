pub(crate) mod fal;
pub(crate) mod google;

use async_trait::async_trait;

use crate::types::EditOutput;

/// Trait for image editing provider implementations
///
/// Implementations must not mutate the input buffers and must hold no
/// mutable instance state, so independent calls can run concurrently.
#[async_trait]
pub(crate) trait EditProvider: Send + Sync + std::fmt::Debug {
    /// Edit the source images according to the prompt
    async fn edit(&self, images: &[Vec<u8>], prompt: &str) -> crate::error::Result<EditOutput>;

    /// Get the provider name
    fn name(&self) -> &str;
}
