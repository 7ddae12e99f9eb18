use async_trait::async_trait;

use crate::error::Result;

// =============================================================================
// TextModel Trait
// =============================================================================

/// A prompt-in, text-out model call. The model selector is passed per call so
/// one client can serve several pipeline variants.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, model: &str, system: &str, user: &str) -> Result<String>;
}
