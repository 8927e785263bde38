//! Embedding capability trait

use async_trait::async_trait;

use crate::error::LlmError;
use crate::registry::Credential;

#[async_trait]
pub trait EmbeddingCapability: Send + Sync {
    /// Embed `texts`, returning one vector per input in input order.
    async fn embed(
        &self,
        credential: &Credential,
        model: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, LlmError>;
}
