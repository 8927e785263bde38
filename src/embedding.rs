//! Embedding Client
//!
//! Turns text into vectors through an [`EmbeddingCapability`] backend.
//! Failures are absorbed: every operation yields `None` instead of an error,
//! and callers decide what an unavailable embedding means for them.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::LlmError;
use crate::providers::GEMINI;
use crate::registry::ProviderRegistry;
use crate::retry::RetryPolicy;
use crate::traits::EmbeddingCapability;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

pub struct EmbeddingClient {
    registry: Arc<ProviderRegistry>,
    backend: Arc<dyn EmbeddingCapability>,
    provider: String,
    model: String,
    retry: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(registry: Arc<ProviderRegistry>, backend: Arc<dyn EmbeddingCapability>) -> Self {
        Self {
            registry,
            backend,
            provider: GEMINI.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Retry retryable failures (quota, rate limits, transient, network).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed one text. `None` when no credential is configured or the call fails.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop()
    }

    /// Embed `texts` in one request, preserving order.
    ///
    /// All or nothing: a partial or misaligned answer is treated as a failure.
    pub async fn embed_batch(&self, texts: &[String]) -> Option<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Some(Vec::new());
        }
        match self.try_embed_batch(texts).await {
            Ok(vectors) => Some(vectors),
            Err(error) => {
                warn!(
                    provider = %self.provider,
                    model = %self.model,
                    texts = texts.len(),
                    error = %error,
                    "embedding failed"
                );
                None
            }
        }
    }

    async fn try_embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let provider = self.registry.get(&self.provider)?;
        // Primary when present, otherwise the first fallback.
        let credential = provider.credentials().next().ok_or_else(|| {
            LlmError::ConfigurationError(format!(
                "No credentials configured for provider '{}'",
                self.provider
            ))
        })?;

        let vectors = self
            .retry
            .run(|| self.backend.embed(credential, &self.model, texts))
            .await?;

        if vectors.len() != texts.len() {
            return Err(LlmError::ParseError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if vectors.iter().any(Vec::is_empty) {
            return Err(LlmError::ParseError("Empty embedding vector".to_string()));
        }

        debug!(
            model = %self.model,
            slot = %credential.slot(),
            texts = texts.len(),
            dimensions = vectors[0].len(),
            "embedded"
        );
        Ok(vectors)
    }
}
