//! Settings
//!
//! Everything needed to assemble the registry, dispatcher, embedding client,
//! store and pipeline, loadable from TOML and overridable from the
//! environment.
//!
//! ```toml
//! [gemini]
//! api_key = "..."
//! fallback_keys = ["...", "..."]
//!
//! [dispatcher.fallback_models]
//! gemini = ["gemini-2.5-flash-lite"]
//!
//! [store]
//! path = "chunks.db"
//! max_chunks = 5000
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatcher::{DispatcherConfig, GenerationDispatcher};
use crate::embedding::{DEFAULT_EMBEDDING_MODEL, EmbeddingClient};
use crate::error::{LlmError, StoreError};
use crate::pacer::Pacer;
use crate::pipeline::{PipelineModels, StudyPipeline};
use crate::providers::GEMINI;
use crate::providers::gemini::{GeminiClient, GeminiConfig};
use crate::registry::ProviderRegistry;
use crate::retry::RetryPolicy;
use crate::store::{StoreConfig, VectorStore};
use crate::telemetry::SubscriberConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub api_key: String,
    pub fallback_keys: Vec<String>,
    #[serde(flatten)]
    pub client: GeminiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    pub retry: RetryPolicy,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            retry: RetryPolicy::none(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Database file; in-memory when absent.
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub limits: StoreConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gemini: GeminiSettings,
    pub dispatcher: DispatcherConfig,
    pub pacer: Pacer,
    pub embedding: EmbeddingSettings,
    pub store: StoreSettings,
    pub models: PipelineModels,
    pub logging: SubscriberConfig,
}

impl Settings {
    pub fn from_toml_str(source: &str) -> Result<Self, LlmError> {
        toml::from_str(source)
            .map_err(|e| LlmError::ConfigurationError(format!("Invalid settings: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LlmError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            LlmError::ConfigurationError(format!("Cannot read settings {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Overrides from `GEMINI_API_KEY`, `GEMINI_FALLBACK_KEYS` (comma
    /// separated) and `CARDSMITH_STORE_PATH`, then the logging variables.
    pub fn apply_env(mut self) -> Result<Self, LlmError> {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.gemini.api_key = key;
        }
        if let Ok(keys) = std::env::var("GEMINI_FALLBACK_KEYS") {
            self.gemini.fallback_keys = split_keys(&keys);
        }
        if let Ok(path) = std::env::var("CARDSMITH_STORE_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }
        self.logging = self.logging.apply_env()?;
        Ok(self)
    }

    pub fn with_gemini_keys<S: Into<String>>(
        mut self,
        api_key: impl Into<String>,
        fallback_keys: impl IntoIterator<Item = S>,
    ) -> Self {
        self.gemini.api_key = api_key.into();
        self.gemini.fallback_keys = fallback_keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store.path = Some(path.into());
        self
    }

    /// Registry holding the configured Gemini credentials.
    pub fn build_registry(&self) -> Arc<ProviderRegistry> {
        let registry = Arc::new(ProviderRegistry::new());
        registry.configure(GEMINI, &self.gemini.api_key, self.gemini.fallback_keys.as_slice());
        registry
    }

    pub fn build_gemini_client(&self) -> Result<Arc<GeminiClient>, LlmError> {
        Ok(Arc::new(GeminiClient::new(self.gemini.client.clone())?))
    }

    pub fn build_dispatcher(
        &self,
        registry: Arc<ProviderRegistry>,
        client: Arc<GeminiClient>,
    ) -> GenerationDispatcher {
        GenerationDispatcher::new(registry)
            .with_backend(GEMINI, client)
            .with_pacer(self.pacer.clone())
            .with_config(self.dispatcher.clone())
    }

    pub fn build_embedding_client(
        &self,
        registry: Arc<ProviderRegistry>,
        client: Arc<GeminiClient>,
    ) -> EmbeddingClient {
        EmbeddingClient::new(registry, client)
            .with_model(&self.embedding.model)
            .with_retry(self.embedding.retry.clone())
    }

    pub fn open_store(&self, embedder: Arc<EmbeddingClient>) -> Result<VectorStore, StoreError> {
        match &self.store.path {
            Some(path) => VectorStore::open(path, embedder, self.store.limits.clone()),
            None => VectorStore::open_in_memory(embedder, self.store.limits.clone()),
        }
    }

    /// Wire a complete pipeline backed by one shared Gemini client.
    pub fn build_pipeline(&self) -> Result<StudyPipeline, LlmError> {
        let registry = self.build_registry();
        let client = self.build_gemini_client()?;
        let dispatcher = self.build_dispatcher(Arc::clone(&registry), Arc::clone(&client));
        let embedder = Arc::new(self.build_embedding_client(registry, client));
        let store = self
            .open_store(embedder)
            .map_err(|e| LlmError::ConfigurationError(format!("Cannot open vector store: {e}")))?;
        Ok(StudyPipeline::new(Arc::new(dispatcher))
            .with_store(Arc::new(store))
            .with_models(self.models.clone()))
    }
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.store.limits.max_chunks, 5000);
        assert_eq!(settings.store.limits.min_chunk_chars, 50);
        assert_eq!(settings.embedding.model, "text-embedding-004");
        assert_eq!(
            settings.dispatcher.fallback_models_for(GEMINI),
            &["gemini-2.5-flash-lite".to_string()]
        );
        assert_eq!(settings.pacer.delay_for("gemma-3-27b-it"), Duration::from_secs(2));
    }

    #[test]
    fn parses_partial_toml() {
        let settings = Settings::from_toml_str(
            r#"
            [gemini]
            api_key = "primary"
            fallback_keys = ["one", "two"]
            timeout = 30

            [dispatcher]
            credential_switch_delay = 0.5

            [dispatcher.retry]
            max_attempts = 5

            [store]
            path = "cards.db"
            max_chunks = 10

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(settings.gemini.fallback_keys, vec!["one", "two"]);
        assert_eq!(settings.gemini.client.timeout, 30);
        assert_eq!(settings.dispatcher.retry.max_attempts, 5);
        assert_eq!(
            settings.dispatcher.credential_switch_delay,
            Duration::from_millis(500)
        );
        assert_eq!(settings.store.path, Some(PathBuf::from("cards.db")));
        assert_eq!(settings.store.limits.max_chunks, 10);
        assert_eq!(settings.store.limits.batch_size, 100);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_toml_is_a_configuration_error() {
        assert!(matches!(
            Settings::from_toml_str("gemini = 3"),
            Err(LlmError::ConfigurationError(_))
        ));
    }

    #[test]
    fn fallback_keys_are_split_and_trimmed() {
        assert_eq!(split_keys(" a, ,b ,"), vec!["a", "b"]);
    }

    #[test]
    fn registry_uses_configured_keys() {
        let registry = Settings::default()
            .with_gemini_keys("", ["spare"])
            .build_registry();
        let config = registry.get(GEMINI).unwrap();
        assert!(config.primary().is_none());
        assert_eq!(config.credential_count(), 1);
    }
}
