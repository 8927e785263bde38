//! Test doubles shared by the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cardsmith::prelude::*;
use cardsmith::providers::GEMINI;
use cardsmith::registry::Credential;

/// Scripted reply for one (model, api key) pair.
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Fail(ErrorKind),
}

/// Generation backend answering from a table keyed by (model, api key).
/// Unlisted pairs fail with `default_failure`.
pub struct ScriptedBackend {
    replies: HashMap<(String, String), Reply>,
    default_failure: ErrorKind,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            default_failure: ErrorKind::InvalidRequest,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, model: &str, key: &str, reply: Reply) -> Self {
        self.replies
            .insert((model.to_string(), key.to_string()), reply);
        self
    }

    pub fn succeed(self, model: &str, key: &str, text: &str) -> Self {
        self.reply(model, key, Reply::Text(text.to_string()))
    }

    pub fn fail(self, model: &str, key: &str, kind: ErrorKind) -> Self {
        self.reply(model, key, Reply::Fail(kind))
    }

    pub fn default_failure(mut self, kind: ErrorKind) -> Self {
        self.default_failure = kind;
        self
    }

    /// (model, api key) pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

fn failure(kind: ErrorKind) -> LlmError {
    match kind {
        ErrorKind::Network => LlmError::HttpError("connection refused".to_string()),
        ErrorKind::Quota => LlmError::api(kind, Some(429), "Quota exceeded for metric"),
        other => LlmError::api(other, None, format!("scripted {other}")),
    }
}

#[async_trait]
impl GenerationCapability for ScriptedBackend {
    async fn generate(
        &self,
        credential: &Credential,
        model: &str,
        _params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let key = (model.to_string(), credential.api_key().to_string());
        self.calls.lock().unwrap().push(key.clone());
        match self.replies.get(&key) {
            Some(Reply::Text(text)) => Ok(text.clone()),
            Some(Reply::Fail(kind)) => Err(failure(*kind)),
            None => Err(failure(self.default_failure)),
        }
    }
}

/// Dispatcher over `backend` with pacing and pauses disabled and a single
/// outer round.
pub fn dispatcher(
    backend: Arc<ScriptedBackend>,
    primary: &str,
    fallbacks: &[&str],
    fallback_models: &[&str],
) -> GenerationDispatcher {
    let registry = Arc::new(ProviderRegistry::new());
    registry.configure(GEMINI, primary, fallbacks);
    GenerationDispatcher::new(registry)
        .with_backend(GEMINI, backend)
        .with_pacer(Pacer::disabled())
        .with_config(
            DispatcherConfig::default()
                .with_fallback_models(GEMINI, fallback_models.iter().copied())
                .with_retry(RetryPolicy::none())
                .with_credential_switch_delay(std::time::Duration::ZERO),
        )
}

/// Bag-of-words embedder over a fixed vocabulary: one dimension per word.
pub struct VocabularyEmbedder {
    vocabulary: Vec<&'static str>,
}

impl VocabularyEmbedder {
    pub fn new(vocabulary: &[&'static str]) -> Self {
        Self {
            vocabulary: vocabulary.to_vec(),
        }
    }
}

#[async_trait]
impl EmbeddingCapability for VocabularyEmbedder {
    async fn embed(
        &self,
        _credential: &Credential,
        _model: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                self.vocabulary
                    .iter()
                    .map(|word| lower.matches(word).count() as f32)
                    .collect()
            })
            .collect())
    }
}

pub fn embedding_client(backend: Arc<dyn EmbeddingCapability>) -> Arc<EmbeddingClient> {
    let registry = Arc::new(ProviderRegistry::new());
    registry.configure(GEMINI, "embedding-key", &[] as &[&str]);
    Arc::new(EmbeddingClient::new(registry, backend))
}
