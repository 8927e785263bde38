use crate::providers::GEMINI;
use crate::types::{GenerationParams, SamplingParams};

/// A generation request. Immutable once handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub provider: String,
    pub model: String,
    pub params: GenerationParams,
    /// Allow substituting the provider's fallback models after `model`.
    pub allow_model_fallback: bool,
}

impl GenerationRequest {
    /// Request against Gemini with model fallback disabled.
    pub fn new(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            provider: GEMINI.to_string(),
            model: model.into(),
            params: GenerationParams::new(content),
            allow_model_fallback: false,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.params.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.params.sampling = sampling;
        self
    }

    pub const fn with_model_fallback(mut self, allow: bool) -> Self {
        self.allow_model_fallback = allow;
        self
    }
}
