//! Gemini Client Implementation
//!
//! HTTP backend for `generateContent`, `embedContent` and `batchEmbedContents`.
//! Remote failures are classified into `ErrorKind` here, where the response is
//! inspected, so nothing upstream has to look at status codes or messages.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::{
    BatchEmbedContentsRequest, BatchEmbedContentsResponse, Content, EmbedContentRequest,
    EmbedContentResponse, GeminiConfig, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part,
};
use crate::error::{ErrorKind, LlmError, classify_http_error};
use crate::registry::Credential;
use crate::traits::{EmbeddingCapability, GenerationCapability};
use crate::types::GenerationParams;

const PROVIDER_ID: &str = "gemini";

/// Gemini HTTP backend shared by every credential of the provider.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http_client: HttpClient,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| {
                LlmError::ConfigurationError(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self::with_http_client(config, http_client))
    }

    pub fn with_http_client(config: GeminiConfig, http_client: HttpClient) -> Self {
        Self {
            http_client,
            config,
        }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            normalize_model_id(model),
            method
        )
    }

    async fn post_json<B, R>(
        &self,
        credential: &Credential,
        model: &str,
        method: &str,
        body: &B,
    ) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(model, method);
        let headers = build_headers(credential.api_key())?;
        let started = Instant::now();
        debug!(
            provider = PROVIDER_ID,
            model = %model,
            slot = %credential.slot(),
            url = %url,
            "request started"
        );

        let resp = self
            .http_client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            let err = classify_http_error(PROVIDER_ID, status.as_u16(), &text);
            warn!(
                provider = PROVIDER_ID,
                model = %model,
                slot = %credential.slot(),
                status = status.as_u16(),
                kind = %err.kind(),
                duration_ms,
                "request failed"
            );
            return Err(err);
        }

        debug!(
            provider = PROVIDER_ID,
            model = %model,
            status = status.as_u16(),
            duration_ms,
            response_length = text.len(),
            "request completed"
        );
        serde_json::from_str(&text).map_err(|e| LlmError::api(ErrorKind::Parse, None, e.to_string()))
    }
}

#[async_trait]
impl GenerationCapability for GeminiClient {
    async fn generate(
        &self,
        credential: &Credential,
        model: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let body = build_generate_body(params);
        let resp: GenerateContentResponse = self
            .post_json(credential, model, "generateContent", &body)
            .await?;
        resp.text()
            .ok_or_else(|| LlmError::api(ErrorKind::EmptyResponse, None, resp.empty_reason()))
    }
}

#[async_trait]
impl EmbeddingCapability for GeminiClient {
    async fn embed(
        &self,
        credential: &Credential,
        model: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        let model_ref = format!("models/{}", normalize_model_id(model));
        match texts {
            [] => Ok(Vec::new()),
            [single] => {
                let body = EmbedContentRequest {
                    model: model_ref,
                    content: user_content(single),
                };
                let resp: EmbedContentResponse = self
                    .post_json(credential, model, "embedContent", &body)
                    .await?;
                Ok(vec![resp.embedding.values])
            }
            many => {
                let body = BatchEmbedContentsRequest {
                    requests: many
                        .iter()
                        .map(|text| EmbedContentRequest {
                            model: model_ref.clone(),
                            content: user_content(text),
                        })
                        .collect(),
                };
                let resp: BatchEmbedContentsResponse = self
                    .post_json(credential, model, "batchEmbedContents", &body)
                    .await?;
                Ok(resp.embeddings.into_iter().map(|e| e.values).collect())
            }
        }
    }
}

fn user_content(text: &str) -> Content {
    Content {
        role: None,
        parts: vec![Part::text(text)],
    }
}

pub(crate) fn build_generate_body(params: &GenerationParams) -> GenerateContentRequest {
    let sampling = &params.sampling;
    let generation_config = (sampling.temperature.is_some()
        || sampling.max_output_tokens.is_some()
        || sampling.response_mime_type.is_some())
    .then(|| GenerationConfig {
        temperature: sampling.temperature,
        max_output_tokens: sampling.max_output_tokens,
        response_mime_type: sampling.response_mime_type.clone(),
    });

    GenerateContentRequest {
        system_instruction: params.system_instruction.as_ref().map(|s| Content {
            role: None,
            parts: vec![Part::text(s.as_str())],
        }),
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(params.content.as_str())],
        }],
        generation_config,
    }
}

pub(crate) fn build_headers(api_key: &str) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if !api_key.is_empty() {
        let mut value = HeaderValue::from_str(api_key).map_err(|e| {
            LlmError::ConfigurationError(format!("Invalid API key header value: {e}"))
        })?;
        value.set_sensitive(true);
        headers.insert("x-goog-api-key", value);
    }
    Ok(headers)
}

/// Accept both `gemini-2.5-flash` and `models/gemini-2.5-flash`.
fn normalize_model_id(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SamplingParams;

    #[test]
    fn headers_carry_api_key() {
        let headers = build_headers("k").unwrap();
        assert_eq!(
            headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()),
            Some("k")
        );
        assert!(headers.get("x-goog-api-key").unwrap().is_sensitive());
        assert_eq!(
            headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[test]
    fn url_normalizes_model_prefix() {
        let client = GeminiClient::new(GeminiConfig::new().with_base_url("http://host/v1beta/"))
            .unwrap();
        assert_eq!(
            client.url("models/text-embedding-004", "embedContent"),
            "http://host/v1beta/models/text-embedding-004:embedContent"
        );
    }

    #[test]
    fn generation_config_omitted_without_sampling() {
        let body = build_generate_body(&GenerationParams::new("hello"));
        assert!(body.generation_config.is_none());
        assert!(body.system_instruction.is_none());

        let body = build_generate_body(
            &GenerationParams::new("hello")
                .with_system_instruction("be brief")
                .with_sampling(SamplingParams::new().with_json_output()),
        );
        let config = body.generation_config.unwrap();
        assert_eq!(config.response_mime_type.as_deref(), Some("application/json"));
    }
}
