//! Generation Dispatcher
//!
//! Runs a generation request over two nested fallback axes:
//!
//! - outer loop: models of the [`ModelCascade`] (changes capability/cost, last resort)
//! - inner loop: credentials of the provider, primary first (same capability,
//!   different quota pool)
//!
//! The first success is returned immediately. Failed attempts are recorded and
//! never interrupt the cascade; only total exhaustion is reported, as a
//! [`CascadeFailure`] that lists every attempt.
//!
//! The whole cascade is additionally wrapped in a bounded retry with
//! exponential backoff. A new round starts only when every attempt of the
//! previous round failed at the transport level, i.e. before any provider
//! logic was reached.

mod cascade;
mod outcome;
mod request;

pub use cascade::ModelCascade;
pub use outcome::{AttemptError, CascadeFailure, Generation, GenerationOutcome};
pub use request::GenerationRequest;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ErrorKind, LlmError};
use crate::pacer::{Pacer, duration_secs};
use crate::providers::GEMINI;
use crate::registry::{ProviderConfig, ProviderRegistry};
use crate::retry::RetryPolicy;
use crate::traits::GenerationCapability;
use crate::types::GenerationParams;

/// Dispatcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Fixed model fallback sequence per provider.
    pub fallback_models: HashMap<String, Vec<String>>,
    /// Outer retry rounds over the whole cascade.
    pub retry: RetryPolicy,
    /// Pause before switching to the next credential after a retryable error.
    #[serde(with = "duration_secs")]
    pub credential_switch_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            fallback_models: HashMap::from([(
                GEMINI.to_string(),
                vec!["gemini-2.5-flash-lite".to_string()],
            )]),
            retry: RetryPolicy::default(),
            credential_switch_delay: Duration::from_secs(1),
        }
    }
}

impl DispatcherConfig {
    pub fn with_fallback_models<S: Into<String>>(
        mut self,
        provider: impl Into<String>,
        models: impl IntoIterator<Item = S>,
    ) -> Self {
        self.fallback_models
            .insert(provider.into(), models.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub const fn with_credential_switch_delay(mut self, delay: Duration) -> Self {
        self.credential_switch_delay = delay;
        self
    }

    pub fn fallback_models_for(&self, provider: &str) -> &[String] {
        self.fallback_models
            .get(provider)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Fault-tolerant generation over (model x credential) pairs.
pub struct GenerationDispatcher {
    registry: Arc<ProviderRegistry>,
    backends: HashMap<String, Arc<dyn GenerationCapability>>,
    pacer: Pacer,
    config: DispatcherConfig,
}

impl GenerationDispatcher {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            backends: HashMap::new(),
            pacer: Pacer::default(),
            config: DispatcherConfig::default(),
        }
    }

    /// Register the backend serving `provider`.
    pub fn with_backend(
        mut self,
        provider: impl Into<String>,
        backend: Arc<dyn GenerationCapability>,
    ) -> Self {
        self.backends.insert(provider.into(), backend);
        self
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Cascade that `dispatch` would use for `request`.
    pub fn cascade_for(&self, request: &GenerationRequest) -> ModelCascade {
        ModelCascade::build(
            &request.model,
            self.config.fallback_models_for(&request.provider),
            request.allow_model_fallback,
        )
    }

    /// Dispatch and convert exhaustion into `LlmError::CascadeExhausted`.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        self.dispatch(request).await?.into_result()
    }

    /// Run `request` through the cascade.
    ///
    /// `Err` is reserved for configuration problems (unknown provider, no
    /// credentials, no backend, blank model); remote failures end up in the
    /// outcome.
    pub async fn dispatch(&self, request: &GenerationRequest) -> Result<GenerationOutcome, LlmError> {
        self.dispatch_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`dispatch`](Self::dispatch), aborting with `LlmError::Cancelled`
    /// as soon as `cancel` fires.
    pub async fn dispatch_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, LlmError> {
        let provider = self.registry.get(&request.provider)?;
        if !provider.has_credentials() {
            return Err(LlmError::ConfigurationError(format!(
                "No credentials configured for provider '{}'",
                request.provider
            )));
        }
        let backend = self.backends.get(&request.provider).ok_or_else(|| {
            LlmError::ConfigurationError(format!(
                "No generation backend registered for provider '{}'",
                request.provider
            ))
        })?;

        let cascade = self.cascade_for(request);
        if cascade.is_empty() {
            return Err(LlmError::ConfigurationError(
                "Generation request names no model".to_string(),
            ));
        }
        let max_rounds = self.config.retry.attempts();
        let mut attempts: Vec<AttemptError> = Vec::new();

        for round in 1..=max_rounds {
            let round_start = attempts.len();
            let run = CascadeRun {
                round,
                backend: backend.as_ref(),
                provider: &provider,
                params: &request.params,
                cancel,
            };
            if let Some(generation) = self.run_cascade(&run, &cascade, &mut attempts).await? {
                return Ok(GenerationOutcome::Success(generation));
            }

            let round_attempts = &attempts[round_start..];
            let transport_only = !round_attempts.is_empty()
                && round_attempts.iter().all(|a| a.kind == ErrorKind::Network);
            if !transport_only || round == max_rounds {
                break;
            }

            let delay = self.config.retry.delay_after(round);
            warn!(
                provider = %request.provider,
                round,
                delay_ms = delay.as_millis() as u64,
                "every attempt failed at the transport level, retrying cascade"
            );
            sleep_or_cancel(delay, cancel).await?;
        }

        let failure = CascadeFailure::new(attempts);
        error!(
            provider = %request.provider,
            model = %request.model,
            attempts = failure.len(),
            "generation cascade exhausted"
        );
        Ok(GenerationOutcome::Failure(failure))
    }

    async fn run_cascade(
        &self,
        run: &CascadeRun<'_>,
        cascade: &ModelCascade,
        attempts: &mut Vec<AttemptError>,
    ) -> Result<Option<Generation>, LlmError> {
        for model in cascade.iter() {
            // Paced once per model, not per credential.
            tokio::select! {
                _ = run.cancel.cancelled() => return Err(LlmError::Cancelled),
                _ = self.pacer.wait(model) => {}
            }

            let mut previous_kind: Option<ErrorKind> = None;
            for credential in run.provider.credentials() {
                if previous_kind.is_some_and(ErrorKind::is_retryable) {
                    sleep_or_cancel(self.config.credential_switch_delay, run.cancel).await?;
                }

                let result = tokio::select! {
                    _ = run.cancel.cancelled() => return Err(LlmError::Cancelled),
                    result = run.backend.generate(credential, model, run.params) => result,
                };

                match result {
                    Ok(text) => {
                        let failed_attempts = attempts.clone();
                        if !failed_attempts.is_empty() {
                            info!(
                                provider = %run.provider.provider(),
                                model = %model,
                                slot = %credential.slot(),
                                absorbed_failures = failed_attempts.len(),
                                "generation recovered via fallback"
                            );
                        }
                        return Ok(Some(Generation {
                            text,
                            model: model.to_string(),
                            slot: credential.slot(),
                            failed_attempts,
                        }));
                    }
                    Err(err) => {
                        let kind = err.kind();
                        warn!(
                            provider = %run.provider.provider(),
                            model = %model,
                            slot = %credential.slot(),
                            round = run.round,
                            kind = %kind,
                            error = %err,
                            "generation attempt failed"
                        );
                        attempts.push(AttemptError::new(run.round, model, credential.slot(), &err));
                        previous_kind = Some(kind);
                    }
                }
            }
        }

        Ok(None)
    }
}

/// Per-round inputs shared by every attempt.
struct CascadeRun<'a> {
    round: u32,
    backend: &'a dyn GenerationCapability,
    provider: &'a ProviderConfig,
    params: &'a GenerationParams,
    cancel: &'a CancellationToken,
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), LlmError> {
    if delay.is_zero() {
        return if cancel.is_cancelled() {
            Err(LlmError::Cancelled)
        } else {
            Ok(())
        };
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
