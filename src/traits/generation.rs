//! Generation capability trait

use async_trait::async_trait;

use crate::error::LlmError;
use crate::registry::Credential;
use crate::types::GenerationParams;

#[async_trait]
pub trait GenerationCapability: Send + Sync {
    /// Run one generation call with `credential` against `model`.
    ///
    /// Failures must carry a classified `ErrorKind` so the dispatcher can
    /// decide how to continue.
    async fn generate(
        &self,
        credential: &Credential,
        model: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError>;
}
