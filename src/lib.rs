//! # Cardsmith
//!
//! Fault-tolerant LLM generation and retrieval for turning documents into
//! study cards.
//!
//! ## Components
//!
//! - **Provider registry**: primary and fallback credentials per provider.
//! - **Generation dispatcher**: tries every credential of a model before
//!   moving to the next model of the cascade, and reports total exhaustion as
//!   a single value listing every attempt.
//! - **Pacer**: per-model minimum delay before each call.
//! - **Embedding client** and **vector store**: chunks persisted in SQLite,
//!   searched by cosine similarity over an in-memory matrix.
//! - **Output normalizer** and **records**: tolerant cleanup and parsing of
//!   the quoted two-field card format.
//! - **Study pipeline**: cards, answers over stored passages, summaries,
//!   table-of-contents analysis and file ordering on top of the above.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardsmith::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::default()
//!         .with_gemini_keys("primary-key", ["spare-key"])
//!         .apply_env()?;
//!     let pipeline = settings.build_pipeline()?;
//!
//!     let cards = pipeline
//!         .generate_cards("Mitochondria produce ATP...", &CardOptions::default())
//!         .await?;
//!     for card in cards {
//!         println!("{}", format_card(&card, '|'));
//!     }
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod embedding;
pub mod error;
pub mod normalize;
pub mod pacer;
pub mod pipeline;
pub mod providers;
pub mod records;
pub mod registry;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use error::{ErrorKind, LlmError, StoreError};

pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::dispatcher::{
        AttemptError, CascadeFailure, DispatcherConfig, Generation, GenerationDispatcher,
        GenerationOutcome, GenerationRequest, ModelCascade,
    };
    pub use crate::embedding::EmbeddingClient;
    pub use crate::error::{ErrorKind, LlmError, StoreError};
    pub use crate::normalize::{OutputNormalizer, strip_code_fences};
    pub use crate::pacer::Pacer;
    pub use crate::pipeline::{
        CardDensity, CardLength, CardOptions, ChatRole, ChatTurn, StudyPipeline, TocEntry,
    };
    pub use crate::providers::gemini::{GeminiClient, GeminiConfig};
    pub use crate::records::{Card, dedupe_cards, format_card, parse_cards};
    pub use crate::registry::{CredentialSlot, ProviderRegistry};
    pub use crate::retry::RetryPolicy;
    pub use crate::store::{AddReport, Chunk, Metadata, ScoredChunk, StoreConfig, VectorStore};
    pub use crate::traits::{EmbeddingCapability, GenerationCapability};
    pub use crate::types::{GenerationParams, SamplingParams};
}
