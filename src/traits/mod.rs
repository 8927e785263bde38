//! Provider capability traits
//!
//! Backends implement these per provider. Every method takes the credential
//! to use explicitly so that key rotation stays in the caller's hands.

mod embedding;
mod generation;

pub use embedding::EmbeddingCapability;
pub use generation::GenerationCapability;
