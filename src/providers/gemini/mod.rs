//! Google Gemini provider
//!
//! Generation and embedding backend for the Gemini REST API.

mod client;
pub mod types;

pub use client::GeminiClient;
pub use types::GeminiConfig;
