//! Provider backends

pub mod gemini;

/// Provider name used for Gemini in registries and configuration.
pub const GEMINI: &str = "gemini";
