//! Shared request types

pub mod generation;

pub use generation::{GenerationParams, SamplingParams};
