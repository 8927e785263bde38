//! Error Handling Module
//!
//! - Core error types (`LlmError`, `ErrorKind`, `StoreError`)
//! - Classification of provider HTTP failures into `ErrorKind`
//! - Type conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use cardsmith::error::{ErrorKind, LlmError};
//!
//! let error = LlmError::api(ErrorKind::Quota, Some(429), "quota exhausted");
//! assert!(error.is_retryable());
//! ```

mod conversions;
pub mod types;

pub use conversions::classify_http_error;
pub use types::*;
