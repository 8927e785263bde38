//! Core error types.

use std::fmt;

use thiserror::Error;

use crate::dispatcher::CascadeFailure;

/// Closed classification of a failed remote call.
///
/// Produced once, at the boundary where the provider response is inspected,
/// so that the cascade logic branches on a kind instead of on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Quota for the key (or the key's tier) is exhausted.
    Quota,
    /// Requests are arriving faster than the provider allows.
    RateLimited,
    /// Provider-side failure that is expected to clear (5xx, overloaded).
    Transient,
    /// Transport failure before any provider response was received.
    Network,
    /// Key rejected, missing permission, or otherwise unauthorized.
    Authentication,
    /// Malformed or unsupported request.
    InvalidRequest,
    /// Unknown model or endpoint.
    NotFound,
    /// Call succeeded but produced no usable text (e.g. blocked candidate).
    EmptyResponse,
    /// Response body could not be decoded.
    Parse,
    /// Local configuration problem.
    Configuration,
    Cancelled,
    Other,
}

impl ErrorKind {
    /// Whether a later attempt with the same inputs may succeed.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Quota | Self::RateLimited | Self::Transient | Self::Network
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quota => "quota",
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::EmptyResponse => "empty_response",
            Self::Parse => "parse",
            Self::Configuration => "configuration",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by generation and embedding calls.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Provider '{provider}' is not configured")]
    NotConfigured { provider: String },

    #[error("API error ({kind}{}): {message}", .status.map(|s| format!(", status {s}")).unwrap_or_default())]
    Api {
        kind: ErrorKind,
        status: Option<u16>,
        message: String,
    },

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("{0}")]
    CascadeExhausted(CascadeFailure),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LlmError {
    pub fn api(kind: ErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn not_configured(provider: impl Into<String>) -> Self {
        Self::NotConfigured {
            provider: provider.into(),
        }
    }

    /// Coarse classification used by the dispatcher and retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigurationError(_) | Self::NotConfigured { .. } => ErrorKind::Configuration,
            Self::Api { kind, .. } => *kind,
            Self::HttpError(_) => ErrorKind::Network,
            Self::ParseError(_) => ErrorKind::Parse,
            Self::CascadeExhausted(_) => ErrorKind::Other,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InternalError(_) => ErrorKind::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Status code reported by the provider, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }
}

/// Errors raised by the vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Embedding dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Store lock poisoned")]
    LockPoisoned,
}
