//! Dispatch outcome types

use std::fmt;

use crate::error::{ErrorKind, LlmError};
use crate::registry::CredentialSlot;

/// Descriptor of one failed (model, credential) attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptError {
    /// 1-based outer retry round
    pub round: u32,
    pub model: String,
    pub slot: CredentialSlot,
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl AttemptError {
    pub(crate) fn new(round: u32, model: &str, slot: CredentialSlot, error: &LlmError) -> Self {
        Self {
            round,
            model: model.to_string(),
            slot,
            kind: error.kind(),
            status: error.status(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} / {}", self.model, self.slot)?;
        if self.round > 1 {
            write!(f, " / round {}", self.round)?;
        }
        write!(f, "] {}", self.message)
    }
}

/// Every attempt of a dispatch failed.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeFailure {
    attempts: Vec<AttemptError>,
}

impl CascadeFailure {
    pub(crate) fn new(attempts: Vec<AttemptError>) -> Self {
        Self { attempts }
    }

    /// Descriptors in attempt order; one per attempted pair.
    pub fn attempts(&self) -> &[AttemptError] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Kind of the last failure, the one closest to the "last resort".
    pub fn last_kind(&self) -> Option<ErrorKind> {
        self.attempts.last().map(|a| a.kind)
    }
}

impl fmt::Display for CascadeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "All {} generation attempts failed", self.attempts.len())?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{attempt}")?;
        }
        Ok(())
    }
}

/// Successful generation, with the failures absorbed on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub slot: CredentialSlot,
    pub failed_attempts: Vec<AttemptError>,
}

impl Generation {
    /// True when the answer did not come from the first pair of the cascade.
    pub fn used_fallback(&self) -> bool {
        !self.failed_attempts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success(Generation),
    Failure(CascadeFailure),
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Success(generation) => Some(&generation.text),
            Self::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Generation, LlmError> {
        match self {
            Self::Success(generation) => Ok(generation),
            Self::Failure(failure) => Err(LlmError::CascadeExhausted(failure)),
        }
    }
}
