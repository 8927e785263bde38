//! Model cascade construction

use std::collections::HashSet;

/// Ordered, duplicate-free list of models to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCascade {
    models: Vec<String>,
}

impl ModelCascade {
    /// `[requested] ++ (fallbacks \ requested)` when `allow_fallback`, else
    /// `[requested]`. Duplicates inside `fallbacks` are dropped as well.
    pub fn build<S: AsRef<str>>(requested: &str, fallbacks: &[S], allow_fallback: bool) -> Self {
        let mut seen = HashSet::new();
        let candidates = std::iter::once(requested).chain(
            fallbacks
                .iter()
                .map(AsRef::<str>::as_ref)
                .filter(move |_| allow_fallback),
        );
        let models = candidates
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .filter(|m| seen.insert(m.to_string()))
            .map(str::to_string)
            .collect();
        Self { models }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }
}
