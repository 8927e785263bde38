//! Provider Registry
//!
//! Holds, per provider, one primary credential and an ordered list of
//! fallback credentials. The registry is an explicit value shared by `Arc`
//! with the dispatcher and the embedding client; there is no global
//! "current key" state.
//!
//! Reconfiguring a provider swaps a whole `Arc<ProviderConfig>` under a write
//! lock, so readers observe either the old or the new configuration, never a
//! mix of both.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;

/// Position of a credential inside its provider configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialSlot {
    Primary,
    /// 1-based position in the fallback list.
    Fallback(usize),
}

impl fmt::Display for CredentialSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback(n) => write!(f, "fallback-{n}"),
        }
    }
}

/// One API key bound to one provider.
pub struct Credential {
    provider: String,
    slot: CredentialSlot,
    api_key: SecretString,
}

impl Credential {
    fn new(provider: &str, slot: CredentialSlot, api_key: &str) -> Self {
        Self {
            provider: provider.to_string(),
            slot,
            api_key: SecretString::from(api_key.trim().to_string()),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn slot(&self) -> CredentialSlot {
        self.slot
    }

    /// Raw key, for the HTTP layer only.
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Masked form of the key that is safe to log.
    pub fn masked(&self) -> String {
        mask_secret(self.api_key())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("slot", &self.slot)
            .field("api_key", &self.masked())
            .finish()
    }
}

/// Mask a secret for logging, keeping a short prefix and suffix.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

/// Credentials configured for a single provider.
#[derive(Debug)]
pub struct ProviderConfig {
    provider: String,
    primary: Option<Credential>,
    fallbacks: Vec<Credential>,
}

impl ProviderConfig {
    /// Build a configuration. A blank primary key yields no primary; blank
    /// fallback keys are dropped.
    pub fn new<S: AsRef<str>>(provider: &str, primary_key: &str, fallback_keys: &[S]) -> Self {
        let primary = (!primary_key.trim().is_empty())
            .then(|| Credential::new(provider, CredentialSlot::Primary, primary_key));
        let fallbacks = fallback_keys
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|k| !k.trim().is_empty())
            .enumerate()
            .map(|(i, k)| Credential::new(provider, CredentialSlot::Fallback(i + 1), k))
            .collect();
        Self {
            provider: provider.to_string(),
            primary,
            fallbacks,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn primary(&self) -> Option<&Credential> {
        self.primary.as_ref()
    }

    pub fn fallbacks(&self) -> &[Credential] {
        &self.fallbacks
    }

    /// Primary first (when present), then fallbacks in listed order.
    pub fn credentials(&self) -> impl Iterator<Item = &Credential> {
        self.primary.iter().chain(self.fallbacks.iter())
    }

    pub fn credential_count(&self) -> usize {
        usize::from(self.primary.is_some()) + self.fallbacks.len()
    }

    pub fn has_credentials(&self) -> bool {
        self.credential_count() > 0
    }
}

/// Per-session registry of provider credentials.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<ProviderConfig>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure (or atomically replace) the credentials of `provider`.
    pub fn configure<S: AsRef<str>>(
        &self,
        provider: &str,
        primary_key: &str,
        fallback_keys: &[S],
    ) -> Arc<ProviderConfig> {
        let config = Arc::new(ProviderConfig::new(provider, primary_key, fallback_keys));
        tracing::debug!(
            provider = %provider,
            has_primary = config.primary.is_some(),
            fallbacks = config.fallbacks.len(),
            "provider configured"
        );
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), Arc::clone(&config));
        config
    }

    /// Snapshot of the current configuration of `provider`.
    pub fn get(&self, provider: &str) -> Result<Arc<ProviderConfig>, LlmError> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .cloned()
            .ok_or_else(|| LlmError::not_configured(provider))
    }

    pub fn is_configured(&self, provider: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(provider)
    }

    /// Names of all configured providers, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
