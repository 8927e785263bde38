//! Per-call pacing.
//!
//! `Pacer::wait` sleeps before a call for a delay picked by matching the model
//! identifier against an ordered rule list. Each call sleeps independently;
//! there is no shared counter, so parallel callers using the same key are not
//! coordinated.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay applied to model identifiers containing `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaceRule {
    pub pattern: String,
    #[serde(with = "duration_secs")]
    pub delay: Duration,
}

impl PaceRule {
    pub fn new(pattern: impl Into<String>, delay: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            delay,
        }
    }
}

/// Minimum inter-call delay per model class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacer {
    rules: Vec<PaceRule>,
    #[serde(with = "duration_secs")]
    default_delay: Duration,
}

impl Default for Pacer {
    /// Published free-tier limits: Gemma 30 RPM, Flash Lite 10 RPM, others 5 RPM.
    fn default() -> Self {
        Self {
            rules: vec![
                PaceRule::new("gemma", Duration::from_secs(2)),
                PaceRule::new("flash-lite", Duration::from_secs(6)),
            ],
            default_delay: Duration::from_secs(12),
        }
    }
}

impl Pacer {
    pub fn new(rules: Vec<PaceRule>, default_delay: Duration) -> Self {
        Self {
            rules,
            default_delay,
        }
    }

    /// Pacer that never sleeps.
    pub fn disabled() -> Self {
        Self::new(Vec::new(), Duration::ZERO)
    }

    /// Append a rule; earlier rules take precedence.
    pub fn with_rule(mut self, pattern: impl Into<String>, delay: Duration) -> Self {
        self.rules.push(PaceRule::new(pattern, delay));
        self
    }

    pub const fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn rules(&self) -> &[PaceRule] {
        &self.rules
    }

    /// Delay for `model`: first matching rule, else the default.
    pub fn delay_for(&self, model: &str) -> Duration {
        self.rules
            .iter()
            .find(|rule| model.contains(rule.pattern.as_str()))
            .map(|rule| rule.delay)
            .unwrap_or(self.default_delay)
    }

    /// Sleep for the delay of `model`.
    pub async fn wait(&self, model: &str) {
        let delay = self.delay_for(model);
        if delay.is_zero() {
            return;
        }
        tracing::trace!(model = %model, delay_ms = delay.as_millis() as u64, "pacing");
        tokio::time::sleep(delay).await;
    }
}

/// Serialize durations as (fractional) seconds in config files.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_match_model_classes() {
        let pacer = Pacer::default();
        assert_eq!(pacer.delay_for("gemma-3-27b-it"), Duration::from_secs(2));
        assert_eq!(
            pacer.delay_for("gemini-2.5-flash-lite"),
            Duration::from_secs(6)
        );
        assert_eq!(pacer.delay_for("gemini-3-flash"), Duration::from_secs(12));
    }

    #[test]
    fn first_matching_rule_wins() {
        let pacer = Pacer::disabled()
            .with_rule("flash", Duration::from_secs(1))
            .with_rule("flash-lite", Duration::from_secs(9));
        assert_eq!(
            pacer.delay_for("gemini-2.5-flash-lite"),
            Duration::from_secs(1)
        );
        assert_eq!(pacer.delay_for("unknown"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_sleeps_for_the_selected_delay() {
        let pacer = Pacer::default();
        let start = tokio::time::Instant::now();
        pacer.wait("gemma-3-27b-it").await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }
}
