//! Bounded exponential backoff.
//!
//! One policy drives two loops: the dispatcher's outer rounds over a whole
//! cascade (restarted only after transport failures) and the embedding
//! client's retries of a single request.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;
use crate::pacer::duration_secs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts in total, the first one included. Zero behaves as one.
    pub max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction of it.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// One attempt and no waiting.
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Jitter fraction, clamped to `0.0..=1.0`; `0.0` makes delays exact.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause after the `failures`-th consecutive failure (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);

        let spread = capped_ms * self.jitter;
        let ms = if spread > 0.0 {
            capped_ms + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            capped_ms
        };
        Duration::from_millis(ms.max(0.0) as u64)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error or
    /// runs out of attempts. The last error is returned.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let attempts = self.attempts();
        let mut failures = 0;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            failures += 1;
            if !error.is_retryable() || failures >= attempts {
                return Err(error);
            }
            let delay = self.delay_after(failures);
            debug!(
                failures,
                attempts,
                kind = %error.kind(),
                delay_ms = delay.as_millis() as u64,
                "retrying after failure"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn exact(initial_ms: u64) -> RetryPolicy {
        RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(initial_ms))
            .with_jitter(0.0)
    }

    #[test]
    fn delays_double_until_the_cap() {
        let policy = exact(100).with_max_delay(Duration::from_millis(350));
        let delays: Vec<u64> = (1..=4)
            .map(|n| policy.delay_after(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 350, 350]);
    }

    #[test]
    fn jitter_stays_within_its_fraction() {
        let policy = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(1000))
            .with_jitter(0.2);
        for _ in 0..50 {
            let ms = policy.delay_after(1).as_millis();
            assert!((800..=1200).contains(&ms), "delay {ms}ms out of range");
        }
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new().with_max_attempts(0).attempts(), 1);
        assert_eq!(RetryPolicy::none().attempts(), 1);
    }

    #[test]
    fn reads_fractional_seconds_from_toml() {
        let policy: RetryPolicy = toml::from_str("max_attempts = 5\ninitial_delay = 0.25").unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = exact(500)
            .run(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LlmError::api(ErrorKind::RateLimited, Some(429), "slow down"))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_with_the_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), LlmError> = exact(10)
            .with_max_attempts(2)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::HttpError("connection reset".into()))
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_failure_is_returned_at_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), LlmError> = RetryPolicy::new()
            .with_max_attempts(5)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::api(ErrorKind::Authentication, Some(403), "denied"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Authentication);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
