//! Retry policy for batch failures, plus the startup connection backoff.
//!
//! The runner drives [`RetryConfig`] by hand because it has to interleave
//! cancellation with every wait. One-shot startup work uses `backon` directly.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RetrySettings")]
pub struct RetryConfig {
    /// Base delay for first retry (before jitter).
    pub base_delay: Duration,
    /// Maximum delay cap (before jitter).
    pub max_delay: Duration,
    /// Maximum number of retry attempts (0 = fail on the first error).
    pub max_retries: u32,
    /// Jitter factor: delay is multiplied by a value in [1-jitter, 1+jitter].
    /// Set to 0.0 for no jitter.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            max_retries: 5,
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// No waiting, no retries. Useful in tests.
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_retries: 0,
            jitter: 0.0,
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    ///
    /// `base * 2^attempt`, capped at `max_delay`, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let capped_ms = base_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.max_delay.as_millis() as u64);

        if self.jitter <= 0.0 {
            return Duration::from_millis(capped_ms);
        }
        Duration::from_millis((capped_ms as f64 * self.jitter_factor(attempt)) as u64)
    }

    /// Multiplier in `[1 - jitter, 1 + jitter]` derived from the clock.
    fn jitter_factor(&self, attempt: u32) -> f64 {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64)
            .unwrap_or(0);
        let spread = nanos.wrapping_mul(31).wrapping_add(u64::from(attempt) * 17) % 1000;
        let unit = spread as f64 / 500.0 - 1.0;
        1.0 + unit * self.jitter
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// On-disk shape of [`RetryConfig`].
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RetrySettings {
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: u32,
    jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            max_retries: defaults.max_retries,
            jitter: defaults.jitter,
        }
    }
}

impl From<RetrySettings> for RetryConfig {
    fn from(settings: RetrySettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_retries: settings.max_retries,
            jitter: settings.jitter.clamp(0.0, 1.0),
        }
    }
}

/// Backoff for storage connection retries at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}
