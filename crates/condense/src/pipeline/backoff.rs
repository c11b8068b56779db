//! Backoff policies for rate-limited flushes.
//!
//! When the backend reports a rate-limit-class failure the pipeline sleeps
//! and retries the identical request. The sleep duration comes from a
//! pluggable [`BackoffPolicy`]. The stock policy is [`FixedDelay`] — a
//! static delay sized to the backend's published per-minute quota, which is
//! what the quota actually replenishes on. [`ExponentialBackoff`] is
//! available for backends without a published replenishment interval.

use std::time::Duration;

/// Maps a retry attempt number (0-indexed) to the delay to sleep before it.
pub trait BackoffPolicy: Send + Sync {
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// A constant delay regardless of attempt number.
///
/// The right shape when the limit being waited out is a fixed-window quota:
/// one full window guarantees the identical request is admissible again, and
/// backing off longer than that only wastes wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(super::config::DEFAULT_BACKOFF_DELAY)
    }
}

impl BackoffPolicy for FixedDelay {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Exponential backoff with a cap and deterministic jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter based on attempt number — not worth
            // pulling in rand for this.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                3 => 0.85,
                _ => 0.80,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}
