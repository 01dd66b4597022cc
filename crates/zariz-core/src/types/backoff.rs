//! Exponential backoff with bounded random jitter.

use std::time::Duration;

use rand::Rng;

/// Retry delay strategy: `min(max, base * 2^attempt) + uniform(0..=jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: Duration,
}

impl Backoff {
    /// Create a backoff strategy.
    pub fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self { base, max, jitter }
    }

    /// Deterministic part of the delay for the given zero-based attempt.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay for the given zero-based attempt, jitter included.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.capped_delay(attempt) + self.sample_jitter()
    }

    fn sample_jitter(&self) -> Duration {
        let bound = self.jitter.as_millis() as u64;
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
    }
}
