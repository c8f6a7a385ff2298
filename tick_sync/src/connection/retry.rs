//! Bounded reconnection policy.
use std::time::Duration;

use rand::Rng;

/// How many times, and how far apart, the push connection is re-established.
///
/// `max_attempts` counts reconnections after the first failure, so a policy of 5
/// allows six connection attempts in a row before giving up. The delay before
/// reconnection `n` (1-based) is `base_delay * 2^(n-1)`, randomized by `±jitter`
/// and clamped to `[base_delay, max_delay]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Reconnection attempts allowed after a failure.
    pub max_attempts: u32,
    /// Delay before the first reconnection.
    pub base_delay: Duration,
    /// Upper bound of any delay.
    pub max_delay: Duration,
    /// Randomization factor in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    /// `true` if reconnection number `attempt` (1-based) is still within budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay to wait before reconnection number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let floor = self.base_delay.min(self.max_delay);
        let exponent = attempt.saturating_sub(1).min(31);
        let nominal = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        let jitter = self.jitter.clamp(0.0, 1.0);
        let delay = if jitter > 0.0 {
            let factor = 1.0 + rand::rng().random_range(-jitter..=jitter);
            nominal.mul_f64(factor)
        } else {
            nominal
        };
        delay.clamp(floor, self.max_delay.max(floor))
    }
}
