use super::config::BackoffConfig;
use std::time::Duration;

/// Jittered, capped exponential backoff.
///
/// Consecutive delays never decrease until [`Backoff::reset`] is called: the
/// random jitter is applied on top of the exponential base and the result is
/// clamped between the previous delay and the cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    last: Duration,
}

impl Backoff {
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempt: 0,
            last: Duration::ZERO,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let max = self.config.max;
        let growth = self.config.factor.max(1).saturating_pow(self.attempt);
        let base = self.config.initial.saturating_mul(growth).min(max);

        let ratio = if self.config.jitter.is_finite() {
            self.config.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let jitter = base.mul_f64(ratio * fastrand::f64());

        let delay = base.saturating_add(jitter).min(max).max(self.last);
        self.attempt = self.attempt.saturating_add(1);
        self.last = delay;
        delay
    }

    /// Forget past failures
    pub const fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }

    /// Failures since the last reset
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }
}
