/**
 * Configuration constants for the peer synchronizer
 */
use std::time::Duration;

/// Initial backoff time in milliseconds
pub const INITIAL_BACKOFF_MILLIS: u64 = 1_000;

/// Maximum backoff time in seconds between relist attempts
pub const MAX_BACKOFF_SECONDS: u64 = 60;

/// Growth factor applied to the backoff after every consecutive failure
pub const BACKOFF_FACTOR: u32 = 2;

/// Fraction of the current delay added at random on top of it
pub const BACKOFF_JITTER_RATIO: f64 = 0.2;

/// Full relist interval in seconds, 0 disables forced resync
pub const DEFAULT_RESYNC_SECONDS: u64 = 60;

/// Watch stream timeout in seconds (294 vs 300 to allow 6 seconds for graceful shutdown)
pub const WATCH_TIMEOUT_SECONDS: u32 = 294;

/// How a relist decides that an entity present before and after changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelistDiff {
    /// Emit an update whenever the version token differs
    #[default]
    ByVersion,
    /// Emit an update only when the entity content differs
    ByContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
    /// 0.0 disables jitter
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(INITIAL_BACKOFF_MILLIS),
            max: Duration::from_secs(MAX_BACKOFF_SECONDS),
            factor: BACKOFF_FACTOR,
            jitter: BACKOFF_JITTER_RATIO,
        }
    }
}

/// Settings for one synchronizer
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// `Duration::ZERO` disables forced resync
    pub resync_interval: Duration,
    pub backoff: BackoffConfig,
    pub relist_diff: RelistDiff,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_SECONDS),
            backoff: BackoffConfig::default(),
            relist_diff: RelistDiff::default(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub const fn relist_diff(mut self, diff: RelistDiff) -> Self {
        self.relist_diff = diff;
        self
    }

    /// The forced resync period, if enabled
    #[must_use]
    pub fn resync_period(&self) -> Option<Duration> {
        (!self.resync_interval.is_zero()).then_some(self.resync_interval)
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(INITIAL_BACKOFF_MILLIS > 0, "INITIAL_BACKOFF_MILLIS must be greater than 0");
    assert!(MAX_BACKOFF_SECONDS > 0, "MAX_BACKOFF_SECONDS must be greater than 0");
    assert!(
        INITIAL_BACKOFF_MILLIS <= MAX_BACKOFF_SECONDS * 1_000,
        "initial backoff must not exceed the cap"
    );
    assert!(BACKOFF_FACTOR >= 1, "BACKOFF_FACTOR must be at least 1");
    assert!(WATCH_TIMEOUT_SECONDS > 0, "WATCH_TIMEOUT_SECONDS must be greater than 0");
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_resync_disables_forced_relist() {
        let config = SyncConfig::default().resync_interval(Duration::ZERO);
        assert_eq!(config.resync_period(), None);

        let config = SyncConfig::default();
        assert_eq!(
            config.resync_period(),
            Some(Duration::from_secs(DEFAULT_RESYNC_SECONDS))
        );
    }
}
