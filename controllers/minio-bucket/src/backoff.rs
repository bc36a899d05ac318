//! # Per-key exponential backoff
//!
//! Retry delays for failed reconciles. Each key carries its own failure
//! count, so one broken bucket does not slow down the others. The delay
//! doubles per consecutive failure from a 5ms base and is capped at 1000s.
//!
//! Sequence: 5ms, 10ms, 20ms, 40ms, ... 1000s (max)

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Default first retry delay
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default upper bound for any retry delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Minimum delay before retrying a configuration defect (ambiguous selector)
pub const CONFIG_DEFECT_MIN_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff calculator
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay for the given number of previous failures (stateless)
    ///
    /// `failures` is 0 for the first retry, which waits `base`.
    #[must_use]
    pub fn calculate_for_failures(&self, failures: u32) -> Duration {
        // 2^32 * 5ms is far past any sane cap; clamp the shift to avoid overflow
        let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Per-key rate limiter backing `WorkQueue::add_rate_limited`
#[derive(Debug, Default)]
pub struct RateLimiter {
    backoff: ExponentialBackoff,
    failures: Mutex<HashMap<String, u32>>,
}

impl RateLimiter {
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before the next retry of `key`, counting this call as a failure
    pub fn when(&self, key: &str) -> Duration {
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let count = failures.entry(key.to_string()).or_insert(0);
        let delay = self.backoff.calculate_for_failures(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Reset the failure count after a successful pass
    pub fn forget(&self, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }

    /// Number of failures recorded for `key` since the last `forget`
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}
