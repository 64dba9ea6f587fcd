/*!
 * Backoff schedule for failed caption requests.
 */

use rand::Rng;
use std::time::Duration;

use crate::app_config::CaptionCommonConfig;

/// Longest wait between two attempts of one item
pub const MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Retry limits and delays for one item
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry of a transient failure
    pub base_delay: Duration,
    /// Growth factor per retry
    pub multiplier: f64,
    /// Fixed part of the cooldown after a quota error
    pub quota_cooldown: Duration,
    /// Upper bound of the random part of the quota cooldown
    pub quota_jitter: Duration,
    /// Concurrency forced on the run after a quota error
    pub throttled_concurrency: usize,
    /// Dispatch delay forced on the run after a quota error
    pub throttled_dispatch_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CaptionCommonConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CaptionCommonConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_backoff_ms),
            multiplier: config.backoff_multiplier,
            quota_cooldown: Duration::from_millis(config.quota_cooldown_ms),
            quota_jitter: Duration::from_millis(config.quota_jitter_ms),
            throttled_concurrency: 1,
            throttled_dispatch_delay: Duration::from_millis(config.throttled_dispatch_delay_ms),
        }
    }

    /// Exponential delay after the failure of `attempt` (0-based)
    ///
    /// Saturates at [`MAX_BACKOFF`]. A negative or NaN result falls back to
    /// the base delay.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let seconds = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        match Duration::try_from_secs_f64(seconds) {
            Ok(delay) => delay.min(MAX_BACKOFF),
            Err(_) if seconds.is_nan() || seconds < 0.0 => self.base_delay.min(MAX_BACKOFF),
            Err(_) => MAX_BACKOFF,
        }
    }

    /// Cooldown after a quota error: fixed part plus a random share of the jitter
    pub fn quota_cooldown(&self) -> Duration {
        let jitter_ms = self.quota_jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..jitter_ms)
        };
        self.quota_cooldown + Duration::from_millis(extra)
    }

    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}
