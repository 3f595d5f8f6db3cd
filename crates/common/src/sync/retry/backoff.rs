// Exponential backoff with an optional jitter band
use std::time::Duration;

use rand::Rng;

use crate::error::{CommonError, CommonResult};
use crate::sync::retry::constants::*;

/// Delay schedule for retrying a failed operation
///
/// `delay(n) = initial_delay * factor^n`, capped at `max_delay`. Jitter is
/// off by default so schedules stay deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    factor: f64,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            factor: DEFAULT_BACKOFF_FACTOR,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with validation
    pub fn new(initial_delay: Duration, factor: f64, max_delay: Duration) -> CommonResult<Self> {
        if !factor.is_finite() || factor < 1.0 {
            return Err(CommonError::config_field(
                "backoff_factor",
                format!("must be a finite value >= 1.0, got {factor}"),
            ));
        }
        if initial_delay > max_delay {
            return Err(CommonError::config(format!(
                "initial_delay ({initial_delay:?}) cannot be greater than max_delay ({max_delay:?})"
            )));
        }
        Ok(Self { initial_delay, factor, max_delay, jitter_factor: 0.0 })
    }

    /// Enable jitter; `factor` is the full spread and is clamped to [0, 1].
    #[must_use]
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Enable the default +/-15% jitter band.
    #[must_use]
    pub fn with_default_jitter(self) -> Self {
        self.with_jitter_factor(DEFAULT_JITTER_FACTOR)
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay to wait after the attempt numbered `retry_count` (0-based).
    pub fn delay(&self, retry_count: u32) -> Duration {
        self.apply_jitter(self.calculate_exponential_delay(retry_count))
    }

    fn calculate_exponential_delay(&self, retry_count: u32) -> Duration {
        let base_millis = self.initial_delay.as_millis() as f64;
        let max_millis = self.max_delay.as_millis() as f64;

        // Cap exponent to prevent overflow
        let exponent = retry_count.min(MAX_BACKOFF_EXPONENT) as i32;
        let delay_millis = base_millis * self.factor.powi(exponent);

        if !delay_millis.is_finite() || delay_millis >= max_millis {
            return self.max_delay;
        }
        Duration::from_millis(delay_millis as u64)
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 {
            return delay;
        }

        let delay_millis = delay.as_millis() as f64;
        let jitter_range = delay_millis * self.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-jitter_range / 2.0..=jitter_range / 2.0);
        let final_millis = (delay_millis + jitter).max(0.0) as u64;

        Duration::from_millis(final_millis)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for sync::retry::backoff.
    use super::*;

    /// Validates `BackoffPolicy::default` for the doubling schedule scenario.
    ///
    /// Assertions:
    /// - Confirms delays are 1 s, 2 s, 4 s for the first three retries.
    #[test]
    fn test_default_schedule_doubles() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }

    /// Validates the ceiling for the large retry count scenario.
    ///
    /// Assertions:
    /// - Confirms the delay never exceeds `max_delay`, even for huge counts.
    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay(12), Duration::from_secs(3_600));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(3_600));
    }

    /// Validates `BackoffPolicy::new` for the invalid parameters scenario.
    ///
    /// Assertions:
    /// - Ensures a shrinking factor is rejected.
    /// - Ensures an initial delay above the ceiling is rejected.
    #[test]
    fn test_new_validates() {
        assert!(BackoffPolicy::new(Duration::from_secs(1), 0.5, Duration::from_secs(10)).is_err());
        assert!(BackoffPolicy::new(Duration::from_secs(20), 2.0, Duration::from_secs(10)).is_err());
        assert!(BackoffPolicy::new(Duration::from_millis(100), 3.0, Duration::from_secs(10)).is_ok());
    }

    /// Validates jitter for the bounded spread scenario.
    ///
    /// Assertions:
    /// - Ensures every jittered delay stays within +/-15% of the base.
    #[test]
    fn test_jitter_stays_in_band() {
        let policy = BackoffPolicy::default().with_default_jitter();

        for _ in 0..100 {
            let delay = policy.delay(3).as_millis();
            assert!((6_800..=9_200).contains(&delay), "delay {delay} outside band");
        }
    }
}
