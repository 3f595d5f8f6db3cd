// Constants for retry module
use std::time::Duration;

/// Default maximum number of attempts before an operation is dead-lettered
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default growth factor between consecutive delays
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Default ceiling for a single delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(3_600);

/// Jitter spread when enabled (0.3 = +/-15%)
pub const DEFAULT_JITTER_FACTOR: f64 = 0.3;

/// Maximum exponent for exponential backoff calculation to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 30;
