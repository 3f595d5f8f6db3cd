//! Cache configuration types and builder

use std::time::Duration;

/// Configuration for [`TtlCache`](super::TtlCache)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime applied by `put` (None = entries never expire)
    pub default_ttl: Option<Duration>,

    /// Whether to collect hit/miss/expiration counters
    pub track_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { default_ttl: None, track_metrics: true }
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Preset where `put` expires entries after `duration`.
    ///
    /// A zero duration means entries never expire.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use tipsync_common::cache::CacheConfig;
    ///
    /// let config = CacheConfig::ttl(Duration::from_secs(300));
    /// assert_eq!(config.default_ttl, Some(Duration::from_secs(300)));
    /// ```
    pub fn ttl(duration: Duration) -> Self {
        Self { default_ttl: normalize_ttl(Some(duration)), ..Self::default() }
    }

    /// Preset with no default expiry.
    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Zero TTL is the "never expires" sentinel.
pub(crate) fn normalize_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|d| !d.is_zero())
}

/// Builder for CacheConfig with fluent API
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = normalize_ttl(Some(ttl));
        self
    }

    #[must_use]
    pub fn track_metrics(mut self, enabled: bool) -> Self {
        self.config.track_metrics = enabled;
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}
