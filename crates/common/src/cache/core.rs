//! TTL cache implementation
//!
//! Entries expire by time only. There is no size bound and no LRU; an
//! expired entry is logically absent even while it is still stored, and is
//! removed the next time it is read or swept.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::config::{normalize_ttl, CacheConfig};
use super::stats::{CacheStats, MetricsCollector};
use crate::testing::{Clock, SystemClock};

/// Entry stored in the cache with its expiry metadata
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    updated_at: DateTime<Utc>,
    /// Monotonic deadline used for expiry checks
    expires_at: Option<Instant>,
    /// Wall-clock form of `expires_at`, reported to callers
    expires_at_utc: Option<DateTime<Utc>>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }
}

/// Thread-safe key/value cache with per-entry expiry
///
/// # Type Parameters
/// - `K`: Key type (must be `Eq + Hash + Clone`)
/// - `V`: Value type (must be `Clone`)
/// - `C`: Clock type for time-based operations (defaults to `SystemClock`)
///
/// # Example
/// ```
/// use std::time::Duration;
///
/// use tipsync_common::cache::{CacheConfig, TtlCache};
///
/// let cache: TtlCache<String, i32> = TtlCache::new(CacheConfig::ttl(Duration::from_secs(60)));
/// cache.put("tip".to_string(), 5);
/// assert_eq!(cache.get(&"tip".to_string()), Some(5));
/// ```
pub struct TtlCache<K, V, C = SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    entries: Arc<DashMap<K, CacheEntry<V>>>,
    config: CacheConfig,
    metrics: MetricsCollector,
    clock: C,
}

impl<K, V> TtlCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> TtlCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock + Clone,
{
    /// Create a cache that reads time from `clock` (useful for testing)
    pub fn with_clock(config: CacheConfig, clock: C) -> Self {
        Self { entries: Arc::new(DashMap::new()), config, metrics: MetricsCollector::default(), clock }
    }

    /// Insert using the cache-wide default TTL.
    pub fn put(&self, key: K, value: V) {
        self.insert_entry(key, value, self.config.default_ttl);
    }

    /// Insert with an explicit TTL; `Duration::ZERO` means never expires.
    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.insert_entry(key, value, normalize_ttl(Some(ttl)));
    }

    /// Insert every pair with the default TTL, returning how many were stored.
    pub fn put_all<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
    {
        items.into_iter().fold(0, |count, (key, value)| {
            self.put(key, value);
            count + 1
        })
    }

    /// Value for `key`, evicting it first if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let found = self.entries.get(key).map(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        });

        match found {
            Some(Some(value)) => {
                self.record(MetricsCollector::record_hit);
                Some(value)
            }
            Some(None) => {
                self.evict_if_expired(key, now);
                self.record(MetricsCollector::record_miss);
                None
            }
            None => {
                self.record(MetricsCollector::record_miss);
                None
            }
        }
    }

    /// True when a live entry exists; evicts an expired one.
    pub fn contains(&self, key: &K) -> bool {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return false,
        };
        if expired {
            self.evict_if_expired(key, now);
        }
        !expired
    }

    /// Remove an entry, returning whether one was stored.
    pub fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
        if self.config.track_metrics {
            self.metrics.reset();
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 && self.config.track_metrics {
            self.metrics.record_expirations(removed as u64);
        }
        removed
    }

    /// Number of live entries; expired ones are swept first.
    pub fn size(&self) -> usize {
        self.clear_expired();
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Keys of live entries, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// When the live entry for `key` was last written.
    pub fn last_updated(&self, key: &K) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.entries.get(key).filter(|entry| !entry.is_expired(now)).map(|entry| entry.updated_at)
    }

    /// Expiry of the live entry for `key`; `Some(None)` means it never expires.
    pub fn expiration_time(&self, key: &K) -> Option<Option<DateTime<Utc>>> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at_utc)
    }

    /// True only when an entry is stored and past its deadline.
    pub fn is_expired(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.entries.get(key).is_some_and(|entry| entry.is_expired(now))
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.size();
        self.metrics.snapshot(size)
    }

    fn insert_entry(&self, key: K, value: V, ttl: Option<Duration>) {
        let now = self.clock.now();
        let updated_at = self.clock.utc_now();
        let entry = CacheEntry {
            value,
            updated_at,
            // deadlines past the clock's range never expire
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
            expires_at_utc: ttl
                .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
                .and_then(|ttl| updated_at.checked_add_signed(ttl)),
        };
        self.entries.insert(key, entry);
        self.record(MetricsCollector::record_insert);
    }

    fn evict_if_expired(&self, key: &K, now: Instant) {
        if self.entries.remove_if(key, |_, entry| entry.is_expired(now)).is_some() {
            self.record(|metrics| metrics.record_expirations(1));
        }
    }

    fn record(&self, f: impl FnOnce(&MetricsCollector)) {
        if self.config.track_metrics {
            f(&self.metrics);
        }
    }
}

impl<K, V, C> Clone for TtlCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock + Clone,
{
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            clock: self.clock.clone(),
        }
    }
}
