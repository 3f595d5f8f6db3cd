//! Time-based cache shared by repositories and the sync engine
//!
//! Repositories read through this cache and write to it optimistically; the
//! orchestrator refreshes it with confirmed remote values.
//!
//! # Features
//!
//! - **Thread-safe**: backed by `DashMap`, safe to clone and share
//! - **TTL only**: per-entry expiry, a zero TTL never expires, no size bound
//! - **Lazy eviction**: `get`/`contains` drop expired entries on access
//! - **Metrics tracking**: optional hit/miss/insert/expiration counters
//! - **Testable**: Clock abstraction for deterministic time-based testing
//!
//! # Example
//! ```
//! use std::time::Duration;
//!
//! use tipsync_common::cache::{CacheConfig, TtlCache};
//!
//! let cache: TtlCache<String, String> = TtlCache::new(CacheConfig::ttl(Duration::from_secs(300)));
//! cache.put("delivery/d1".to_string(), "{\"tip\":5.0}".to_string());
//! cache.put_with_ttl("config/app".to_string(), "{}".to_string(), Duration::ZERO);
//! assert_eq!(cache.size(), 2);
//! ```

mod config;
mod core;
mod stats;

pub use core::TtlCache;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use stats::CacheStats;
