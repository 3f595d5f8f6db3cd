//! Configuration management

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::{Result, TipSyncError};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub cache: CacheSettings,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            return Err(TipSyncError::Config("database.pool_size must be at least 1".into()));
        }
        self.sync.validate()
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: DEFAULT_DB_PATH.to_string(), pool_size: DEFAULT_DB_POOL_SIZE }
    }
}

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Timer period for background drain passes
    pub interval_seconds: u64,
    /// Whether timer-driven background sync runs
    pub enabled: bool,
    pub batch_size: usize,
    /// Entity groups applied concurrently within one page
    pub max_concurrency: usize,
    pub remote_timeout_ms: u64,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    /// Ceiling for a single backoff delay
    pub max_delay_ms: u64,
    /// Operations older than this are dead-lettered regardless of retry count
    pub max_retry_window_secs: u64,
    pub conflict_tolerance_ms: i64,
    /// Fields always compared during conflict detection
    pub critical_fields: Vec<String>,
    /// Remote collection per entity type
    pub collections: BTreeMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_SYNC_INTERVAL_SECS,
            enabled: true,
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_retry_window_secs: DEFAULT_MAX_RETRY_WINDOW_SECS,
            conflict_tolerance_ms: DEFAULT_CONFLICT_TOLERANCE_MS,
            critical_fields: Vec::new(),
            collections: default_collections(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_retry_window(&self) -> Duration {
        Duration::from_secs(self.max_retry_window_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TipSyncError::Config("sync.batch_size must be at least 1".into()));
        }
        if self.max_concurrency == 0 {
            return Err(TipSyncError::Config("sync.max_concurrency must be at least 1".into()));
        }
        if self.remote_timeout_ms == 0 {
            return Err(TipSyncError::Config("sync.remote_timeout_ms must be positive".into()));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(TipSyncError::Config(format!(
                "sync.backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(TipSyncError::Config(format!(
                "sync.initial_delay_ms ({}) cannot exceed sync.max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        if self.conflict_tolerance_ms < 0 {
            return Err(TipSyncError::Config("sync.conflict_tolerance_ms cannot be negative".into()));
        }
        Ok(())
    }
}

/// Collection routing used when no override is configured.
pub fn default_collections() -> BTreeMap<String, String> {
    [
        (ENTITY_USER_PROFILE, COLLECTION_USER_PROFILES),
        (ENTITY_SUBSCRIPTION_RECORD, COLLECTION_SUBSCRIPTION_RECORDS),
        (ENTITY_ADDRESS, COLLECTION_ADDRESSES),
        (ENTITY_DELIVERY, COLLECTION_DELIVERIES),
        (ENTITY_USER_DEVICE, COLLECTION_USER_DEVICES),
        (ENTITY_CONFIG, COLLECTION_SYSTEM_CONFIG),
    ]
    .into_iter()
    .map(|(entity, collection)| (entity.to_string(), collection.to_string()))
    .collect()
}

/// In-memory cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Default entry lifetime; 0 keeps entries until removed
    pub default_ttl_secs: u64,
    /// Period of the background expired-entry sweep
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            sweep_interval_secs: DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
        }
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_secs > 0).then(|| Duration::from_secs(self.default_ttl_secs))
    }
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
