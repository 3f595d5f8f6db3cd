//! Domain constants
//!
//! Centralized location for defaults and stable names shared by the sync
//! engine crates.

// Entity type tags
pub const ENTITY_DELIVERY: &str = "delivery";
pub const ENTITY_ADDRESS: &str = "address";
pub const ENTITY_USER_PROFILE: &str = "userProfile";
pub const ENTITY_SUBSCRIPTION_RECORD: &str = "subscriptionRecord";
pub const ENTITY_USER_DEVICE: &str = "userDevice";
pub const ENTITY_CONFIG: &str = "config";
pub const ENTITY_COUNTER: &str = "counter";

// Remote collections
pub const COLLECTION_DELIVERIES: &str = "deliveries";
pub const COLLECTION_ADDRESSES: &str = "addresses";
pub const COLLECTION_USER_PROFILES: &str = "user_profiles";
pub const COLLECTION_SUBSCRIPTION_RECORDS: &str = "subscription_records";
pub const COLLECTION_USER_DEVICES: &str = "user_devices";
pub const COLLECTION_SYSTEM_CONFIG: &str = "system_config";

// Document marker fields inspected by conflict detection
pub const FIELD_UPDATED_AT: &str = "updatedAt";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_LAST_MODIFIED: &str = "lastModified";
pub const FIELD_VERSION: &str = "version";

/// Timestamp markers in lookup priority order.
pub const TIMESTAMP_FIELDS: [&str; 4] =
    [FIELD_UPDATED_AT, FIELD_CREATED_AT, FIELD_TIMESTAMP, FIELD_LAST_MODIFIED];

// ErrorInfo detail keys
pub const DETAIL_OPERATION: &str = "operation";
pub const DETAIL_ENTITY_TYPE: &str = "entityType";
pub const DETAIL_ENTITY_ID: &str = "entityId";

// Sync defaults
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_MAX_DELAY_MS: u64 = 3_600_000;
pub const DEFAULT_MAX_RETRY_WINDOW_SECS: u64 = 86_400;
pub const DEFAULT_CONFLICT_TOLERANCE_MS: i64 = 5_000;

// Cache defaults
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

// Database defaults
pub const DEFAULT_DB_PATH: &str = "tipsync.db";
pub const DEFAULT_DB_POOL_SIZE: u32 = 4;
