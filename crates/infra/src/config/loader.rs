//! Configuration loader
//!
//! Loads engine configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Load a `.env` file into the environment if one exists
//! 2. Build the config from `TIPSYNC_*` variables when `TIPSYNC_DB_PATH` is set
//! 3. Otherwise fall back to the first config file found by
//!    [`probe_config_paths`]
//! 4. JSON and TOML files are supported
//!
//! ## Environment Variables
//! - `TIPSYNC_DB_PATH`: queue database file path (required)
//! - `TIPSYNC_DB_POOL_SIZE`: connection pool size
//! - `TIPSYNC_SYNC_INTERVAL`: background pass period in seconds
//! - `TIPSYNC_SYNC_ENABLED`: whether timer-driven sync runs (true/false)
//! - `TIPSYNC_SYNC_BATCH_SIZE`: operations per drain page
//! - `TIPSYNC_SYNC_MAX_CONCURRENCY`: entity groups applied at once
//! - `TIPSYNC_SYNC_REMOTE_TIMEOUT_MS`: timeout per remote call
//! - `TIPSYNC_SYNC_MAX_RETRIES`: attempts before dead-lettering
//! - `TIPSYNC_SYNC_INITIAL_DELAY_MS`: first backoff delay
//! - `TIPSYNC_SYNC_BACKOFF_FACTOR`: backoff multiplier
//! - `TIPSYNC_SYNC_MAX_DELAY_MS`: backoff ceiling
//! - `TIPSYNC_SYNC_MAX_RETRY_WINDOW_SECS`: retry window per operation
//! - `TIPSYNC_SYNC_CONFLICT_TOLERANCE_MS`: timestamp skew tolerance
//! - `TIPSYNC_SYNC_CRITICAL_FIELDS`: comma separated field names
//! - `TIPSYNC_CACHE_TTL_SECS`: default cache entry lifetime, 0 for none
//! - `TIPSYNC_CACHE_SWEEP_INTERVAL_SECS`: expired entry sweep period
//! - `TIPSYNC_LOG_LEVEL`: filter used when `RUST_LOG` is unset
//! - `TIPSYNC_LOG_JSON`: emit JSON log lines (true/false)
//!
//! Unset optional variables keep their defaults.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.{json,toml}` and `./tipsync.{json,toml}`
//! 2. The same names one and two directories up
//! 3. The same names relative to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tipsync_domain::{Config, Result, TipSyncError};

const CONFIG_FILE_NAMES: [&str; 4] = ["config.json", "config.toml", "tipsync.json", "tipsync.toml"];
const PARENT_PREFIXES: [&str; 3] = ["", "..", "../.."];

/// Load configuration from the environment, else from a file.
///
/// The result is validated before it is returned.
///
/// # Errors
/// Returns `TipSyncError::Config` if neither source yields a valid config.
pub fn load() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env file");
    }

    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)?
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from `TIPSYNC_*` environment variables.
///
/// # Errors
/// Returns `TipSyncError::Config` if `TIPSYNC_DB_PATH` is missing or any
/// set variable fails to parse.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    config.database.path = env_var("TIPSYNC_DB_PATH")?;
    override_from_env(&mut config.database.pool_size, "TIPSYNC_DB_POOL_SIZE")?;

    let sync = &mut config.sync;
    override_from_env(&mut sync.interval_seconds, "TIPSYNC_SYNC_INTERVAL")?;
    sync.enabled = env_bool("TIPSYNC_SYNC_ENABLED", sync.enabled);
    override_from_env(&mut sync.batch_size, "TIPSYNC_SYNC_BATCH_SIZE")?;
    override_from_env(&mut sync.max_concurrency, "TIPSYNC_SYNC_MAX_CONCURRENCY")?;
    override_from_env(&mut sync.remote_timeout_ms, "TIPSYNC_SYNC_REMOTE_TIMEOUT_MS")?;
    override_from_env(&mut sync.max_retries, "TIPSYNC_SYNC_MAX_RETRIES")?;
    override_from_env(&mut sync.initial_delay_ms, "TIPSYNC_SYNC_INITIAL_DELAY_MS")?;
    override_from_env(&mut sync.backoff_factor, "TIPSYNC_SYNC_BACKOFF_FACTOR")?;
    override_from_env(&mut sync.max_delay_ms, "TIPSYNC_SYNC_MAX_DELAY_MS")?;
    override_from_env(&mut sync.max_retry_window_secs, "TIPSYNC_SYNC_MAX_RETRY_WINDOW_SECS")?;
    override_from_env(&mut sync.conflict_tolerance_ms, "TIPSYNC_SYNC_CONFLICT_TOLERANCE_MS")?;
    if let Ok(fields) = std::env::var("TIPSYNC_SYNC_CRITICAL_FIELDS") {
        sync.critical_fields = fields
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect();
    }

    override_from_env(&mut config.cache.default_ttl_secs, "TIPSYNC_CACHE_TTL_SECS")?;
    override_from_env(&mut config.cache.sweep_interval_secs, "TIPSYNC_CACHE_SWEEP_INTERVAL_SECS")?;

    if let Ok(level) = std::env::var("TIPSYNC_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("TIPSYNC_LOG_JSON", config.logging.json);

    Ok(config)
}

/// Load configuration from a file.
///
/// With `path` set to `None` the first file found by [`probe_config_paths`]
/// is used. Missing sections and fields keep their defaults.
///
/// # Errors
/// Returns `TipSyncError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TipSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TipSyncError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TipSyncError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration text; the format follows the file extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TipSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TipSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(TipSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the working directory, its parents, or
/// next to the executable.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| PARENT_PREFIXES.iter().map(move |prefix| root.join(prefix)))
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| TipSyncError::Config(format!("Missing required environment variable: {key}")))
}

/// Replace `target` with the parsed variable when it is set.
fn override_from_env<T>(target: &mut T, key: &str) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| TipSyncError::Config(format!("Invalid value for {key}: {e}")))?;
    }
    Ok(())
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use once_cell::sync::Lazy;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        for (key, value) in [("TEST_TS_BOOL_1", "1"), ("TEST_TS_BOOL_YES", "yes"), ("TEST_TS_BOOL_UP", "TRUE")] {
            std::env::set_var(key, value);
            assert!(env_bool(key, false), "{value} should parse as true");
            std::env::remove_var(key);
        }
        for (key, value) in [("TEST_TS_BOOL_0", "0"), ("TEST_TS_BOOL_OFF", "off")] {
            std::env::set_var(key, value);
            assert!(!env_bool(key, true), "{value} should parse as false");
            std::env::remove_var(key);
        }

        std::env::remove_var("TEST_TS_BOOL_MISSING");
        assert!(env_bool("TEST_TS_BOOL_MISSING", true));
        assert!(!env_bool("TEST_TS_BOOL_MISSING", false));
    }

    #[test]
    fn test_override_keeps_default_when_unset() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        std::env::remove_var("TEST_TS_UNSET_NUMBER");

        let mut value = 42u32;
        override_from_env(&mut value, "TEST_TS_UNSET_NUMBER").unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_config_toml_partial() {
        let toml_content = r#"
[sync]
max_retries = 5
collections = { delivery = "deliveries", tip = "tips" }
"#;
        let config = parse_config(toml_content, Path::new("test.toml")).unwrap();
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.collections.get("tip").map(String::as_str), Some("tips"));
        assert_eq!(config.database.pool_size, Config::default().database.pool_size);
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("some content", Path::new("test.yaml"));
        assert!(matches!(result, Err(TipSyncError::Config(_))));
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/config.json")));
        assert!(matches!(result, Err(TipSyncError::Config(_))));
    }
}
