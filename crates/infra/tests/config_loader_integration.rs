//! Integration tests for configuration loader
//!
//! Exercises file and environment sources end to end.

mod support;

use std::io::Write;

use support::ENV_LOCK;
use tempfile::NamedTempFile;
use tipsync_infra::config;

const ENV_KEYS: [&str; 5] = [
    "TIPSYNC_DB_PATH",
    "TIPSYNC_SYNC_MAX_RETRIES",
    "TIPSYNC_SYNC_CRITICAL_FIELDS",
    "TIPSYNC_SYNC_ENABLED",
    "TIPSYNC_LOG_JSON",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

fn write_config(contents: &str, extension: &str) -> (NamedTempFile, std::path::PathBuf) {
    let mut file = NamedTempFile::new().expect("temp file created");
    file.write_all(contents.as_bytes()).expect("config written");
    let path = file.path().with_extension(extension);
    std::fs::copy(file.path(), &path).expect("config copied");
    (file, path)
}

/// Validates loading a partial JSON config.
///
/// Assertions:
/// - Fields present in the file are applied
/// - Missing sections keep their defaults
#[test]
fn test_load_config_from_json_file() {
    let (_file, path) = write_config(
        r#"{
            "database": { "path": "/tmp/tipsync_integration.db", "pool_size": 2 },
            "sync": { "interval_seconds": 30, "max_retries": 5 }
        }"#,
        "json",
    );

    let config = config::load_from_file(Some(path.clone())).expect("config loads");

    assert_eq!(config.database.path, "/tmp/tipsync_integration.db");
    assert_eq!(config.database.pool_size, 2);
    assert_eq!(config.sync.interval_seconds, 30);
    assert_eq!(config.sync.max_retries, 5);
    assert_eq!(config.cache, tipsync_domain::CacheSettings::default());

    std::fs::remove_file(path).ok();
}

/// Validates loading a TOML config with collection overrides.
///
/// Assertions:
/// - Nested tables deserialize
/// - Logging settings are applied
#[test]
fn test_load_config_from_toml_file() {
    let (_file, path) = write_config(
        r#"
[sync]
critical_fields = ["tipAmount", "status"]

[logging]
level = "debug"
json = true
"#,
        "toml",
    );

    let config = config::load_from_file(Some(path.clone())).expect("config loads");

    assert_eq!(config.sync.critical_fields, vec!["tipAmount".to_string(), "status".to_string()]);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);

    std::fs::remove_file(path).ok();
}

/// Validates a malformed file.
///
/// Assertions:
/// - Parse failures surface as configuration errors
#[test]
fn test_malformed_file_is_config_error() {
    let (_file, path) = write_config("{ not json", "json");

    let err = config::load_from_file(Some(path.clone())).expect_err("malformed config");
    assert!(matches!(err, tipsync_domain::TipSyncError::Config(_)));

    std::fs::remove_file(path).ok();
}

/// Validates environment overrides.
///
/// Assertions:
/// - `TIPSYNC_DB_PATH` is required
/// - Numeric, list and boolean overrides are parsed
#[test]
fn test_load_from_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    clear_env();

    assert!(config::load_from_env().is_err());

    std::env::set_var("TIPSYNC_DB_PATH", "/tmp/env.db");
    std::env::set_var("TIPSYNC_SYNC_MAX_RETRIES", "7");
    std::env::set_var("TIPSYNC_SYNC_CRITICAL_FIELDS", "tipAmount, ,status");
    std::env::set_var("TIPSYNC_SYNC_ENABLED", "off");
    std::env::set_var("TIPSYNC_LOG_JSON", "yes");

    let loaded = config::load_from_env();
    clear_env();
    let config = loaded.expect("env config loads");

    assert_eq!(config.database.path, "/tmp/env.db");
    assert_eq!(config.sync.max_retries, 7);
    assert_eq!(config.sync.critical_fields, vec!["tipAmount".to_string(), "status".to_string()]);
    assert!(!config.sync.enabled);
    assert!(config.logging.json);
}

/// Validates rejection of unparsable overrides.
///
/// Assertions:
/// - A bad number names the offending variable
#[test]
fn test_invalid_env_value_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    clear_env();
    std::env::set_var("TIPSYNC_DB_PATH", "/tmp/env.db");
    std::env::set_var("TIPSYNC_SYNC_MAX_RETRIES", "many");

    let result = config::load_from_env();
    clear_env();

    let message = result.expect_err("invalid override").to_string();
    assert!(message.contains("TIPSYNC_SYNC_MAX_RETRIES"));
}
