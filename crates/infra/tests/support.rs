//! Shared helpers for `tipsync-infra` integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde_json::Value;
use tempfile::TempDir;
use tipsync_domain::{document_from_value, Document, NewPendingOperation, OperationType};
use tipsync_infra::database::{DbManager, SqlitePendingOperationStore};

/// Serializes tests that read or write process environment variables.
pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Temporary database that keeps its directory alive for the test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    pub store: SqlitePendingOperationStore,
    temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let manager = Self::open(&temp_dir);
        let store = SqlitePendingOperationStore::new(Arc::clone(&manager));
        Self { manager, store, temp_dir }
    }

    /// A second manager over the same file, as after an app restart.
    pub fn reopen(&self) -> SqlitePendingOperationStore {
        SqlitePendingOperationStore::new(Self::open(&self.temp_dir))
    }

    fn open(temp_dir: &TempDir) -> Arc<DbManager> {
        let manager = DbManager::new(temp_dir.path().join("tipsync.db"), 4)
            .expect("db manager should be created");
        manager.run_migrations().expect("migrations should apply");
        Arc::new(manager)
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn doc(value: Value) -> Document {
    document_from_value(value).expect("object literal")
}

pub fn operation(
    kind: OperationType,
    entity_type: &str,
    target_id: &str,
    payload: Value,
) -> NewPendingOperation {
    NewPendingOperation::new(kind, entity_type, target_id, "driver-1", payload)
}

pub fn operation_at(
    kind: OperationType,
    target_id: &str,
    created_at: DateTime<Utc>,
) -> NewPendingOperation {
    operation(kind, "delivery", target_id, serde_json::json!({"tipAmount": 1.0}))
        .with_created_at(created_at)
}
