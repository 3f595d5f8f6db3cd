//! SQLite-backed implementation of the pending operation queue port.
//!
//! Every call borrows a pooled connection inside `spawn_blocking`. State
//! transitions are single statements, so each one is atomic on its own.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tipsync_core::PendingOperationStore;
use tipsync_domain::{
    Document, ErrorInfo, NewPendingOperation, OperationId, OperationStatus, OperationType,
    PendingOperation, Result as DomainResult, TipSyncError,
};
use tokio::task;
use tracing::{debug, warn};

use super::manager::{map_sql_error, DbManager, SqliteConnection};
use crate::errors::InfraError;

/// Durable pending operation queue.
pub struct SqlitePendingOperationStore {
    db: Arc<DbManager>,
}

impl SqlitePendingOperationStore {
    /// Queue over an already migrated database.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Run `work` on a pooled connection off the async runtime.
    async fn with_connection<T, F>(&self, work: F) -> DomainResult<T>
    where
        F: FnOnce(&SqliteConnection) -> DomainResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> DomainResult<T> {
            let conn = db.get_connection()?;
            work(&conn)
        })
        .await
        .map_err(map_join_error)?
    }

    fn insert(conn: &SqliteConnection, op: &NewPendingOperation) -> DomainResult<PendingOperation> {
        let payload = serde_json::to_string(&op.payload)?;
        let base = op.base_snapshot.as_ref().map(serde_json::to_string).transpose()?;

        conn.execute(
            INSERT_SQL,
            params![
                op.operation_type.as_str(),
                op.entity_type,
                op.target_id,
                op.owner_id,
                payload,
                base,
                to_millis(op.created_at),
                OperationStatus::Pending.as_str(),
            ],
        )
        .map_err(map_sql_error)?;

        Ok(PendingOperation::from_new(conn.last_insert_rowid(), op.clone()))
    }

    fn query(
        conn: &SqliteConnection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> DomainResult<Vec<PendingOperation>> {
        let mut stmt = conn.prepare(sql).map_err(map_sql_error)?;
        let rows = stmt.query_map(params, map_operation_row).map_err(map_sql_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
    }

    fn count(conn: &SqliteConnection, sql: &str, params: impl rusqlite::Params) -> DomainResult<u64> {
        let count: i64 = conn.query_row(sql, params, |row| row.get(0)).map_err(map_sql_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn changed(conn: &SqliteConnection, sql: &str, params: impl rusqlite::Params) -> DomainResult<usize> {
        conn.execute(sql, params).map_err(map_sql_error)
    }

    /// Load one record; used by tests and diagnostics.
    pub async fn get(&self, id: OperationId) -> DomainResult<Option<PendingOperation>> {
        self.with_connection(move |conn| {
            conn.query_row(SELECT_BY_ID_SQL, params![id], map_operation_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
    }
}

#[async_trait]
impl PendingOperationStore for SqlitePendingOperationStore {
    async fn enqueue(&self, operation: NewPendingOperation) -> DomainResult<PendingOperation> {
        let stored = self.with_connection(move |conn| Self::insert(conn, &operation)).await?;
        debug!(operation_id = stored.id, entity = %stored.entity_key(), "persisted pending operation");
        Ok(stored)
    }

    async fn dequeue_batch(&self, limit: usize) -> DomainResult<Vec<PendingOperation>> {
        self.dequeue_batch_after(0, limit).await
    }

    async fn dequeue_batch_after(
        &self,
        after: OperationId,
        limit: usize,
    ) -> DomainResult<Vec<PendingOperation>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = usize_to_i64(limit);
        self.with_connection(move |conn| Self::query(conn, DEQUEUE_AFTER_SQL, params![after, limit]))
            .await
    }

    async fn get_retryable(&self, max_retries: u32) -> DomainResult<Vec<PendingOperation>> {
        self.with_connection(move |conn| Self::query(conn, RETRYABLE_SQL, params![max_retries]))
            .await
    }

    async fn mark_attempt(
        &self,
        id: OperationId,
        attempted_at: DateTime<Utc>,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> DomainResult<bool> {
        let attempted = to_millis(attempted_at);
        let gate = next_attempt_at.map(to_millis);
        let changed = self
            .with_connection(move |conn| {
                Self::changed(conn, MARK_ATTEMPT_SQL, params![attempted, gate, id])
            })
            .await?;
        Ok(changed > 0)
    }

    async fn remove(&self, id: OperationId) -> DomainResult<bool> {
        let changed =
            self.with_connection(move |conn| Self::changed(conn, DELETE_BY_ID_SQL, params![id])).await?;
        Ok(changed > 0)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> DomainResult<usize> {
        let cutoff = to_millis(cutoff);
        self.with_connection(move |conn| Self::changed(conn, PURGE_FAILED_SQL, params![cutoff])).await
    }

    async fn mark_failed(&self, id: OperationId, error: &ErrorInfo) -> DomainResult<bool> {
        let error = serde_json::to_string(error)?;
        let changed = self
            .with_connection(move |conn| Self::changed(conn, MARK_FAILED_SQL, params![error, id]))
            .await?;
        Ok(changed > 0)
    }

    async fn list_failed(&self) -> DomainResult<Vec<PendingOperation>> {
        self.with_connection(|conn| {
            Self::query(conn, LIST_BY_STATUS_SQL, params![OperationStatus::Failed.as_str()])
        })
        .await
    }

    async fn retry_failed(&self, id: OperationId, requeued_at: DateTime<Utc>) -> DomainResult<bool> {
        let requeued = to_millis(requeued_at);
        let changed = self
            .with_connection(move |conn| {
                Self::changed(conn, RETRY_FAILED_SQL, params![requeued, id])
            })
            .await?;
        Ok(changed > 0)
    }

    async fn retry_all_failed(&self, requeued_at: DateTime<Utc>) -> DomainResult<usize> {
        let requeued = to_millis(requeued_at);
        self.with_connection(move |conn| {
            Self::changed(conn, RETRY_ALL_FAILED_SQL, params![requeued])
        })
        .await
    }

    async fn cancel(&self, id: OperationId) -> DomainResult<bool> {
        self.remove(id).await
    }

    async fn pending_count(&self) -> DomainResult<u64> {
        self.with_connection(|conn| {
            Self::count(conn, COUNT_BY_STATUS_SQL, params![OperationStatus::Pending.as_str()])
        })
        .await
    }

    async fn failed_count(&self) -> DomainResult<u64> {
        self.with_connection(|conn| {
            Self::count(conn, COUNT_BY_STATUS_SQL, params![OperationStatus::Failed.as_str()])
        })
        .await
    }

    async fn list_for_owner(&self, owner_id: &str) -> DomainResult<Vec<PendingOperation>> {
        let owner_id = owner_id.to_string();
        self.with_connection(move |conn| Self::query(conn, LIST_FOR_OWNER_SQL, params![owner_id]))
            .await
    }

    async fn list_by_type(
        &self,
        operation_type: OperationType,
        owner_id: &str,
    ) -> DomainResult<Vec<PendingOperation>> {
        let owner_id = owner_id.to_string();
        self.with_connection(move |conn| {
            Self::query(conn, LIST_BY_TYPE_SQL, params![operation_type.as_str(), owner_id])
        })
        .await
    }

    async fn find_by_target_and_type(
        &self,
        target_id: &str,
        operation_type: OperationType,
    ) -> DomainResult<Vec<PendingOperation>> {
        let target_id = target_id.to_string();
        self.with_connection(move |conn| {
            Self::query(conn, FIND_BY_TARGET_SQL, params![target_id, operation_type.as_str()])
        })
        .await
    }

    async fn has_pending_for(&self, entity_type: &str, target_id: &str) -> DomainResult<bool> {
        let entity_type = entity_type.to_string();
        let target_id = target_id.to_string();
        self.with_connection(move |conn| {
            conn.query_row(HAS_PENDING_SQL, params![entity_type, target_id], |row| row.get(0))
                .map_err(map_sql_error)
        })
        .await
    }

    async fn delete_all_for_owner(&self, owner_id: &str) -> DomainResult<usize> {
        let owner_id = owner_id.to_string();
        self.with_connection(move |conn| Self::changed(conn, DELETE_FOR_OWNER_SQL, params![owner_id]))
            .await
    }
}

/* -------------------------------------------------------------------------- */
/* SQL */
/* -------------------------------------------------------------------------- */

const INSERT_SQL: &str = "INSERT INTO pending_operations (
        operation_type, entity_type, target_id, owner_id, payload, base_snapshot, created_at, status
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const SELECT_BY_ID_SQL: &str = concat!(
    "SELECT id, operation_type, entity_type, target_id, owner_id, payload, base_snapshot, ",
    "retry_count, created_at, last_attempt_at, next_attempt_at, status, last_error, requeued_at ",
    "FROM pending_operations WHERE id = ?1"
);

const DEQUEUE_AFTER_SQL: &str = concat!(
    "SELECT id, operation_type, entity_type, target_id, owner_id, payload, base_snapshot, ",
    "retry_count, created_at, last_attempt_at, next_attempt_at, status, last_error, requeued_at ",
    "FROM pending_operations WHERE status = 'pending' AND id > ?1 ORDER BY id ASC LIMIT ?2"
);

const RETRYABLE_SQL: &str = concat!(
    "SELECT id, operation_type, entity_type, target_id, owner_id, payload, base_snapshot, ",
    "retry_count, created_at, last_attempt_at, next_attempt_at, status, last_error, requeued_at ",
    "FROM pending_operations WHERE status = 'pending' AND retry_count < ?1 ",
    "ORDER BY last_attempt_at ASC, id ASC"
);

const LIST_BY_STATUS_SQL: &str = concat!(
    "SELECT id, operation_type, entity_type, target_id, owner_id, payload, base_snapshot, ",
    "retry_count, created_at, last_attempt_at, next_attempt_at, status, last_error, requeued_at ",
    "FROM pending_operations WHERE status = ?1 ORDER BY id ASC"
);

const LIST_FOR_OWNER_SQL: &str = concat!(
    "SELECT id, operation_type, entity_type, target_id, owner_id, payload, base_snapshot, ",
    "retry_count, created_at, last_attempt_at, next_attempt_at, status, last_error, requeued_at ",
    "FROM pending_operations WHERE owner_id = ?1 ORDER BY id ASC"
);

const LIST_BY_TYPE_SQL: &str = concat!(
    "SELECT id, operation_type, entity_type, target_id, owner_id, payload, base_snapshot, ",
    "retry_count, created_at, last_attempt_at, next_attempt_at, status, last_error, requeued_at ",
    "FROM pending_operations WHERE status = 'pending' AND operation_type = ?1 AND owner_id = ?2 ",
    "ORDER BY id ASC"
);

const FIND_BY_TARGET_SQL: &str = concat!(
    "SELECT id, operation_type, entity_type, target_id, owner_id, payload, base_snapshot, ",
    "retry_count, created_at, last_attempt_at, next_attempt_at, status, last_error, requeued_at ",
    "FROM pending_operations WHERE status = 'pending' AND target_id = ?1 AND operation_type = ?2 ",
    "ORDER BY id ASC"
);

const HAS_PENDING_SQL: &str = "SELECT EXISTS(
        SELECT 1 FROM pending_operations
        WHERE status = 'pending' AND entity_type = ?1 AND target_id = ?2
    )";

const COUNT_BY_STATUS_SQL: &str = "SELECT COUNT(*) FROM pending_operations WHERE status = ?1";

const MARK_ATTEMPT_SQL: &str = "UPDATE pending_operations
    SET retry_count = retry_count + 1, last_attempt_at = ?1, next_attempt_at = ?2
    WHERE id = ?3 AND status = 'pending'";

const MARK_FAILED_SQL: &str = "UPDATE pending_operations
    SET status = 'failed', last_error = ?1
    WHERE id = ?2";

const RETRY_FAILED_SQL: &str = "UPDATE pending_operations
    SET status = 'pending', retry_count = 0, next_attempt_at = NULL, last_error = NULL,
        requeued_at = ?1
    WHERE id = ?2 AND status = 'failed'";

const RETRY_ALL_FAILED_SQL: &str = "UPDATE pending_operations
    SET status = 'pending', retry_count = 0, next_attempt_at = NULL, last_error = NULL,
        requeued_at = ?1
    WHERE status = 'failed'";

const DELETE_BY_ID_SQL: &str = "DELETE FROM pending_operations WHERE id = ?1";

const PURGE_FAILED_SQL: &str =
    "DELETE FROM pending_operations WHERE status = 'failed' AND created_at < ?1";

const DELETE_FOR_OWNER_SQL: &str = "DELETE FROM pending_operations WHERE owner_id = ?1";

/* -------------------------------------------------------------------------- */
/* Row mapping */
/* -------------------------------------------------------------------------- */

fn map_operation_row(row: &Row<'_>) -> rusqlite::Result<PendingOperation> {
    let id: OperationId = row.get(0)?;
    let operation_type: String = row.get(1)?;
    let payload: String = row.get(5)?;
    let base_snapshot: Option<String> = row.get(6)?;
    let status_raw: String = row.get(11)?;
    let last_error: Option<String> = row.get(12)?;

    Ok(PendingOperation {
        id,
        operation_type: operation_type
            .parse::<OperationType>()
            .map_err(|err| conversion_error(1, err))?,
        entity_type: row.get(2)?,
        target_id: row.get(3)?,
        owner_id: row.get(4)?,
        payload: serde_json::from_str(&payload).map_err(|err| conversion_error(5, err))?,
        base_snapshot: base_snapshot
            .map(|raw| serde_json::from_str::<Document>(&raw))
            .transpose()
            .map_err(|err| conversion_error(6, err))?,
        retry_count: row.get(7)?,
        created_at: from_millis(8, row.get(8)?)?,
        last_attempt_at: row.get::<_, Option<i64>>(9)?.map(|ms| from_millis(9, ms)).transpose()?,
        next_attempt_at: row.get::<_, Option<i64>>(10)?.map(|ms| from_millis(10, ms)).transpose()?,
        status: parse_status(id, &status_raw),
        last_error: last_error.and_then(|raw| parse_error_info(id, &raw)),
        requeued_at: row.get::<_, Option<i64>>(13)?.map(|ms| from_millis(13, ms)).transpose()?,
    })
}

fn parse_status(id: OperationId, raw: &str) -> OperationStatus {
    match raw.parse::<OperationStatus>() {
        Ok(status) => status,
        Err(err) => {
            warn!(
                operation_id = id,
                raw_status = %raw,
                error = %err,
                "invalid operation status in queue, defaulting to pending"
            );
            OperationStatus::Pending
        }
    }
}

fn parse_error_info(id: OperationId, raw: &str) -> Option<ErrorInfo> {
    match serde_json::from_str(raw) {
        Ok(info) => Some(info),
        Err(err) => {
            warn!(operation_id = id, error = %err, "unreadable last_error in queue, dropping it");
            None
        }
    }
}

fn conversion_error(
    column: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, err.into())
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

fn map_join_error(err: task::JoinError) -> TipSyncError {
    TipSyncError::from(InfraError::from(err))
}

fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;
    use tipsync_domain::ErrorKind;

    use super::*;

    async fn setup_store() -> (SqlitePendingOperationStore, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("queue.db"), 2).expect("manager created");
        manager.run_migrations().expect("migrations applied");
        (SqlitePendingOperationStore::new(Arc::new(manager)), temp_dir)
    }

    fn update(target: &str) -> NewPendingOperation {
        NewPendingOperation::new(OperationType::Update, "delivery", target, "driver-1", json!({"tipAmount": 5.0}))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_assigns_increasing_ids() {
        let (store, _dir) = setup_store().await;

        let first = store.enqueue(update("D1")).await.expect("enqueue");
        let second = store.enqueue(update("D2")).await.expect("enqueue");

        assert!(second.id > first.id);
        assert_eq!(store.pending_count().await.expect("count"), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dequeue_with_zero_limit_returns_empty() {
        let (store, _dir) = setup_store().await;
        store.enqueue(update("D1")).await.expect("enqueue");

        assert!(store.dequeue_batch(0).await.expect("dequeue").is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_attempt_on_failed_record_is_ignored() {
        let (store, _dir) = setup_store().await;
        let op = store.enqueue(update("D1")).await.expect("enqueue");
        store
            .mark_failed(op.id, &ErrorInfo::new(ErrorKind::Auth, "denied"))
            .await
            .expect("mark failed");

        assert!(!store.mark_attempt(op.id, Utc::now(), None).await.expect("mark attempt"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_record_reports_false() {
        let (store, _dir) = setup_store().await;

        assert!(!store.remove(404).await.expect("remove"));
        assert!(!store.retry_failed(404, Utc::now()).await.expect("retry"));
        assert!(store.get(404).await.expect("get").is_none());
    }
}
