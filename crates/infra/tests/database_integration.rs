//! Integration tests for the SQLite pending operation queue

mod support;

use chrono::{Duration, Utc};
use serde_json::json;
use support::{doc, operation, operation_at, TestDatabase};
use tipsync_core::PendingOperationStore;
use tipsync_domain::{ErrorInfo, ErrorKind, OperationStatus, OperationType};
use tipsync_infra::database::SCHEMA_VERSION;

/// Validates FIFO paging across dequeue calls.
///
/// Assertions:
/// - `dequeue_batch` returns the oldest operations in id order
/// - `dequeue_batch_after` continues after the last id seen
#[tokio::test(flavor = "multi_thread")]
async fn test_dequeue_pages_in_fifo_order() {
    let db = TestDatabase::new();
    let mut ids = Vec::new();
    for target in ["D1", "D2", "D3"] {
        let op = db
            .store
            .enqueue(operation(OperationType::Create, "delivery", target, json!({"tipAmount": 2})))
            .await
            .expect("enqueue");
        ids.push(op.id);
    }

    let first = db.store.dequeue_batch(2).await.expect("first page");
    assert_eq!(first.iter().map(|op| op.id).collect::<Vec<_>>(), ids[..2].to_vec());

    let last_seen = first.last().map(|op| op.id).unwrap_or_default();
    let second = db.store.dequeue_batch_after(last_seen, 2).await.expect("second page");
    assert_eq!(second.iter().map(|op| op.id).collect::<Vec<_>>(), vec![ids[2]]);
}

/// Validates that queued records survive a restart with all fields intact.
///
/// Assertions:
/// - Payload and base snapshot are restored as JSON
/// - Attempt bookkeeping persists
#[tokio::test(flavor = "multi_thread")]
async fn test_records_survive_reopen() {
    let db = TestDatabase::new();
    let base = doc(json!({"tipAmount": 3.0, "updatedAt": "2026-10-01T10:00:00Z"}));
    let queued = db
        .store
        .enqueue(
            operation(OperationType::Update, "delivery", "D1", json!({"tipAmount": 5.0}))
                .with_base_snapshot(Some(base.clone())),
        )
        .await
        .expect("enqueue");

    let attempted_at = Utc::now();
    let gate = attempted_at + Duration::seconds(2);
    assert!(db.store.mark_attempt(queued.id, attempted_at, Some(gate)).await.expect("attempt"));

    let reopened = db.reopen();
    let restored = reopened.get(queued.id).await.expect("get").expect("record present");

    assert_eq!(restored.payload, json!({"tipAmount": 5.0}));
    assert_eq!(restored.base_snapshot, Some(base));
    assert_eq!(restored.retry_count, 1);
    assert_eq!(
        restored.last_attempt_at.map(|at| at.timestamp_millis()),
        Some(attempted_at.timestamp_millis())
    );
    assert_eq!(restored.next_attempt_at.map(|at| at.timestamp_millis()), Some(gate.timestamp_millis()));
    assert_eq!(restored.status, OperationStatus::Pending);
}

/// Validates the dead-letter lifecycle.
///
/// Assertions:
/// - Failed records leave the dequeue results and keep their error
/// - `retry_failed` resets the retry budget and backoff gate and stamps
///   the requeue time that restarts the retry window
/// - `retry_all_failed` only touches failed records
#[tokio::test(flavor = "multi_thread")]
async fn test_dead_letter_lifecycle() {
    let db = TestDatabase::new();
    let first = db.store.enqueue(operation_at(OperationType::Update, "D1", Utc::now())).await.expect("enqueue");
    let second = db.store.enqueue(operation_at(OperationType::Update, "D2", Utc::now())).await.expect("enqueue");

    db.store
        .mark_attempt(first.id, Utc::now(), Some(Utc::now() + Duration::seconds(30)))
        .await
        .expect("attempt");
    let error = ErrorInfo::new(ErrorKind::Auth, "permission denied");
    assert!(db.store.mark_failed(first.id, &error).await.expect("mark failed"));

    assert_eq!(db.store.pending_count().await.expect("pending"), 1);
    assert_eq!(db.store.failed_count().await.expect("failed"), 1);
    let pending = db.store.dequeue_batch(10).await.expect("dequeue");
    assert_eq!(pending.iter().map(|op| op.id).collect::<Vec<_>>(), vec![second.id]);

    let failed = db.store.list_failed().await.expect("list failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].last_error.as_ref().map(|e| e.kind), Some(ErrorKind::Auth));

    let requeued_at = Utc::now();
    assert!(db.store.retry_failed(first.id, requeued_at).await.expect("retry"));
    let requeued = db.store.get(first.id).await.expect("get").expect("present");
    assert_eq!(requeued.status, OperationStatus::Pending);
    assert_eq!(requeued.retry_count, 0);
    assert!(requeued.next_attempt_at.is_none());
    assert!(requeued.last_error.is_none());
    assert_eq!(
        requeued.requeued_at.map(|at| at.timestamp_millis()),
        Some(requeued_at.timestamp_millis())
    );

    assert_eq!(db.store.retry_all_failed(Utc::now()).await.expect("retry all"), 0);
}

/// Validates that purging only removes old dead letters.
///
/// Assertions:
/// - Old pending records are kept
/// - Recent failed records are kept
#[tokio::test(flavor = "multi_thread")]
async fn test_purge_removes_old_failed_records_only() {
    let db = TestDatabase::new();
    let now = Utc::now();
    let old = now - Duration::days(10);
    let error = ErrorInfo::new(ErrorKind::Validation, "rejected");

    let old_failed = db.store.enqueue(operation_at(OperationType::Update, "D1", old)).await.expect("enqueue");
    let old_pending = db.store.enqueue(operation_at(OperationType::Update, "D2", old)).await.expect("enqueue");
    let new_failed = db.store.enqueue(operation_at(OperationType::Update, "D3", now)).await.expect("enqueue");
    db.store.mark_failed(old_failed.id, &error).await.expect("fail");
    db.store.mark_failed(new_failed.id, &error).await.expect("fail");

    let purged = db.store.purge_older_than(now - Duration::days(7)).await.expect("purge");

    assert_eq!(purged, 1);
    assert!(db.store.get(old_failed.id).await.expect("get").is_none());
    assert!(db.store.get(old_pending.id).await.expect("get").is_some());
    assert!(db.store.get(new_failed.id).await.expect("get").is_some());
}

/// Validates owner and target queries.
///
/// Assertions:
/// - `list_for_owner` includes failed records
/// - Type and target lookups only return pending records
/// - `has_pending_for` matches on entity type and id
/// - `delete_all_for_owner` leaves other owners untouched
#[tokio::test(flavor = "multi_thread")]
async fn test_owner_and_target_queries() {
    let db = TestDatabase::new();
    let create = db
        .store
        .enqueue(operation(OperationType::Create, "address", "A1", json!({"street": "Main"})))
        .await
        .expect("enqueue");
    let update = db
        .store
        .enqueue(operation(OperationType::Update, "address", "A1", json!({"street": "Elm"})))
        .await
        .expect("enqueue");
    db.store
        .enqueue(
            tipsync_domain::NewPendingOperation::new(
                OperationType::Delete,
                "delivery",
                "D9",
                "driver-2",
                json!({}),
            ),
        )
        .await
        .expect("enqueue");
    db.store.mark_failed(create.id, &ErrorInfo::new(ErrorKind::Validation, "bad")).await.expect("fail");

    assert_eq!(db.store.list_for_owner("driver-1").await.expect("owner").len(), 2);
    assert!(db.store.list_by_type(OperationType::Create, "driver-1").await.expect("by type").is_empty());

    let by_target =
        db.store.find_by_target_and_type("A1", OperationType::Update).await.expect("by target");
    assert_eq!(by_target.iter().map(|op| op.id).collect::<Vec<_>>(), vec![update.id]);

    assert!(db.store.has_pending_for("address", "A1").await.expect("has pending"));
    assert!(!db.store.has_pending_for("delivery", "A1").await.expect("has pending"));

    assert_eq!(db.store.delete_all_for_owner("driver-1").await.expect("delete"), 2);
    assert_eq!(db.store.pending_count().await.expect("count"), 1);
}

/// Validates retryable selection ordering.
///
/// Assertions:
/// - Records at the retry cap are excluded
/// - Never-attempted records come before attempted ones
#[tokio::test(flavor = "multi_thread")]
async fn test_get_retryable_orders_by_last_attempt() {
    let db = TestDatabase::new();
    let tried = db.store.enqueue(operation_at(OperationType::Update, "D1", Utc::now())).await.expect("enqueue");
    let fresh = db.store.enqueue(operation_at(OperationType::Update, "D2", Utc::now())).await.expect("enqueue");
    let exhausted = db.store.enqueue(operation_at(OperationType::Update, "D3", Utc::now())).await.expect("enqueue");

    db.store.mark_attempt(tried.id, Utc::now(), None).await.expect("attempt");
    for _ in 0..3 {
        db.store.mark_attempt(exhausted.id, Utc::now(), None).await.expect("attempt");
    }

    let retryable = db.store.get_retryable(3).await.expect("retryable");
    assert_eq!(retryable.iter().map(|op| op.id).collect::<Vec<_>>(), vec![fresh.id, tried.id]);
}

/// Validates schema bookkeeping.
///
/// Assertions:
/// - Migrations record the current schema version
/// - Running migrations twice is harmless
#[tokio::test(flavor = "multi_thread")]
async fn test_migrations_are_idempotent() {
    let db = TestDatabase::new();

    db.manager.run_migrations().expect("second run");

    assert_eq!(db.manager.schema_version().expect("version"), Some(SCHEMA_VERSION));
    db.manager.health_check().expect("healthy");
}
