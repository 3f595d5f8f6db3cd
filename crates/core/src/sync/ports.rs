//! Port interfaces for sync operations

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use tipsync_domain::{
    Document, ErrorInfo, NewPendingOperation, OperationId, OperationType, PendingOperation, Result,
};
use tokio::sync::watch;

use super::errors::{RemoteError, RemoteResult};

/// Live snapshots of one remote document; `None` means it was deleted.
pub type SnapshotStream = BoxStream<'static, std::result::Result<Option<Document>, RemoteError>>;

/// Durable queue of local mutations awaiting remote confirmation.
///
/// Only records with `status = pending` are returned by the dequeue and
/// retry queries. Dead-lettered records stay until retried, cancelled or
/// purged.
#[async_trait]
pub trait PendingOperationStore: Send + Sync {
    /// Persist an operation and assign it the next id
    async fn enqueue(&self, operation: NewPendingOperation) -> Result<PendingOperation>;

    /// Oldest pending operations first
    async fn dequeue_batch(&self, limit: usize) -> Result<Vec<PendingOperation>>;

    /// Same order as `dequeue_batch`, starting after `after`
    async fn dequeue_batch_after(
        &self,
        after: OperationId,
        limit: usize,
    ) -> Result<Vec<PendingOperation>>;

    /// Pending operations below the retry cap, least recently attempted first
    async fn get_retryable(&self, max_retries: u32) -> Result<Vec<PendingOperation>>;

    /// Record a failed attempt. Returns false if the record no longer exists.
    async fn mark_attempt(
        &self,
        id: OperationId,
        attempted_at: DateTime<Utc>,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Remove a confirmed operation
    async fn remove(&self, id: OperationId) -> Result<bool>;

    /// Delete dead-lettered records created before `cutoff`
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Move an operation to the dead-letter with its terminal error
    async fn mark_failed(&self, id: OperationId, error: &ErrorInfo) -> Result<bool>;

    async fn list_failed(&self) -> Result<Vec<PendingOperation>>;

    /// Put a dead-lettered operation back in the queue with a fresh retry
    /// budget. `requeued_at` restarts its retry window.
    async fn retry_failed(&self, id: OperationId, requeued_at: DateTime<Utc>) -> Result<bool>;

    async fn retry_all_failed(&self, requeued_at: DateTime<Utc>) -> Result<usize>;

    /// Delete a pending or failed record
    async fn cancel(&self, id: OperationId) -> Result<bool>;

    async fn pending_count(&self) -> Result<u64>;

    async fn failed_count(&self) -> Result<u64>;

    /// Every record (pending and failed) owned by `owner_id`
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<PendingOperation>>;

    /// Pending records of one operation type for an owner
    async fn list_by_type(
        &self,
        operation_type: OperationType,
        owner_id: &str,
    ) -> Result<Vec<PendingOperation>>;

    /// Pending records for a target, oldest first
    async fn find_by_target_and_type(
        &self,
        target_id: &str,
        operation_type: OperationType,
    ) -> Result<Vec<PendingOperation>>;

    /// True if any pending record targets this entity
    async fn has_pending_for(&self, entity_type: &str, target_id: &str) -> Result<bool>;

    async fn delete_all_for_owner(&self, owner_id: &str) -> Result<usize>;
}

/// Document store the queue drains into.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> RemoteResult<Option<Document>>;

    /// Create or replace the whole document
    async fn set(&self, collection: &str, id: &str, document: Document) -> RemoteResult<()>;

    /// Merge fields into an existing document; `NotFound` if it is absent
    async fn update(&self, collection: &str, id: &str, fields: Document) -> RemoteResult<()>;

    /// Deleting an absent document succeeds
    async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()>;

    /// Current snapshot followed by every later change
    fn listen(&self, collection: &str, id: &str) -> SnapshotStream;
}

/// Source of online/offline transitions.
pub trait ConnectivityMonitor: Send + Sync {
    fn is_online(&self) -> bool;

    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// The three ports every sync component is built from.
#[derive(Clone)]
pub struct SyncPorts {
    pub queue: Arc<dyn PendingOperationStore>,
    pub remote: Arc<dyn RemoteStore>,
    pub connectivity: Arc<dyn ConnectivityMonitor>,
}

impl SyncPorts {
    /// Bundle the three ports.
    pub fn new(
        queue: Arc<dyn PendingOperationStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Self {
        Self { queue, remote, connectivity }
    }
}
