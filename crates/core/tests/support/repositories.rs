//! Mock port implementations for testing
//!
//! In-memory stand-ins for the queue, the remote store and connectivity.
//! State sits behind `Arc<tokio::sync::Mutex<..>>` so clones handed to the
//! orchestrator and kept by the test observe the same data.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tipsync_core::{ConnectivityMonitor, PendingOperationStore, RemoteError, RemoteResult, RemoteStore, SnapshotStream};
use tipsync_domain::{
    Document, ErrorInfo, NewPendingOperation, OperationId, OperationStatus, OperationType,
    PendingOperation, Result as DomainResult,
};
use tokio::sync::{watch, Mutex};

/* -------------------------------------------------------------------------- */
/* Queue */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Default)]
struct QueueState {
    last_id: OperationId,
    records: BTreeMap<OperationId, PendingOperation>,
}

/// In-memory `PendingOperationStore`; ids are assigned in enqueue order.
#[derive(Debug, Default, Clone)]
pub struct MockQueue {
    state: Arc<Mutex<QueueState>>,
}

impl MockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one record, pending or failed.
    pub async fn record(&self, id: OperationId) -> Option<PendingOperation> {
        self.state.lock().await.records.get(&id).cloned()
    }

    fn pending(state: &QueueState) -> impl Iterator<Item = &PendingOperation> {
        state.records.values().filter(|op| op.status == OperationStatus::Pending)
    }
}

#[async_trait]
impl PendingOperationStore for MockQueue {
    async fn enqueue(&self, operation: NewPendingOperation) -> DomainResult<PendingOperation> {
        let mut state = self.state.lock().await;
        state.last_id += 1;
        let record = PendingOperation::from_new(state.last_id, operation);
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn dequeue_batch(&self, limit: usize) -> DomainResult<Vec<PendingOperation>> {
        self.dequeue_batch_after(0, limit).await
    }

    async fn dequeue_batch_after(
        &self,
        after: OperationId,
        limit: usize,
    ) -> DomainResult<Vec<PendingOperation>> {
        let state = self.state.lock().await;
        let page: Vec<_> =
            Self::pending(&state).filter(|op| op.id > after).take(limit).cloned().collect();
        Ok(page)
    }

    async fn get_retryable(&self, max_retries: u32) -> DomainResult<Vec<PendingOperation>> {
        let state = self.state.lock().await;
        let mut retryable: Vec<_> =
            Self::pending(&state).filter(|op| op.retry_count < max_retries).cloned().collect();
        retryable.sort_by_key(|op| op.last_attempt_at);
        Ok(retryable)
    }

    async fn mark_attempt(
        &self,
        id: OperationId,
        attempted_at: DateTime<Utc>,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> DomainResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state.records.get_mut(&id).map_or(false, |op| {
            op.retry_count += 1;
            op.last_attempt_at = Some(attempted_at);
            op.next_attempt_at = next_attempt_at;
            true
        }))
    }

    async fn remove(&self, id: OperationId) -> DomainResult<bool> {
        Ok(self.state.lock().await.records.remove(&id).is_some())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> DomainResult<usize> {
        let mut state = self.state.lock().await;
        let before = state.records.len();
        state.records.retain(|_, op| !(op.is_failed() && op.created_at < cutoff));
        Ok(before - state.records.len())
    }

    async fn mark_failed(&self, id: OperationId, error: &ErrorInfo) -> DomainResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state.records.get_mut(&id).map_or(false, |op| {
            op.status = OperationStatus::Failed;
            op.last_error = Some(error.clone());
            true
        }))
    }

    async fn list_failed(&self) -> DomainResult<Vec<PendingOperation>> {
        let state = self.state.lock().await;
        Ok(state.records.values().filter(|op| op.is_failed()).cloned().collect())
    }

    async fn retry_failed(&self, id: OperationId, requeued_at: DateTime<Utc>) -> DomainResult<bool> {
        let mut state = self.state.lock().await;
        Ok(match state.records.get_mut(&id) {
            Some(op) if op.is_failed() => {
                op.status = OperationStatus::Pending;
                op.retry_count = 0;
                op.next_attempt_at = None;
                op.last_error = None;
                op.requeued_at = Some(requeued_at);
                true
            }
            _ => false,
        })
    }

    async fn retry_all_failed(&self, requeued_at: DateTime<Utc>) -> DomainResult<usize> {
        let ids: Vec<OperationId> =
            self.list_failed().await?.into_iter().map(|op| op.id).collect();
        let mut count = 0;
        for id in ids {
            if self.retry_failed(id, requeued_at).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn cancel(&self, id: OperationId) -> DomainResult<bool> {
        self.remove(id).await
    }

    async fn pending_count(&self) -> DomainResult<u64> {
        let state = self.state.lock().await;
        let count = Self::pending(&state).count();
        Ok(count as u64)
    }

    async fn failed_count(&self) -> DomainResult<u64> {
        let state = self.state.lock().await;
        Ok(state.records.values().filter(|op| op.is_failed()).count() as u64)
    }

    async fn list_for_owner(&self, owner_id: &str) -> DomainResult<Vec<PendingOperation>> {
        let state = self.state.lock().await;
        Ok(state.records.values().filter(|op| op.owner_id == owner_id).cloned().collect())
    }

    async fn list_by_type(
        &self,
        operation_type: OperationType,
        owner_id: &str,
    ) -> DomainResult<Vec<PendingOperation>> {
        let state = self.state.lock().await;
        let matching: Vec<_> = Self::pending(&state)
            .filter(|op| op.operation_type == operation_type && op.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn find_by_target_and_type(
        &self,
        target_id: &str,
        operation_type: OperationType,
    ) -> DomainResult<Vec<PendingOperation>> {
        let state = self.state.lock().await;
        let matching: Vec<_> = Self::pending(&state)
            .filter(|op| op.target_id == target_id && op.operation_type == operation_type)
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn has_pending_for(&self, entity_type: &str, target_id: &str) -> DomainResult<bool> {
        let state = self.state.lock().await;
        let found =
            Self::pending(&state).any(|op| op.entity_type == entity_type && op.target_id == target_id);
        Ok(found)
    }

    async fn delete_all_for_owner(&self, owner_id: &str) -> DomainResult<usize> {
        let mut state = self.state.lock().await;
        let before = state.records.len();
        state.records.retain(|_, op| op.owner_id != owner_id);
        Ok(before - state.records.len())
    }
}

/* -------------------------------------------------------------------------- */
/* Remote store */
/* -------------------------------------------------------------------------- */

type DocumentKey = (String, String);

/// Scriptable in-memory remote.
///
/// `fail_next` queues one-shot errors; `fail_always` fails every call
/// until `heal` is called. Every call, failed or not, is counted and logged
/// as `"<method> <collection>/<id>"`.
#[derive(Debug, Default, Clone)]
pub struct MockRemote {
    documents: Arc<Mutex<HashMap<DocumentKey, Document>>>,
    scripted: Arc<Mutex<VecDeque<RemoteError>>>,
    persistent: Arc<Mutex<Option<RemoteError>>>,
    log: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: &str, id: &str, document: Document) {
        self.documents.lock().await.insert((collection.to_string(), id.to_string()), document);
    }

    pub async fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.documents.lock().await.get(&(collection.to_string(), id.to_string())).cloned()
    }

    pub async fn fail_next(&self, error: RemoteError) {
        self.scripted.lock().await.push_back(error);
    }

    pub async fn fail_always(&self, error: RemoteError) {
        *self.persistent.lock().await = Some(error);
    }

    pub async fn heal(&self) {
        *self.persistent.lock().await = None;
        self.scripted.lock().await.clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn log(&self) -> Vec<String> {
        self.log.lock().await.clone()
    }

    async fn enter(&self, method: &str, collection: &str, id: &str) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().await.push(format!("{method} {collection}/{id}"));
        if let Some(error) = self.scripted.lock().await.pop_front() {
            return Err(error);
        }
        match self.persistent.lock().await.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn get(&self, collection: &str, id: &str) -> RemoteResult<Option<Document>> {
        self.enter("get", collection, id).await?;
        Ok(self.document(collection, id).await)
    }

    async fn set(&self, collection: &str, id: &str, document: Document) -> RemoteResult<()> {
        self.enter("set", collection, id).await?;
        self.insert(collection, id, document).await;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> RemoteResult<()> {
        self.enter("update", collection, id).await?;
        let mut documents = self.documents.lock().await;
        let Some(document) = documents.get_mut(&(collection.to_string(), id.to_string())) else {
            return Err(RemoteError::NotFound(format!("{collection}/{id}")));
        };
        document.extend(fields);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()> {
        self.enter("delete", collection, id).await?;
        self.documents.lock().await.remove(&(collection.to_string(), id.to_string()));
        Ok(())
    }

    fn listen(&self, collection: &str, id: &str) -> SnapshotStream {
        let documents = Arc::clone(&self.documents);
        let key = (collection.to_string(), id.to_string());
        Box::pin(futures::stream::once(async move {
            Ok(documents.lock().await.get(&key).cloned())
        }))
    }
}

/* -------------------------------------------------------------------------- */
/* Connectivity */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct MockConnectivity {
    state: Arc<watch::Sender<bool>>,
}

impl MockConnectivity {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state: Arc::new(state) }
    }

    pub fn set_online(&self, online: bool) {
        self.state.send_replace(online);
    }
}

impl ConnectivityMonitor for MockConnectivity {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
