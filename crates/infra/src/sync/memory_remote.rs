//! Remote document store held in process memory
//!
//! Used by the integration tests and by hosts that want to run the engine
//! without a backend. Writes are visible to `listen` subscribers through a
//! broadcast channel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tipsync_core::{RemoteError, RemoteResult, RemoteStore, SnapshotStream};
use tipsync_domain::Document;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tracing::trace;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

type DocumentMap = HashMap<(String, String), Document>;

/// A write observed by `listen` subscribers. `document` is `None` after a
/// delete.
#[derive(Debug, Clone)]
pub struct DocumentChange {
    pub collection: String,
    pub id: String,
    pub document: Option<Document>,
}

pub struct InMemoryRemoteStore {
    documents: Arc<Mutex<DocumentMap>>,
    online: AtomicBool,
    scripted_failures: Mutex<VecDeque<RemoteError>>,
    calls: AtomicUsize,
    changes: broadcast::Sender<DocumentChange>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            documents: Arc::new(Mutex::new(HashMap::new())),
            online: AtomicBool::new(true),
            scripted_failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            changes,
        }
    }

    /// While offline every call fails with [`RemoteError::Network`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Queue an error for the next call. Scripted errors are consumed in
    /// order, one per call.
    pub async fn fail_next(&self, error: RemoteError) {
        self.scripted_failures.lock().await.push_back(error);
    }

    /// Number of get/set/update/delete calls received, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Seed a document without counting a call or notifying listeners.
    pub async fn insert(&self, collection: &str, id: &str, document: Document) {
        self.documents.lock().await.insert(key(collection, id), document);
    }

    /// Read a document without counting a call.
    pub async fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.documents.lock().await.get(&key(collection, id)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }

    async fn begin_call(&self) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("remote unreachable".to_string()));
        }
        match self.scripted_failures.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn notify(&self, collection: &str, id: &str, document: Option<Document>) {
        // No receivers is not an error for a store nobody listens to
        let _ = self.changes.send(DocumentChange {
            collection: collection.to_string(),
            id: id.to_string(),
            document,
        });
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get(&self, collection: &str, id: &str) -> RemoteResult<Option<Document>> {
        self.begin_call().await?;
        Ok(self.documents.lock().await.get(&key(collection, id)).cloned())
    }

    async fn set(&self, collection: &str, id: &str, document: Document) -> RemoteResult<()> {
        self.begin_call().await?;
        self.documents.lock().await.insert(key(collection, id), document.clone());
        trace!(collection, id, "remote set");
        self.notify(collection, id, Some(document));
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> RemoteResult<()> {
        self.begin_call().await?;
        let merged = {
            let mut documents = self.documents.lock().await;
            let existing = documents
                .get_mut(&key(collection, id))
                .ok_or_else(|| RemoteError::NotFound(format!("{collection}/{id}")))?;
            existing.extend(fields);
            existing.clone()
        };
        trace!(collection, id, "remote update");
        self.notify(collection, id, Some(merged));
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()> {
        self.begin_call().await?;
        let removed = self.documents.lock().await.remove(&key(collection, id));
        if removed.is_some() {
            trace!(collection, id, "remote delete");
            self.notify(collection, id, None);
        }
        Ok(())
    }

    fn listen(&self, collection: &str, id: &str) -> SnapshotStream {
        // Subscribe before reading the snapshot so no write falls in between
        let receiver = self.changes.subscribe();
        let documents = Arc::clone(&self.documents);
        let online = self.online.load(Ordering::SeqCst);
        let target = key(collection, id);

        let initial = {
            let target = target.clone();
            stream::once(async move {
                if !online {
                    return Err(RemoteError::Network("remote unreachable".to_string()));
                }
                Ok(documents.lock().await.get(&target).cloned())
            })
        };

        let updates = stream::unfold((receiver, target), |(mut receiver, target)| async move {
            loop {
                match receiver.recv().await {
                    Ok(change) if change.collection == target.0 && change.id == target.1 => {
                        return Some((Ok(change.document), (receiver, target)));
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        initial.chain(updates).boxed()
    }
}

fn key(collection: &str, id: &str) -> (String, String) {
    (collection.to_string(), id.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let remote = InMemoryRemoteStore::new();

        let err = remote.update("deliveries", "D1", doc(json!({"tipAmount": 1}))).await;

        assert!(matches!(err, Err(RemoteError::NotFound(_))));
        assert_eq!(remote.call_count(), 1);
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let remote = InMemoryRemoteStore::new();
        remote.insert("deliveries", "D1", doc(json!({"tipAmount": 1, "storeName": "A"}))).await;

        remote.update("deliveries", "D1", doc(json!({"tipAmount": 4}))).await.expect("update");

        let stored = remote.document("deliveries", "D1").await.expect("stored");
        assert_eq!(stored["tipAmount"], json!(4));
        assert_eq!(stored["storeName"], json!("A"));
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let remote = InMemoryRemoteStore::new();
        remote.fail_next(RemoteError::Unavailable("first".into())).await;
        remote.fail_next(RemoteError::PermissionDenied("second".into())).await;

        assert!(matches!(remote.get("c", "1").await, Err(RemoteError::Unavailable(_))));
        assert!(matches!(remote.get("c", "1").await, Err(RemoteError::PermissionDenied(_))));
        assert!(matches!(remote.get("c", "1").await, Ok(None)));
        assert_eq!(remote.call_count(), 3);
    }

    #[tokio::test]
    async fn offline_calls_fail_with_network_error() {
        let remote = InMemoryRemoteStore::new();
        remote.set_online(false);

        assert!(matches!(remote.delete("c", "1").await, Err(RemoteError::Network(_))));
    }

    #[tokio::test]
    async fn listen_yields_snapshot_then_changes() {
        let remote = InMemoryRemoteStore::new();
        remote.insert("deliveries", "D1", doc(json!({"tipAmount": 1}))).await;
        let mut stream = remote.listen("deliveries", "D1");

        let first = stream.next().await.expect("snapshot").expect("ok");
        assert_eq!(first.expect("present")["tipAmount"], json!(1));

        remote.set("deliveries", "D2", doc(json!({"tipAmount": 9}))).await.expect("set");
        remote.delete("deliveries", "D1").await.expect("delete");

        let second = stream.next().await.expect("change").expect("ok");
        assert!(second.is_none());
    }
}
