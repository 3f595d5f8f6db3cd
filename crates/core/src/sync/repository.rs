//! Read-through / write-behind access to remote entities
//!
//! Writes land in the cache first. They go straight to the remote when it
//! is reachable and the entity has nothing queued; otherwise they are
//! queued for the orchestrator, so per-entity order always matches the
//! order of local writes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tipsync_common::{Clock, SystemClock, TtlCache};
use tipsync_domain::constants::DEFAULT_REMOTE_TIMEOUT_MS;
use tipsync_domain::{
    Component, Document, EntityKey, NewPendingOperation, OperationType, PendingOperation, Result,
    SyncEvent,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::classifier::ErrorClassifier;
use super::collections::CollectionMap;
use super::errors::{domain_error, RemoteError, RemoteResult, SyncFailure};
use super::events::{publish, SyncBus};
use super::ports::{SnapshotStream, SyncPorts};

/// Confirmed and optimistic entity state, keyed by entity type and id.
pub type DocumentCache<C = SystemClock> = TtlCache<EntityKey, Document, C>;

/// Where a write ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Confirmed by the remote
    Synced,
    /// Stored in the pending operation queue
    Queued,
}

/// Repository front for one component's entities.
pub struct OfflineRepository<C: Clock = SystemClock> {
    component: Component,
    ports: SyncPorts,
    cache: DocumentCache<C>,
    bus: SyncBus,
    classifier: Arc<ErrorClassifier>,
    clock: C,
    collections: CollectionMap,
    remote_timeout: Duration,
}

impl<C: Clock + Clone> OfflineRepository<C> {
    /// `component` is the bus source of the events this repository posts.
    pub fn new(
        component: Component,
        ports: SyncPorts,
        cache: DocumentCache<C>,
        bus: SyncBus,
        classifier: Arc<ErrorClassifier>,
        clock: C,
    ) -> Self {
        Self {
            component,
            ports,
            cache,
            bus,
            classifier,
            clock,
            collections: CollectionMap::default(),
            remote_timeout: Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
        }
    }

    /// Route entity types to collections other than the defaults.
    #[must_use]
    pub fn with_collections(mut self, collections: CollectionMap) -> Self {
        self.collections = collections;
        self
    }

    /// Deadline for direct remote reads and writes.
    #[must_use]
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Cache shared with the orchestrator.
    pub fn cache(&self) -> &DocumentCache<C> {
        &self.cache
    }

    /// Cached document, else the remote one when online.
    ///
    /// Offline, or when the remote fails transiently, a cache miss yields
    /// `Ok(None)`. Permanent failures are returned as errors.
    #[instrument(skip(self))]
    pub async fn get(&self, entity_type: &str, id: &str) -> Result<Option<Document>> {
        let key = EntityKey::new(entity_type, id);
        if let Some(document) = self.cache.get(&key) {
            return Ok(Some(document));
        }

        let collection = self.collections.collection_for(entity_type)?;
        if !self.ports.connectivity.is_online() {
            debug!("offline cache miss");
            return Ok(None);
        }

        match self.remote_call("get", self.ports.remote.get(collection, id)).await {
            Ok(Some(document)) => {
                self.cache.put(key, document.clone());
                Ok(Some(document))
            }
            Ok(None) => Ok(None),
            Err(failure) => {
                let classified =
                    self.classifier.classify(&failure, "get", entity_type, self.clock.utc_now());
                if classified.is_retryable {
                    warn!(error = %classified, "remote read failed, serving cache miss");
                    Ok(None)
                } else {
                    Err(domain_error(&classified))
                }
            }
        }
    }

    /// Create an entity, generating a time-ordered id when none is given.
    #[instrument(skip(self, payload))]
    pub async fn create(
        &self,
        entity_type: &str,
        id: Option<&str>,
        owner_id: &str,
        payload: Document,
    ) -> Result<(String, WriteOutcome)> {
        let id = id.map_or_else(|| Uuid::now_v7().to_string(), str::to_string);
        let key = EntityKey::new(entity_type, id.clone());

        let previous = self.cache.get(&key);
        self.cache.put(key.clone(), payload.clone());

        let result = self.write_through(OperationType::Create, &key, owner_id, payload, None).await;
        self.settle(&key, previous, result).map(|outcome| (id, outcome))
    }

    /// Merge `fields` into an entity. The cached document, if any, becomes
    /// the operation's base snapshot.
    #[instrument(skip(self, fields))]
    pub async fn update(
        &self,
        entity_type: &str,
        id: &str,
        owner_id: &str,
        fields: Document,
    ) -> Result<WriteOutcome> {
        let key = EntityKey::new(entity_type, id);

        let previous = self.cache.get(&key);
        if let Some(current) = &previous {
            let mut merged = current.clone();
            merged.extend(fields.clone());
            self.cache.put(key.clone(), merged);
        }

        let result = self
            .write_through(OperationType::Update, &key, owner_id, fields, previous.clone())
            .await;
        self.settle(&key, previous, result)
    }

    /// Drop the cached document and delete it remotely, queueing when offline.
    #[instrument(skip(self))]
    pub async fn delete(&self, entity_type: &str, id: &str, owner_id: &str) -> Result<WriteOutcome> {
        let key = EntityKey::new(entity_type, id);

        let previous = self.cache.get(&key);
        self.cache.remove(&key);

        let result = self
            .write_through(OperationType::Delete, &key, owner_id, Document::new(), previous.clone())
            .await;
        self.settle(&key, previous, result)
    }

    /// Remote snapshots of one entity; each snapshot also refreshes the cache.
    pub fn watch(&self, entity_type: &str, id: &str) -> Result<SnapshotStream> {
        let collection = self.collections.collection_for(entity_type)?;
        let cache = self.cache.clone();
        let key = EntityKey::new(entity_type, id);

        let snapshots = self.ports.remote.listen(collection, id).inspect(move |snapshot| {
            match snapshot {
                Ok(Some(document)) => cache.put(key.clone(), document.clone()),
                Ok(None) => {
                    cache.remove(&key);
                }
                Err(err) => debug!(entity = %key, error = %err, "snapshot listener error"),
            }
        });
        Ok(snapshots.boxed())
    }

    async fn write_through(
        &self,
        kind: OperationType,
        key: &EntityKey,
        owner_id: &str,
        payload: Document,
        base: Option<Document>,
    ) -> Result<WriteOutcome> {
        let collection = self.collections.collection_for(&key.entity_type)?;

        if self.ports.connectivity.is_online()
            && !self.ports.queue.has_pending_for(&key.entity_type, &key.target_id).await?
        {
            match self.write_remote(kind, collection, &key.target_id, &payload).await {
                Ok(()) => {
                    debug!(entity = %key, operation = %kind, "write confirmed by remote");
                    return Ok(WriteOutcome::Synced);
                }
                Err(failure) => {
                    let classified = self.classifier.classify(
                        &failure,
                        kind.as_str(),
                        &key.entity_type,
                        self.clock.utc_now(),
                    );
                    if !classified.is_retryable {
                        warn!(entity = %key, error = %classified, "remote rejected write");
                        return Err(domain_error(&classified));
                    }
                    debug!(entity = %key, error = %classified, "direct write failed, queueing");
                }
            }
        }

        self.enqueue(kind, key, owner_id, payload, base).await?;
        Ok(WriteOutcome::Queued)
    }

    async fn write_remote(
        &self,
        kind: OperationType,
        collection: &str,
        id: &str,
        payload: &Document,
    ) -> std::result::Result<(), SyncFailure> {
        let remote = &self.ports.remote;
        match kind {
            OperationType::Create => {
                self.remote_call("set", remote.set(collection, id, payload.clone())).await
            }
            OperationType::Update => {
                match self.remote_call("update", remote.update(collection, id, payload.clone())).await
                {
                    Err(SyncFailure::Remote(RemoteError::NotFound(_))) => {
                        self.remote_call("set", remote.set(collection, id, payload.clone())).await
                    }
                    other => other,
                }
            }
            OperationType::Delete => match self.remote_call("delete", remote.delete(collection, id)).await {
                Err(SyncFailure::Remote(RemoteError::NotFound(_))) => Ok(()),
                other => other,
            },
        }
    }

    async fn enqueue(
        &self,
        kind: OperationType,
        key: &EntityKey,
        owner_id: &str,
        payload: Document,
        base: Option<Document>,
    ) -> Result<PendingOperation> {
        let operation = NewPendingOperation::new(
            kind,
            key.entity_type.as_str(),
            key.target_id.as_str(),
            owner_id,
            Value::Object(payload),
        )
        .with_base_snapshot(base)
        .with_created_at(self.clock.utc_now());

        let queued = self.ports.queue.enqueue(operation).await?;
        info!(operation_id = queued.id, entity = %key, operation = %kind, "queued write for sync");

        publish(
            &self.bus,
            SyncEvent::OperationEnqueued {
                operation_id: queued.id,
                operation_type: kind,
                entity_type: queued.entity_type.clone(),
                target_id: queued.target_id.clone(),
            },
            self.component,
            None,
        );
        Ok(queued)
    }

    async fn remote_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = RemoteResult<T>>,
    ) -> std::result::Result<T, SyncFailure> {
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(result) => result.map_err(SyncFailure::Remote),
            Err(_) => Err(SyncFailure::timeout(format!("remote {operation}"), self.remote_timeout)),
        }
    }

    /// Roll the optimistic cache change back when the write was refused.
    fn settle(
        &self,
        key: &EntityKey,
        previous: Option<Document>,
        result: Result<WriteOutcome>,
    ) -> Result<WriteOutcome> {
        if result.is_err() {
            match previous {
                Some(document) => self.cache.put(key.clone(), document),
                None => {
                    self.cache.remove(key);
                }
            }
        }
        result
    }
}
