//! Sync orchestrator
//!
//! Drains the pending operation queue into the remote store. A pass walks
//! the queue oldest first in pages, folds the operations of each entity
//! into one effective write, checks updates for conflicts and records the
//! outcome of every operation: removed on success, re-gated on a transient
//! failure, dead-lettered otherwise.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tipsync_common::{Clock, ErrorClassification, SystemClock};
use tipsync_domain::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENCY, DEFAULT_REMOTE_TIMEOUT_MS, DETAIL_ENTITY_ID,
    DETAIL_ENTITY_TYPE, DETAIL_OPERATION,
};
use tipsync_domain::{
    Component, Document, EntityKey, ErrorInfo, ErrorKind, OperationId, OperationType,
    PendingOperation, ResolutionStrategy, Result, SyncConfig, SyncEvent, SyncPhase, SyncStatus,
    TipSyncError,
};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::classifier::ErrorClassifier;
use super::coalesce::{coalesce, group_by_entity, OperationGroup};
use super::collections::CollectionMap;
use super::conflict::{resolve, ConflictDetector, Resolution, ResolutionPolicy};
use super::errors::{RemoteError, RemoteResult, SyncFailure};
use super::events::{publish, SyncBus};
use super::ports::SyncPorts;
use super::report::{SkipReason, SyncReport, SyncTrigger};
use super::repository::DocumentCache;

/// Paging and concurrency limits for a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSettings {
    /// Operations fetched from the queue per page
    pub batch_size: usize,
    /// Entity groups applied at the same time within one page
    pub max_concurrency: usize,
    /// Deadline for a single remote call
    pub remote_timeout: Duration,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            remote_timeout: Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
        }
    }
}

impl DrainSettings {
    /// Limits from the `sync` config section, each at least one.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            remote_timeout: config.remote_timeout(),
        }
    }
}

/// Result of applying one entity group.
enum GroupOutcome {
    Completed { operations: usize, resolution: Option<ResolutionStrategy> },
    Retrying { key: EntityKey, operations: usize, error: ErrorInfo },
    Failed { key: EntityKey, operations: usize, error: ErrorInfo },
    Interrupted { key: EntityKey },
}

/// What the remote now holds for an applied group; `None` after a delete.
struct Applied {
    document: Option<Document>,
    resolution: Option<ResolutionStrategy>,
}

#[derive(Debug, Default)]
struct PassTally {
    attempted: usize,
    succeeded: usize,
    terminal: usize,
    unreachable: usize,
    last_failure: Option<ErrorInfo>,
}

impl PassTally {
    fn record(
        &mut self,
        outcome: GroupOutcome,
        report: &mut SyncReport,
        blocked: &mut HashSet<EntityKey>,
    ) {
        match outcome {
            GroupOutcome::Completed { operations, resolution } => {
                self.attempted += 1;
                self.succeeded += 1;
                report.attempted_groups += 1;
                report.completed += operations;
                if resolution.is_some() {
                    report.resolved_conflicts += 1;
                }
            }
            GroupOutcome::Retrying { key, operations, error } => {
                self.note_failure(error);
                report.attempted_groups += 1;
                report.retrying += operations;
                blocked.insert(key);
            }
            GroupOutcome::Failed { key, operations, error } => {
                self.terminal += 1;
                self.note_failure(error);
                report.attempted_groups += 1;
                report.failed += operations;
                blocked.insert(key);
            }
            GroupOutcome::Interrupted { key } => {
                report.cancelled = true;
                blocked.insert(key);
            }
        }
    }

    fn note_failure(&mut self, error: ErrorInfo) {
        self.attempted += 1;
        if error.kind.is_unreachable() {
            self.unreachable += 1;
        }
        self.last_failure = Some(error);
    }

    fn phase_after(&self, previous: SyncPhase, made_progress: bool) -> SyncPhase {
        let nothing_succeeded = self.attempted > 0 && self.succeeded == 0;
        let all_terminal = self.terminal == self.attempted;
        let all_unreachable = self.unreachable == self.attempted;

        if nothing_succeeded && (all_terminal || all_unreachable) {
            SyncPhase::Error
        } else if previous == SyncPhase::Error && !made_progress {
            SyncPhase::Error
        } else {
            SyncPhase::Idle
        }
    }
}

/// Drains queued operations into the remote store and owns [`SyncStatus`].
pub struct SyncOrchestrator<C: Clock = SystemClock> {
    ports: SyncPorts,
    cache: DocumentCache<C>,
    bus: SyncBus,
    clock: C,
    classifier: Arc<ErrorClassifier>,
    detector: ConflictDetector,
    policy: ResolutionPolicy,
    collections: CollectionMap,
    settings: DrainSettings,
    status: watch::Sender<SyncStatus>,
    pass_lock: Mutex<()>,
}

impl<C: Clock + Clone> SyncOrchestrator<C> {
    /// Create an orchestrator with limits, retry policy, conflict tolerance
    /// and collection routing taken from the `sync` config section.
    pub fn new(
        ports: SyncPorts,
        cache: DocumentCache<C>,
        bus: SyncBus,
        clock: C,
        config: &SyncConfig,
    ) -> Result<Self> {
        let classifier = Arc::new(ErrorClassifier::from_config(config)?);
        let initial = SyncStatus {
            is_online: ports.connectivity.is_online(),
            background_sync_enabled: config.enabled,
            ..SyncStatus::default()
        };
        let (status, _) = watch::channel(initial);

        Ok(Self {
            ports,
            cache,
            bus,
            clock,
            classifier,
            detector: ConflictDetector::from_config(config),
            policy: ResolutionPolicy::default(),
            collections: CollectionMap::from_config(config),
            settings: DrainSettings::from_config(config),
            status,
            pass_lock: Mutex::new(()),
        })
    }

    /// Replace the default conflict resolution table
    #[must_use]
    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a classifier with other components, e.g. an [`OfflineRepository`].
    ///
    /// [`OfflineRepository`]: super::repository::OfflineRepository
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the conflict detector, e.g. to change the timestamp tolerance
    #[must_use]
    pub fn with_detector(mut self, detector: ConflictDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Classifier shared with repositories built on the same ports.
    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    /// Document cache refreshed by successful passes.
    pub fn cache(&self) -> &DocumentCache<C> {
        &self.cache
    }

    /// Bus the orchestrator posts its events on.
    pub fn bus(&self) -> &SyncBus {
        &self.bus
    }

    /// Paging and concurrency limits in effect.
    pub fn settings(&self) -> DrainSettings {
        self.settings
    }

    /* ---------------------------------------------------------------------- */
    /* Drain passes */
    /* ---------------------------------------------------------------------- */

    /// Run one pass that cannot be cancelled.
    pub async fn sync_now(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        self.run_pass(trigger, &CancellationToken::new()).await
    }

    /// Run one drain pass.
    ///
    /// Returns a skipped report when another pass is running, when offline,
    /// or when the queue is empty. Cancelling `cancel` stops the pass at the
    /// next remote call; operations in flight stay queued untouched.
    #[instrument(skip_all, fields(trigger = %trigger))]
    pub async fn run_pass(
        &self,
        trigger: SyncTrigger,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let Ok(_guard) = self.pass_lock.try_lock() else {
            debug!("drain pass already running");
            return Ok(SyncReport::skipped(trigger, SkipReason::AlreadySyncing, self.phase()));
        };

        if !self.ports.connectivity.is_online() {
            self.update_status(|status| status.is_online = false);
            debug!("offline, skipping drain pass");
            return Ok(SyncReport::skipped(trigger, SkipReason::Offline, self.phase()));
        }
        self.update_status(|status| status.is_online = true);

        if self.ports.queue.pending_count().await? == 0 {
            return Ok(SyncReport::skipped(trigger, SkipReason::EmptyQueue, self.phase()));
        }

        let previous = self.phase();
        self.update_status(|status| status.phase = SyncPhase::Syncing);
        info!("drain pass started");

        let mut report = SyncReport::new(trigger);
        let mut tally = PassTally::default();
        let drained = self.drain(&mut report, &mut tally, cancel).await;

        match drained.and(self.refresh_counts().await) {
            Ok(()) => {
                self.finish_pass(&mut report, &tally, previous);
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, "drain pass aborted");
                self.update_status(|status| status.phase = SyncPhase::Error);
                Err(err)
            }
        }
    }

    async fn drain(
        &self,
        report: &mut SyncReport,
        tally: &mut PassTally,
        cancel: &CancellationToken,
    ) -> Result<()> {
        report.expired = self.expire_stale().await?;

        let batch_size = self.settings.batch_size;
        let mut cursor: OperationId = 0;
        let mut blocked: HashSet<EntityKey> = HashSet::new();

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let page = self.ports.queue.dequeue_batch_after(cursor, batch_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = last.id;
            let page_len = page.len();

            let groups = self.plan_page(page, &mut blocked, report);
            let outcomes: Vec<Result<GroupOutcome>> = stream::iter(groups)
                .map(|group| self.apply_group(group, cancel))
                .buffer_unordered(self.settings.max_concurrency)
                .collect()
                .await;

            let mut first_error = None;
            for outcome in outcomes {
                match outcome {
                    Ok(outcome) => tally.record(outcome, report, &mut blocked),
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }

            self.refresh_counts().await?;
            if page_len < batch_size {
                break;
            }
        }
        Ok(())
    }

    /// Dead-letter pending operations that outlived the retry window.
    async fn expire_stale(&self) -> Result<usize> {
        let now = self.clock.utc_now();
        let mut expired = 0;
        let mut last_error = None;

        for op in self.collect_pending().await? {
            if self.classifier.is_within_retry_window(op.age(now)) {
                continue;
            }
            let error = ErrorInfo::new(ErrorKind::Timeout, "retry window exceeded")
                .with_detail(DETAIL_OPERATION, op.operation_type.as_str())
                .with_detail(DETAIL_ENTITY_TYPE, op.entity_type.as_str())
                .with_detail(DETAIL_ENTITY_ID, op.target_id.as_str())
                .at(now);

            if self.ports.queue.mark_failed(op.id, &error).await? {
                warn!(operation_id = op.id, entity = %op.entity_key(), "expired pending operation");
                expired += 1;
                self.publish_failed(&op, &error);
                last_error = Some(error);
            }
        }

        if let Some(error) = last_error {
            self.record_terminal_failure(&error, now);
        }
        Ok(expired)
    }

    /// Group and coalesce a page, dropping entities that must wait.
    fn plan_page(
        &self,
        page: Vec<PendingOperation>,
        blocked: &mut HashSet<EntityKey>,
        report: &mut SyncReport,
    ) -> Vec<OperationGroup> {
        let now = self.clock.utc_now();
        let mut planned = Vec::new();

        for members in group_by_entity(page) {
            let Some(group) = coalesce(members) else {
                continue;
            };
            let key = group.key();
            let keyed = !key.target_id.is_empty();

            if keyed && blocked.contains(&key) {
                report.deferred += group.len();
                continue;
            }
            if !group.effective.is_ready(now) {
                debug!(entity = %key, next_attempt_at = ?group.effective.next_attempt_at, "entity backing off");
                report.deferred += group.len();
                if keyed {
                    blocked.insert(key);
                }
                continue;
            }
            planned.push(group);
        }
        planned
    }

    fn finish_pass(&self, report: &mut SyncReport, tally: &PassTally, previous: SyncPhase) {
        let now = self.clock.utc_now();
        let phase = tally.phase_after(previous, report.made_progress());
        let online = self.ports.connectivity.is_online();
        let interrupted = report.cancelled || !online;
        let clean = tally.terminal == 0 && report.expired == 0 && report.made_progress();

        self.update_status(|status| {
            status.phase = phase;
            status.is_online = online;
            if !interrupted {
                status.last_sync_time = Some(now);
            }
            if phase == SyncPhase::Error {
                if let Some(error) = &tally.last_failure {
                    status.last_error = Some(error.clone());
                }
                status.last_failed_sync_time = Some(now);
            } else if clean {
                status.last_error = None;
            }
        });
        report.phase = phase;

        info!(
            completed = report.completed,
            resolved = report.resolved_conflicts,
            retrying = report.retrying,
            failed = report.failed,
            expired = report.expired,
            deferred = report.deferred,
            cancelled = report.cancelled,
            phase = %phase,
            "drain pass finished"
        );
    }

    /* ---------------------------------------------------------------------- */
    /* Applying one entity group */
    /* ---------------------------------------------------------------------- */

    async fn apply_group(
        &self,
        group: OperationGroup,
        cancel: &CancellationToken,
    ) -> Result<GroupOutcome> {
        let target_id = if group.effective.target_id.is_empty() {
            Uuid::now_v7().to_string()
        } else {
            group.effective.target_id.clone()
        };

        let collection = match self.collections.collection_for(&group.effective.entity_type) {
            Ok(collection) => collection,
            Err(err) => return self.handle_failure(group, &target_id, SyncFailure::Local(err)).await,
        };

        match self.execute(&group.effective, collection, &target_id, cancel).await {
            Ok(Some(applied)) => self.handle_success(group, &target_id, applied).await,
            Ok(None) => {
                debug!(entity = %group.key(), "apply interrupted by cancellation");
                Ok(GroupOutcome::Interrupted { key: group.key() })
            }
            Err(failure) => self.handle_failure(group, &target_id, failure).await,
        }
    }

    /// Issue the effective write. `Ok(None)` means the pass was cancelled
    /// before the remote answered.
    async fn execute(
        &self,
        op: &PendingOperation,
        collection: &str,
        target_id: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<Applied>, SyncFailure> {
        match op.operation_type {
            OperationType::Delete => {
                let deleted = self
                    .remote_call(cancel, "delete", self.ports.remote.delete(collection, target_id))
                    .await;
                match deleted {
                    Ok(None) => Ok(None),
                    Ok(Some(())) | Err(SyncFailure::Remote(RemoteError::NotFound(_))) => {
                        Ok(Some(Applied { document: None, resolution: None }))
                    }
                    Err(failure) => Err(failure),
                }
            }
            OperationType::Update if self.detector.needs_conflict_detection(op) => {
                self.apply_update(op, collection, target_id, cancel).await
            }
            OperationType::Create | OperationType::Update => {
                self.write_full(collection, target_id, payload_document(op)?, None, cancel).await
            }
        }
    }

    async fn apply_update(
        &self,
        op: &PendingOperation,
        collection: &str,
        target_id: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<Applied>, SyncFailure> {
        let Some(current) =
            self.remote_call(cancel, "get", self.ports.remote.get(collection, target_id)).await?
        else {
            return Ok(None);
        };
        let Some(remote) = current else {
            debug!(entity = %op.entity_key(), "remote document absent, writing update as set");
            return self.write_full(collection, target_id, payload_document(op)?, None, cancel).await;
        };

        let conflict = self.detector.detect_conflict(op, &remote);
        if !conflict.is_conflict {
            let fields = payload_document(op)?;
            let mut confirmed = remote;
            for (field, value) in &fields {
                confirmed.insert(field.clone(), value.clone());
            }
            return Ok(self
                .update_or_set(collection, target_id, fields, cancel)
                .await?
                .map(|()| Applied { document: Some(confirmed), resolution: None }));
        }

        let strategy = self.policy.recommended_strategy(conflict.conflict_type, &op.entity_type);
        warn!(
            entity = %op.entity_key(),
            conflict_type = %conflict.conflict_type,
            %strategy,
            message = %conflict.message,
            "conflict detected"
        );
        publish(
            &self.bus,
            SyncEvent::ConflictDetected {
                entity_type: op.entity_type.clone(),
                target_id: target_id.to_string(),
                conflict_type: conflict.conflict_type,
                strategy,
            },
            Component::Sync,
            None,
        );

        let local = op.payload_object().cloned().unwrap_or_default();
        match resolve(strategy, &conflict, &local, &remote) {
            Resolution::KeepRemote(document) => {
                Ok(Some(Applied { document: Some(document), resolution: Some(strategy) }))
            }
            Resolution::Write(document) => Ok(self
                .update_or_set(collection, target_id, document.clone(), cancel)
                .await?
                .map(|()| Applied { document: Some(document), resolution: Some(strategy) })),
        }
    }

    async fn write_full(
        &self,
        collection: &str,
        target_id: &str,
        document: Document,
        resolution: Option<ResolutionStrategy>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<Applied>, SyncFailure> {
        let written = self
            .remote_call(cancel, "set", self.ports.remote.set(collection, target_id, document.clone()))
            .await?;
        Ok(written.map(|()| Applied { document: Some(document), resolution }))
    }

    /// Update, falling back to a set if the document vanished meanwhile.
    async fn update_or_set(
        &self,
        collection: &str,
        target_id: &str,
        fields: Document,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<()>, SyncFailure> {
        let updated = self
            .remote_call(cancel, "update", self.ports.remote.update(collection, target_id, fields.clone()))
            .await;
        match updated {
            Err(SyncFailure::Remote(RemoteError::NotFound(_))) => {
                self.remote_call(cancel, "set", self.ports.remote.set(collection, target_id, fields))
                    .await
            }
            other => other,
        }
    }

    /// Race a remote call against cancellation and the remote timeout.
    async fn remote_call<T, F>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        call: F,
    ) -> std::result::Result<Option<T>, SyncFailure>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        let timeout = self.settings.remote_timeout;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(None),
            result = tokio::time::timeout(timeout, call) => match result {
                Ok(Ok(value)) => Ok(Some(value)),
                Ok(Err(err)) => Err(SyncFailure::Remote(err)),
                Err(_) => Err(SyncFailure::timeout(format!("remote {operation}"), timeout)),
            },
        }
    }

    async fn handle_success(
        &self,
        group: OperationGroup,
        target_id: &str,
        applied: Applied,
    ) -> Result<GroupOutcome> {
        let entity_type = group.effective.entity_type.clone();
        for op in &group.members {
            self.ports.queue.remove(op.id).await?;
        }

        let key = EntityKey::new(entity_type.clone(), target_id);
        match applied.document {
            Some(document) => self.cache.put(key.clone(), document),
            None => {
                self.cache.remove(&key);
            }
        }

        for op in &group.members {
            publish(
                &self.bus,
                SyncEvent::OperationCompleted {
                    operation_id: op.id,
                    entity_type: entity_type.clone(),
                    target_id: target_id.to_string(),
                    resolution: applied.resolution,
                },
                Component::Sync,
                None,
            );
        }

        info!(entity = %key, operations = group.len(), "synced queued operations");
        Ok(GroupOutcome::Completed { operations: group.len(), resolution: applied.resolution })
    }

    async fn handle_failure(
        &self,
        group: OperationGroup,
        target_id: &str,
        failure: SyncFailure,
    ) -> Result<GroupOutcome> {
        let effective = &group.effective;
        let now = self.clock.utc_now();
        let classified = self
            .classifier
            .classify(&failure, effective.operation_type.as_str(), &effective.entity_type, now)
            .with_detail(DETAIL_ENTITY_ID, target_id);

        let backoff = self.classifier.retry_delay(effective.retry_count);
        let gate = now.checked_add_signed(to_chrono(backoff));
        for op in &group.members {
            self.ports.queue.mark_attempt(op.id, now, gate).await?;
        }

        let key = group.key();
        let attempts = effective.retry_count.saturating_add(1);
        let within_window = self.classifier.is_within_retry_window(effective.age(now));
        if self.classifier.should_retry(attempts, &classified) && within_window {
            warn!(
                entity = %key,
                attempts,
                kind = %classified.kind,
                severity = %failure.severity(),
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                error = %classified.message,
                "sync attempt failed, will retry"
            );
            return Ok(GroupOutcome::Retrying { key, operations: group.len(), error: classified });
        }

        error!(
            entity = %key,
            attempts,
            kind = %classified.kind,
            severity = %failure.severity(),
            error = %classified.message,
            "sync operation failed permanently"
        );
        for op in &group.members {
            if self.ports.queue.mark_failed(op.id, &classified).await? {
                self.publish_failed(op, &classified);
            }
        }
        self.record_terminal_failure(&classified, now);
        Ok(GroupOutcome::Failed { key, operations: group.len(), error: classified })
    }

    fn publish_failed(&self, op: &PendingOperation, error: &ErrorInfo) {
        publish(
            &self.bus,
            SyncEvent::OperationFailed {
                operation_id: op.id,
                entity_type: op.entity_type.clone(),
                target_id: op.target_id.clone(),
                error: error.clone(),
            },
            Component::Sync,
            None,
        );
    }

    /* ---------------------------------------------------------------------- */
    /* Status */
    /* ---------------------------------------------------------------------- */

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Watch every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    fn phase(&self) -> SyncPhase {
        self.status.borrow().phase
    }

    /// Reload queue counts into the status.
    pub async fn refresh_counts(&self) -> Result<()> {
        let pending = self.ports.queue.pending_count().await?;
        let failed = self.ports.queue.failed_count().await?;
        self.update_status(|status| {
            status.pending_count = pending;
            status.failed_count = failed;
        });
        Ok(())
    }

    /// Record a connectivity transition and announce it on the bus.
    pub fn connectivity_changed(&self, online: bool) {
        self.update_status(|status| status.is_online = online);
        let event =
            if online { SyncEvent::ConnectivityRestored } else { SyncEvent::ConnectivityLost };
        info!(online, "connectivity changed");
        publish(&self.bus, event, Component::Sync, None);
    }

    /// Toggle timer-driven passes. Manual and reconnect passes still run.
    pub fn set_background_sync_enabled(&self, enabled: bool) {
        self.update_status(|status| status.background_sync_enabled = enabled);
    }

    /// Whether timer-driven passes run.
    pub fn is_background_sync_enabled(&self) -> bool {
        self.status.borrow().background_sync_enabled
    }

    fn record_terminal_failure(&self, error: &ErrorInfo, at: DateTime<Utc>) {
        self.update_status(|status| {
            status.last_error = Some(error.clone());
            status.last_failed_sync_time = Some(at);
        });
    }

    /// Apply `change` and post `StatusChanged` if anything actually changed.
    fn update_status(&self, change: impl FnOnce(&mut SyncStatus)) {
        let mut changed = None;
        self.status.send_if_modified(|status| {
            let before = status.clone();
            change(status);
            if *status == before {
                false
            } else {
                changed = Some(status.clone());
                true
            }
        });
        if let Some(status) = changed {
            publish(&self.bus, SyncEvent::StatusChanged { status }, Component::Sync, None);
        }
    }

    /* ---------------------------------------------------------------------- */
    /* Queue management */
    /* ---------------------------------------------------------------------- */

    /// Every pending operation, oldest first.
    pub async fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
        self.collect_pending().await
    }

    /// Dead-lettered operations, oldest first.
    pub async fn failed_operations(&self) -> Result<Vec<PendingOperation>> {
        self.ports.queue.list_failed().await
    }

    /// Re-queue a dead-lettered operation and drain if online.
    pub async fn retry_operation(&self, id: OperationId) -> Result<bool> {
        let requeued = self.ports.queue.retry_failed(id, self.clock.utc_now()).await?;
        self.refresh_counts().await?;
        if requeued {
            info!(operation_id = id, "re-queued failed operation");
            self.drain_if_online().await?;
        }
        Ok(requeued)
    }

    /// Re-queue every dead-lettered operation and drain if online.
    pub async fn retry_all_failed(&self) -> Result<usize> {
        let requeued = self.ports.queue.retry_all_failed(self.clock.utc_now()).await?;
        self.refresh_counts().await?;
        if requeued > 0 {
            info!(count = requeued, "re-queued all failed operations");
            self.drain_if_online().await?;
        }
        Ok(requeued)
    }

    /// Drop a pending or failed operation without applying it.
    pub async fn cancel_operation(&self, id: OperationId) -> Result<bool> {
        let cancelled = self.ports.queue.cancel(id).await?;
        if cancelled {
            info!(operation_id = id, "cancelled queued operation");
        }
        self.refresh_counts().await?;
        Ok(cancelled)
    }

    /// True while a pending operation targets the entity.
    pub async fn has_pending_for(&self, entity_type: &str, target_id: &str) -> Result<bool> {
        self.ports.queue.has_pending_for(entity_type, target_id).await
    }

    /// Delete dead-lettered operations created before `cutoff`.
    pub async fn purge_failed_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let purged = self.ports.queue.purge_older_than(cutoff).await?;
        self.refresh_counts().await?;
        Ok(purged)
    }

    async fn drain_if_online(&self) -> Result<()> {
        if self.ports.connectivity.is_online() {
            self.sync_now(SyncTrigger::Manual).await?;
        }
        Ok(())
    }

    async fn collect_pending(&self) -> Result<Vec<PendingOperation>> {
        let batch_size = self.settings.batch_size;
        let mut cursor: OperationId = 0;
        let mut pending = Vec::new();
        loop {
            let page = self.ports.queue.dequeue_batch_after(cursor, batch_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = last.id;
            let page_len = page.len();
            pending.extend(page);
            if page_len < batch_size {
                break;
            }
        }
        Ok(pending)
    }
}

fn payload_document(op: &PendingOperation) -> std::result::Result<Document, SyncFailure> {
    op.payload_object().cloned().ok_or_else(|| {
        SyncFailure::Local(TipSyncError::InvalidInput(format!(
            "Payload for {} is not a JSON object",
            op.entity_key()
        )))
    })
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(1))
}
