//! Shared test helpers for `tipsync-core` integration tests.
//!
//! [`Harness`] wires an orchestrator to mock ports, a mock clock and a
//! fresh bus so scenarios can focus on behaviour instead of setup.

#![allow(dead_code)]

pub mod repositories;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tipsync_common::cache::{CacheConfig, TtlCache};
use tipsync_common::events::Subscription;
use tipsync_common::testing::{Clock as _, MockClock};
use tipsync_core::{
    DocumentCache, OfflineRepository, PendingOperationStore, SyncBus, SyncOrchestrator, SyncPorts,
};
use tipsync_domain::{
    document_from_value, Component, Document, EventKind, NewPendingOperation, OperationType,
    PendingOperation, SyncConfig, SyncEvent,
};

pub use repositories::{MockConnectivity, MockQueue, MockRemote};

pub struct Harness {
    pub queue: Arc<MockQueue>,
    pub remote: Arc<MockRemote>,
    pub connectivity: Arc<MockConnectivity>,
    pub clock: MockClock,
    pub bus: SyncBus,
    pub cache: DocumentCache<MockClock>,
    pub orchestrator: SyncOrchestrator<MockClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let queue = Arc::new(MockQueue::new());
        let remote = Arc::new(MockRemote::new());
        let connectivity = Arc::new(MockConnectivity::new(true));
        let clock = MockClock::new();
        let bus = SyncBus::new();
        let cache: DocumentCache<MockClock> =
            TtlCache::with_clock(CacheConfig::ttl(Duration::from_secs(300)), clock.clone());

        let ports = SyncPorts::new(queue.clone(), remote.clone(), connectivity.clone());
        let orchestrator =
            SyncOrchestrator::new(ports, cache.clone(), bus.clone(), clock.clone(), &config)
                .expect("valid sync config");

        Self { queue, remote, connectivity, clock, bus, cache, orchestrator }
    }

    pub fn ports(&self) -> SyncPorts {
        SyncPorts::new(self.queue.clone(), self.remote.clone(), self.connectivity.clone())
    }

    /// Repository sharing this harness's ports, cache, bus and classifier.
    pub fn repository(&self, component: Component) -> OfflineRepository<MockClock> {
        OfflineRepository::new(
            component,
            self.ports(),
            self.cache.clone(),
            self.bus.clone(),
            Arc::clone(self.orchestrator.classifier()),
            self.clock.clone(),
        )
    }

    pub async fn enqueue(
        &self,
        kind: OperationType,
        entity_type: &str,
        target_id: &str,
        payload: Value,
    ) -> PendingOperation {
        self.queue
            .enqueue(
                NewPendingOperation::new(kind, entity_type, target_id, "driver-1", payload)
                    .with_created_at(self.clock.utc_now()),
            )
            .await
            .expect("enqueue")
    }

    /// Move the mock clock past any backoff gate.
    pub fn skip_backoff(&self) {
        self.clock.advance(Duration::from_secs(2 * 3600));
    }
}

pub fn doc(value: Value) -> Document {
    document_from_value(value).expect("object literal")
}

/// Everything delivered to `subscription` so far.
pub fn drain_events(subscription: &mut Subscription<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscription.try_recv() {
        events.push(event);
    }
    events
}

/// Subscribe as a component other than the orchestrator's.
pub fn listen(bus: &SyncBus, kind: EventKind) -> Subscription<SyncEvent> {
    bus.subscribe(kind, Component::Delivery)
}
