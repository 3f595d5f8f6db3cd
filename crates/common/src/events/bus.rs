//! Channel-backed publish/subscribe bus

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Handle returned by `register`/`subscribe`, used to unregister.
pub type ListenerId = u64;

/// Callback-style listener driven by its own task.
#[async_trait]
pub trait EventListener<E>: Send + Sync + 'static {
    async fn on_event(&self, event: E);
}

struct Registration<C, E> {
    id: ListenerId,
    component: C,
    sender: mpsc::UnboundedSender<E>,
}

struct BusInner<K, C, E> {
    registry: RwLock<HashMap<K, Vec<Registration<C, E>>>>,
    next_id: AtomicU64,
}

/// Typed event bus keyed by event kind, routed by component.
///
/// Every listener owns an unbounded channel, so `post` never waits on a
/// subscriber. A broadcast reaches every listener of the kind except those
/// registered by the source component; a targeted post reaches only the
/// target component's listeners.
pub struct EventBus<K, C, E> {
    inner: Arc<BusInner<K, C, E>>,
}

impl<K, C, E> Clone for EventBus<K, C, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K, C, E> Default for EventBus<K, C, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    C: Eq + Clone + Debug + Send + Sync + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, C, E> EventBus<K, C, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    C: Eq + Clone + Debug + Send + Sync + 'static,
    E: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener; a task is spawned that feeds it events in order.
    ///
    /// Must be called from within a tokio runtime. A panicking listener is
    /// logged and keeps receiving later events.
    pub fn register<L>(&self, kind: K, component: C, listener: L) -> ListenerId
    where
        L: EventListener<E>,
    {
        let Subscription { id, mut receiver } = self.subscribe(kind.clone(), component.clone());
        let listener = Arc::new(listener);

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let delivery = AssertUnwindSafe(listener.on_event(event)).catch_unwind().await;
                if delivery.is_err() {
                    warn!(listener_id = id, ?kind, ?component, "event listener panicked");
                }
            }
        });

        id
    }

    /// Register a channel receiver instead of a callback.
    pub fn subscribe(&self, kind: K, component: C) -> Subscription<E> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .registry
            .write()
            .entry(kind)
            .or_default()
            .push(Registration { id, component, sender });

        Subscription { id, receiver }
    }

    /// Remove a registration. Returns false if it was not registered.
    pub fn unregister(&self, kind: &K, id: ListenerId) -> bool {
        let mut registry = self.inner.registry.write();
        let Some(registrations) = registry.get_mut(kind) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        let removed = registrations.len() != before;
        if registrations.is_empty() {
            registry.remove(kind);
        }
        removed
    }

    /// Deliver `event` to the listeners selected by the routing rules.
    ///
    /// Returns the number of listeners the event was handed to.
    pub fn post(&self, kind: &K, event: E, source: &C, target: Option<&C>) -> usize {
        let recipients: Vec<(ListenerId, mpsc::UnboundedSender<E>)> = {
            let registry = self.inner.registry.read();
            registry
                .get(kind)
                .map(|registrations| {
                    registrations
                        .iter()
                        .filter(|registration| match target {
                            Some(target) => &registration.component == target,
                            None => &registration.component != source,
                        })
                        .map(|registration| (registration.id, registration.sender.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, sender) in recipients {
            if sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(id);
            }
        }

        if !closed.is_empty() {
            self.prune(kind, &closed);
        }

        debug!(?kind, ?source, ?target, delivered, "event posted");
        delivered
    }

    pub fn listener_count(&self, kind: &K) -> usize {
        self.inner.registry.read().get(kind).map_or(0, Vec::len)
    }

    /// Drop every registration; listener tasks end once their channel drains.
    pub fn clear(&self) {
        self.inner.registry.write().clear();
    }

    fn prune(&self, kind: &K, closed: &[ListenerId]) {
        let mut registry = self.inner.registry.write();
        if let Some(registrations) = registry.get_mut(kind) {
            registrations.retain(|registration| !closed.contains(&registration.id));
        }
        debug!(?kind, pruned = closed.len(), "removed closed subscriptions");
    }
}

/// Receiving side of a channel subscription.
///
/// Dropping it closes the channel; the bus prunes the registration on the
/// next post.
#[derive(Debug)]
pub struct Subscription<E> {
    id: ListenerId,
    receiver: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for events::bus.
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Saved,
        Removed,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Part {
        Engine,
        Ledger,
        Screen,
    }

    type TestBus = EventBus<Kind, Part, String>;

    /// Validates broadcast routing for the source exclusion scenario.
    ///
    /// Assertions:
    /// - Confirms the source component's own subscription receives nothing.
    /// - Confirms every other component receives the event.
    #[tokio::test]
    async fn test_broadcast_skips_source() {
        let bus = TestBus::new();
        let mut engine = bus.subscribe(Kind::Saved, Part::Engine);
        let mut ledger = bus.subscribe(Kind::Saved, Part::Ledger);
        let mut screen = bus.subscribe(Kind::Saved, Part::Screen);

        let delivered = bus.post(&Kind::Saved, "d1".to_string(), &Part::Engine, None);

        assert_eq!(delivered, 2);
        assert_eq!(engine.try_recv(), None);
        assert_eq!(ledger.recv().await.as_deref(), Some("d1"));
        assert_eq!(screen.recv().await.as_deref(), Some("d1"));
    }

    /// Validates targeted routing for the single recipient scenario.
    ///
    /// Assertions:
    /// - Confirms only the target component receives the event.
    #[tokio::test]
    async fn test_targeted_post_reaches_only_target() {
        let bus = TestBus::new();
        let mut ledger = bus.subscribe(Kind::Saved, Part::Ledger);
        let mut screen = bus.subscribe(Kind::Saved, Part::Screen);

        let delivered = bus.post(&Kind::Saved, "d2".to_string(), &Part::Engine, Some(&Part::Screen));

        assert_eq!(delivered, 1);
        assert_eq!(ledger.try_recv(), None);
        assert_eq!(screen.recv().await.as_deref(), Some("d2"));
    }

    /// Validates kind filtering for the unrelated kind scenario.
    ///
    /// Assertions:
    /// - Confirms listeners of another kind are not reached.
    #[tokio::test]
    async fn test_kinds_are_independent() {
        let bus = TestBus::new();
        let mut removed = bus.subscribe(Kind::Removed, Part::Ledger);

        assert_eq!(bus.post(&Kind::Saved, "x".to_string(), &Part::Engine, None), 0);
        assert_eq!(removed.try_recv(), None);
    }

    /// Validates `unregister` for the removal scenario.
    ///
    /// Assertions:
    /// - Confirms the first unregister succeeds and the second reports false.
    /// - Confirms no delivery happens afterwards.
    #[tokio::test]
    async fn test_unregister() {
        let bus = TestBus::new();
        let sub = bus.subscribe(Kind::Saved, Part::Ledger);

        assert!(bus.unregister(&Kind::Saved, sub.id()));
        assert!(!bus.unregister(&Kind::Saved, sub.id()));
        assert_eq!(bus.post(&Kind::Saved, "x".to_string(), &Part::Engine, None), 0);
    }

    /// Validates pruning for the dropped subscription scenario.
    ///
    /// Assertions:
    /// - Confirms a dropped receiver is removed on the next post.
    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let bus = TestBus::new();
        drop(bus.subscribe(Kind::Saved, Part::Ledger));
        assert_eq!(bus.listener_count(&Kind::Saved), 1);

        assert_eq!(bus.post(&Kind::Saved, "x".to_string(), &Part::Engine, None), 0);
        assert_eq!(bus.listener_count(&Kind::Saved), 0);
    }

    struct Exploding;

    #[async_trait]
    impl EventListener<String> for Exploding {
        async fn on_event(&self, event: String) {
            panic!("listener failure on {event}");
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl EventListener<String> for Counting {
        async fn on_event(&self, _event: String) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Validates listener isolation for the panicking listener scenario.
    ///
    /// Assertions:
    /// - Confirms a healthy listener still receives both events.
    /// - Confirms the panicking listener stays registered.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicking_listener_is_isolated() {
        let bus = TestBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.register(Kind::Saved, Part::Screen, Exploding);
        bus.register(Kind::Saved, Part::Ledger, Counting(Arc::clone(&count)));

        assert_eq!(bus.post(&Kind::Saved, "a".to_string(), &Part::Engine, None), 2);
        assert_eq!(bus.post(&Kind::Saved, "b".to_string(), &Part::Engine, None), 2);

        tokio::time::timeout(Duration::from_secs(2), async {
            while count.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("healthy listener should see both events");
        assert_eq!(bus.listener_count(&Kind::Saved), 2);
    }
}
