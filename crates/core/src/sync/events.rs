//! Sync events on the shared bus

use tipsync_common::events::EventBus;
use tipsync_domain::{Component, EventKind, SyncEvent};
use tracing::trace;

/// Bus carrying [`SyncEvent`]s, keyed by [`EventKind`] and routed by
/// [`Component`].
pub type SyncBus = EventBus<EventKind, Component, SyncEvent>;

/// Post `event` under its own kind. Returns how many listeners received it.
pub fn publish(
    bus: &SyncBus,
    event: SyncEvent,
    source: Component,
    target: Option<Component>,
) -> usize {
    let kind = event.kind();
    let delivered = bus.post(&kind, event, &source, target.as_ref());
    trace!(event = %kind, %source, delivered, "published sync event");
    delivered
}
