//! Events exchanged between sync components over the bus

use serde::{Deserialize, Serialize};

use super::conflict::{ConflictType, ResolutionStrategy};
use super::error_info::ErrorInfo;
use super::operation::{OperationId, OperationType};
use super::status::SyncStatus;
use crate::impl_domain_status_conversions;

/// Components that publish or listen on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Component {
    Sync,
    Delivery,
    Address,
    Subscription,
    Config,
    Preference,
    UserProfile,
}

impl_domain_status_conversions!(Component {
    Sync => "sync",
    Delivery => "delivery",
    Address => "address",
    Subscription => "subscription",
    Config => "config",
    Preference => "preference",
    UserProfile => "userprofile",
});

/// Stable event names used for registration and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OperationEnqueued,
    OperationCompleted,
    OperationFailed,
    StatusChanged,
    ConnectivityRestored,
    ConnectivityLost,
    ConflictDetected,
}

impl_domain_status_conversions!(EventKind {
    OperationEnqueued => "sync_operation_enqueued",
    OperationCompleted => "sync_operation_completed",
    OperationFailed => "sync_operation_failed",
    StatusChanged => "sync_status_changed",
    ConnectivityRestored => "connectivity_restored",
    ConnectivityLost => "connectivity_lost",
    ConflictDetected => "sync_conflict_detected",
});

/// Closed set of sync events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    OperationEnqueued {
        operation_id: OperationId,
        operation_type: OperationType,
        entity_type: String,
        target_id: String,
    },
    OperationCompleted {
        operation_id: OperationId,
        entity_type: String,
        target_id: String,
        /// Set when the write went through conflict resolution
        resolution: Option<ResolutionStrategy>,
    },
    OperationFailed {
        operation_id: OperationId,
        entity_type: String,
        target_id: String,
        error: ErrorInfo,
    },
    StatusChanged {
        status: SyncStatus,
    },
    ConnectivityRestored,
    ConnectivityLost,
    ConflictDetected {
        entity_type: String,
        target_id: String,
        conflict_type: ConflictType,
        strategy: ResolutionStrategy,
    },
}

impl SyncEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::OperationEnqueued { .. } => EventKind::OperationEnqueued,
            Self::OperationCompleted { .. } => EventKind::OperationCompleted,
            Self::OperationFailed { .. } => EventKind::OperationFailed,
            Self::StatusChanged { .. } => EventKind::StatusChanged,
            Self::ConnectivityRestored => EventKind::ConnectivityRestored,
            Self::ConnectivityLost => EventKind::ConnectivityLost,
            Self::ConflictDetected { .. } => EventKind::ConflictDetected,
        }
    }

    /// Name used in logs and serialized envelopes.
    pub const fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_stable() {
        let event = SyncEvent::StatusChanged { status: SyncStatus::default() };
        assert_eq!(event.name(), "sync_status_changed");
        assert_eq!(EventKind::OperationFailed.to_string(), "sync_operation_failed");
        assert_eq!(SyncEvent::ConnectivityLost.kind(), EventKind::ConnectivityLost);
    }

    #[test]
    fn component_parses_case_insensitively() {
        assert_eq!("userProfile".parse::<Component>(), Ok(Component::UserProfile));
        assert_eq!(Component::Delivery.as_str(), "delivery");
    }
}
