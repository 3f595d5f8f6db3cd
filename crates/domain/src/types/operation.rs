//! Pending operation records
//!
//! A pending operation is one local mutation that the remote store has not
//! confirmed yet. Records are durable, drained oldest first and removed only
//! once the remote acknowledges them or a user cancels them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::Document;
use super::error_info::ErrorInfo;
use crate::impl_domain_status_conversions;

/// Locally assigned, monotonic queue identifier.
pub type OperationId = i64;

/* -------------------------------------------------------------------------- */
/* Enums */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl_domain_status_conversions!(OperationType {
    Create => "create",
    Update => "update",
    Delete => "delete",
});

/// Queue status; `Failed` is the dead-letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    #[default]
    Pending,
    Failed,
}

impl_domain_status_conversions!(OperationStatus {
    Pending => "pending",
    Failed => "failed",
});

/* -------------------------------------------------------------------------- */
/* Entity identity */
/* -------------------------------------------------------------------------- */

/// Identity of the remote entity an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: String,
    pub target_id: String,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self { entity_type: entity_type.into(), target_id: target_id.into() }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.target_id)
    }
}

/* -------------------------------------------------------------------------- */
/* Operations */
/* -------------------------------------------------------------------------- */

/// An operation about to be enqueued. The queue assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPendingOperation {
    pub operation_type: OperationType,
    pub entity_type: String,
    /// Empty for entities not yet created remotely
    pub target_id: String,
    pub owner_id: String,
    /// Intended state (create) or field delta (update)
    pub payload: Value,
    /// Last known version of the document when the write was issued
    pub base_snapshot: Option<Document>,
    pub created_at: DateTime<Utc>,
}

impl NewPendingOperation {
    pub fn new(
        operation_type: OperationType,
        entity_type: impl Into<String>,
        target_id: impl Into<String>,
        owner_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            operation_type,
            entity_type: entity_type.into(),
            target_id: target_id.into(),
            owner_id: owner_id.into(),
            payload,
            base_snapshot: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_base_snapshot(mut self, base: Option<Document>) -> Self {
        self.base_snapshot = base;
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// A durable queue record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: OperationId,
    pub operation_type: OperationType,
    pub entity_type: String,
    pub target_id: String,
    pub owner_id: String,
    pub payload: Value,
    pub base_snapshot: Option<Document>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Backoff gate; the operation is not attempted before this instant
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub status: OperationStatus,
    /// Terminal failure recorded when the operation was dead-lettered
    pub last_error: Option<ErrorInfo>,
    /// Last time a dead-lettered record was put back in the queue
    #[serde(default)]
    pub requeued_at: Option<DateTime<Utc>>,
}

impl PendingOperation {
    /// Build the stored form of a freshly enqueued operation.
    pub fn from_new(id: OperationId, op: NewPendingOperation) -> Self {
        Self {
            id,
            operation_type: op.operation_type,
            entity_type: op.entity_type,
            target_id: op.target_id,
            owner_id: op.owner_id,
            payload: op.payload,
            base_snapshot: op.base_snapshot,
            retry_count: 0,
            created_at: op.created_at,
            last_attempt_at: None,
            next_attempt_at: None,
            status: OperationStatus::Pending,
            last_error: None,
            requeued_at: None,
        }
    }

    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.entity_type.clone(), self.target_id.clone())
    }

    /// The payload as an object, if it is one.
    pub fn payload_object(&self) -> Option<&Document> {
        self.payload.as_object()
    }

    /// True when the backoff gate has passed.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map_or(true, |gate| gate <= now)
    }

    /// Time spent in the queue since it was created or last re-queued.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let since = self.requeued_at.map_or(self.created_at, |at| at.max(self.created_at));
        now.signed_duration_since(since)
    }

    pub fn is_failed(&self) -> bool {
        self.status == OperationStatus::Failed
    }
}
