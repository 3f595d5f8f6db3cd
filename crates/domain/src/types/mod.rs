//! Domain types and models
//!
//! Everything the sync engine persists, publishes or hands across a port.

pub mod conflict;
pub mod document;
pub mod error_info;
pub mod events;
pub mod operation;
pub mod status;

pub use conflict::{ConflictResult, ConflictType, FieldConflict, ResolutionStrategy};
pub use document::{document_from_value, Document};
pub use error_info::{ErrorInfo, ErrorKind};
pub use events::{Component, EventKind, SyncEvent};
pub use operation::{
    EntityKey, NewPendingOperation, OperationId, OperationStatus, OperationType, PendingOperation,
};
pub use status::{SyncPhase, SyncStatus};
