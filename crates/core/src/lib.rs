//! # TipSync Core
//!
//! Sync engine logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for the operation queue, remote store and connectivity
//! - Error classification and retry policy
//! - Conflict detection and resolution
//! - The sync orchestrator and the offline repository
//!
//! ## Architecture Principles
//! - Only depends on `tipsync-common` and `tipsync-domain`
//! - No database, network or platform code
//! - All external dependencies via traits

pub mod sync;

pub use sync::classifier::ErrorClassifier;
pub use sync::collections::CollectionMap;
pub use sync::conflict::{ConflictDetector, Resolution, ResolutionPolicy};
pub use sync::errors::{RemoteError, RemoteResult, SyncFailure};
pub use sync::events::{publish, SyncBus};
pub use sync::orchestrator::{DrainSettings, SyncOrchestrator};
pub use sync::ports::{
    ConnectivityMonitor, PendingOperationStore, RemoteStore, SnapshotStream, SyncPorts,
};
pub use sync::report::{SkipReason, SyncReport, SyncTrigger};
pub use sync::repository::{DocumentCache, OfflineRepository, WriteOutcome};
