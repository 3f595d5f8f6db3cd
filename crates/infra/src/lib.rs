//! # TipSync Infrastructure
//!
//! Implementations of the sync engine's ports and its runtime plumbing.
//!
//! This crate contains:
//! - The SQLite pending operation queue
//! - Configuration loading from the environment and config files
//! - Tracing subscriber setup
//! - The background sync scheduler
//! - In-memory remote store and `watch`-backed connectivity adapters
//!
//! ## Architecture
//! - Implements traits defined in `tipsync-core`
//! - Contains all "impure" code (I/O, threads, timers)

pub mod config;
pub mod database;
pub mod errors;
pub mod observability;
pub mod scheduling;
pub mod sync;

// Re-export commonly used items
pub use database::{DbManager, SqlitePendingOperationStore};
pub use errors::InfraError;
pub use observability::init_tracing;
pub use scheduling::{SchedulerError, SyncScheduler, SyncSchedulerConfig};
pub use sync::{InMemoryRemoteStore, WatchConnectivity};
