//! Offline synchronization
//!
//! Local writes land in the cache and, when the remote cannot take them,
//! in the pending operation queue. The orchestrator drains that queue,
//! resolves conflicts against the remote state and publishes progress on
//! the event bus.

pub mod classifier;
pub mod coalesce;
pub mod collections;
pub mod conflict;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod ports;
pub mod report;
pub mod repository;
