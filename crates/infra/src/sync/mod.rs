//! Sync adapters
//!
//! - [`InMemoryRemoteStore`]: document store kept in process memory, with
//!   switchable connectivity and scripted failures
//! - [`WatchConnectivity`]: connectivity flag backed by a `watch` channel

pub mod connectivity;
pub mod memory_remote;

pub use connectivity::WatchConnectivity;
pub use memory_remote::{DocumentChange, InMemoryRemoteStore};
