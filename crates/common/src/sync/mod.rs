//! Synchronization primitives shared by the sync engine
//!
//! ## Submodules
//!
//! - **`retry`**: exponential backoff schedule with a delay ceiling and
//!   optional jitter

pub mod retry;

pub use retry::BackoffPolicy;

// Re-export time abstractions from testing module
pub use crate::testing::time::{Clock, MockClock, SystemClock};
