//! Testing utilities and helpers
//!
//! - **[`time`]**: clock abstraction with a manually advanced mock
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use tipsync_common::testing::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let before = clock.utc_now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!((clock.utc_now() - before).num_seconds(), 5);
//! ```

pub mod time;

pub use time::{Clock, MockClock, SystemClock};
