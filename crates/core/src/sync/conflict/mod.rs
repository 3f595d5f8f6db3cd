//! Conflict detection and resolution
//!
//! The detector compares a queued operation with the remote document as it
//! is now. The policy table picks a strategy for each detected conflict and
//! the resolvers turn that strategy into the document to write.

pub mod detector;
pub mod policy;
pub mod resolver;

pub use detector::ConflictDetector;
pub use policy::ResolutionPolicy;
pub use resolver::{resolve, resolver_for, Resolution, Resolver};
