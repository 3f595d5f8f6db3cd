//! # TipSync Domain
//!
//! Business domain types for the offline synchronization engine.
//!
//! This crate contains:
//! - Pending operations, conflict results, error records and sync status
//! - The closed set of bus events exchanged between components
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other TipSync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
