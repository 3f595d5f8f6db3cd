//! Database implementations

pub mod manager;
pub mod pending_operation_repository;

pub use manager::{DbManager, SqliteConnection, SCHEMA_VERSION};
pub use pending_operation_repository::SqlitePendingOperationStore;
