//! Conflict detection results and resolution strategies

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::impl_domain_status_conversions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    #[default]
    None,
    Timestamp,
    Version,
    FieldValue,
    Unknown,
}

impl_domain_status_conversions!(ConflictType {
    None => "none",
    Timestamp => "timestamp",
    Version => "version",
    FieldValue => "field_value",
    Unknown => "unknown",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    ServerWins,
    ClientWins,
    Merge,
}

impl_domain_status_conversions!(ResolutionStrategy {
    ServerWins => "server_wins",
    ClientWins => "client_wins",
    Merge => "merge",
});

/// Local and remote values of one diverging field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub local: Value,
    pub remote: Value,
}

/// Outcome of one detection call. Never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConflictResult {
    pub is_conflict: bool,
    pub conflict_type: ConflictType,
    pub message: String,
    pub conflicting_fields: BTreeMap<String, FieldConflict>,
    pub details: BTreeMap<String, Value>,
}

impl ConflictResult {
    pub fn none() -> Self {
        Self { message: "No conflict detected".to_string(), ..Self::default() }
    }

    pub fn conflict(conflict_type: ConflictType, message: impl Into<String>) -> Self {
        Self {
            is_conflict: true,
            conflict_type,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Detection could not decide; treated as a conflict.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::conflict(ConflictType::Unknown, message)
    }

    #[must_use]
    pub fn with_fields(mut self, fields: BTreeMap<String, FieldConflict>) -> Self {
        self.conflicting_fields = fields;
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}
