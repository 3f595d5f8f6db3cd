//! Classified sync failures

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Failure taxonomy used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Network,
    Auth,
    Server,
    Timeout,
    Validation,
    Unknown,
}

impl_domain_status_conversions!(ErrorKind {
    Network => "network",
    Auth => "auth",
    Server => "server",
    Timeout => "timeout",
    Validation => "validation",
    Unknown => "unknown",
});

impl ErrorKind {
    /// Kinds that may succeed if the same request is sent again later.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Server | Self::Timeout)
    }

    /// Kinds that mean the remote could not be reached at all.
    pub const fn is_unreachable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

/// A classified failure, kept as the observable "last error".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub is_retryable: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            is_retryable: kind.is_transient(),
            timestamp: Utc::now(),
            details: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}
