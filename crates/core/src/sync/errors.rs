//! Failures raised at the remote boundary and while applying operations

use std::time::Duration;

use thiserror::Error;
use tipsync_common::error::{ErrorClassification, ErrorSeverity};
use tipsync_domain::{ErrorInfo, ErrorKind, TipSyncError};

use super::classifier::ErrorClassifier;

/// Result of a remote adapter call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Errors reported by a [`RemoteStore`](super::ports::RemoteStore) adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("write rejected by remote: {0}")]
    Rejected(String),

    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

impl ErrorClassification for RemoteError {
    fn is_retryable(&self) -> bool {
        ErrorClassifier::kind_of_remote(self).is_transient()
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound(_) => ErrorSeverity::Info,
            _ => severity_of(ErrorClassifier::kind_of_remote(self)),
        }
    }
}

impl From<RemoteError> for TipSyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Network(msg) | RemoteError::Unavailable(msg) => Self::Network(msg),
            RemoteError::Unauthenticated(msg) | RemoteError::PermissionDenied(msg) => {
                Self::Auth(msg)
            }
            RemoteError::NotFound(msg) => Self::NotFound(msg),
            RemoteError::DeadlineExceeded(msg) => Self::Timeout(msg),
            RemoteError::InvalidArgument(msg) => Self::InvalidInput(msg),
            RemoteError::Rejected(msg) | RemoteError::Other(msg) => Self::Remote(msg),
        }
    }
}

/// Anything that can go wrong while applying one operation.
#[derive(Debug, Clone, Error)]
pub enum SyncFailure {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Local(#[from] TipSyncError),

    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout { operation: String, after: Duration },

    /// Opaque failure text, classified by message heuristics
    #[error("{0}")]
    Message(String),
}

impl SyncFailure {
    /// Timeout of `operation` after waiting `after`.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout { operation: operation.into(), after }
    }
}

impl ErrorClassification for SyncFailure {
    fn is_retryable(&self) -> bool {
        ErrorClassifier::kind_of(self).is_transient()
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Remote(err) => err.severity(),
            Self::Local(TipSyncError::Internal(_)) => ErrorSeverity::Critical,
            Self::Local(TipSyncError::Database(_)) if !self.is_retryable() => {
                ErrorSeverity::Critical
            }
            _ => severity_of(ErrorClassifier::kind_of(self)),
        }
    }
}

fn severity_of(kind: ErrorKind) -> ErrorSeverity {
    if kind.is_transient() {
        ErrorSeverity::Warning
    } else {
        ErrorSeverity::Error
    }
}

/// Domain error surfaced to callers for a classified failure.
pub fn domain_error(info: &ErrorInfo) -> TipSyncError {
    let message = info.message.clone();
    match info.kind {
        ErrorKind::Network => TipSyncError::Network(message),
        ErrorKind::Auth => TipSyncError::Auth(message),
        ErrorKind::Server => TipSyncError::Remote(message),
        ErrorKind::Timeout => TipSyncError::Timeout(message),
        ErrorKind::Validation => TipSyncError::InvalidInput(message),
        ErrorKind::Unknown => TipSyncError::Internal(message),
    }
}
