//! Common error types and classification
//!
//! - **`CommonError`**: failures raised by the shared utilities themselves,
//!   currently invalid configuration
//! - **`ErrorClassification` trait**: a standard interface for asking whether
//!   an error is retryable, how severe it is and when to retry
//! - **`ErrorSeverity` enum**: a unified severity scale for logging
//!
//! ```rust
//! use tipsync_common::error::{CommonError, ErrorSeverity};
//!
//! let err = CommonError::config_field("factor", "must be at least 1.0");
//! assert_eq!(err.to_string(), "Configuration error in field 'factor': must be at least 1.0");
//! assert!(ErrorSeverity::Warning < ErrorSeverity::Critical);
//! ```

use std::fmt;
use std::time::Duration;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised by the shared utilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Configuration-related errors
    Config { message: String, field: Option<String> },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => match field {
                Some(field) => write!(f, "Configuration error in field '{field}': {message}"),
                None => write!(f, "Configuration error: {message}"),
            },
        }
    }
}

impl std::error::Error for CommonError {}

impl CommonError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    pub fn config_field<S: Into<String>, F: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }
}

/// Standard interface for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Transient failures that may succeed if attempted again
    fn is_retryable(&self) -> bool;

    /// Used for logging decisions
    fn severity(&self) -> ErrorSeverity;

    /// Invariant violations that need immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Suggested delay before retrying, when the source provided one
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
