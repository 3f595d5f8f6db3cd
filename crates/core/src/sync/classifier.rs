//! Error classification and retry policy
//!
//! Every failure seen while applying an operation is reduced to an
//! [`ErrorInfo`] with a closed [`ErrorKind`]. The kind alone decides whether
//! the operation stays queued; the retry count and the age of the operation
//! bound how long it may stay there.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tipsync_common::sync::BackoffPolicy;
use tipsync_domain::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_WINDOW_SECS, DETAIL_ENTITY_TYPE, DETAIL_OPERATION,
};
use tipsync_domain::{ErrorInfo, ErrorKind, Result, SyncConfig, TipSyncError};
use tokio::sync::watch;
use tracing::debug;

use super::errors::{RemoteError, SyncFailure};

const NETWORK_HINTS: &[&str] = &["network", "unknownhost", "connect", "unreachable", "offline"];
const IO_HINTS: &[&str] = &["i/o", "io error", "broken pipe", "unexpected eof", "end of file"];
const AUTH_HINTS: &[&str] = &["unauthenticated", "permission denied", "unauthorized", "forbidden"];
const SERVER_HINTS: &[&str] = &[
    "unavailable",
    "throttl",
    "too many requests",
    "overloaded",
    "busy",
    "transient",
    "temporary failure",
    "internal",
];
const TIMEOUT_HINTS: &[&str] = &["timed out", "timeout", "deadline exceeded"];
const VALIDATION_HINTS: &[&str] =
    &["illegal argument", "illegal state", "invalid", "malformed", "unknown entity type"];

/// Maps failures to error kinds and decides retries.
#[derive(Debug)]
pub struct ErrorClassifier {
    max_retries: u32,
    max_retry_window: Duration,
    backoff: BackoffPolicy,
    last_error: watch::Sender<Option<ErrorInfo>>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            BackoffPolicy::default(),
            Duration::from_secs(DEFAULT_MAX_RETRY_WINDOW_SECS),
        )
    }
}

impl ErrorClassifier {
    /// Classifier with an explicit retry cap, backoff and retry window.
    pub fn new(max_retries: u32, backoff: BackoffPolicy, max_retry_window: Duration) -> Self {
        let (last_error, _) = watch::channel(None);
        Self { max_retries, max_retry_window, backoff, last_error }
    }

    /// Build from the `sync` config section.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let backoff =
            BackoffPolicy::new(config.initial_delay(), config.backoff_factor, config.max_delay())
                .map_err(|err| TipSyncError::Config(err.to_string()))?;
        Ok(Self::new(config.max_retries, backoff, config.max_retry_window()))
    }

    /// Attempts allowed before an operation is dead-lettered.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// How long an operation may stay queued.
    pub fn max_retry_window(&self) -> Duration {
        self.max_retry_window
    }

    /// Classify `failure` observed at `at` and publish it as the last
    /// observed error.
    pub fn classify(
        &self,
        failure: &SyncFailure,
        operation: &str,
        entity_type: &str,
        at: DateTime<Utc>,
    ) -> ErrorInfo {
        let kind = Self::kind_of(failure);
        let info = ErrorInfo::new(kind, failure.to_string())
            .with_detail(DETAIL_OPERATION, operation)
            .with_detail(DETAIL_ENTITY_TYPE, entity_type)
            .at(at);

        debug!(
            kind = %info.kind,
            retryable = info.is_retryable,
            operation,
            entity_type,
            error = %info.message,
            "classified sync failure"
        );
        self.last_error.send_replace(Some(info.clone()));
        info
    }

    /// Error kind for a failure, without side effects.
    pub fn kind_of(failure: &SyncFailure) -> ErrorKind {
        match failure {
            SyncFailure::Remote(err) => Self::kind_of_remote(err),
            SyncFailure::Local(err) => match err {
                TipSyncError::Network(_) => ErrorKind::Network,
                TipSyncError::Auth(_) => ErrorKind::Auth,
                TipSyncError::Remote(_) => ErrorKind::Server,
                TipSyncError::Timeout(_) => ErrorKind::Timeout,
                TipSyncError::InvalidInput(_)
                | TipSyncError::NotFound(_)
                | TipSyncError::Conflict(_)
                | TipSyncError::Config(_) => ErrorKind::Validation,
                TipSyncError::Database(message) => Self::storage_kind(message),
                TipSyncError::Internal(_) => ErrorKind::Unknown,
            },
            SyncFailure::Timeout { .. } => ErrorKind::Timeout,
            SyncFailure::Message(message) => Self::kind_from_message(message),
        }
    }

    /// Error kind for a remote adapter error.
    pub fn kind_of_remote(err: &RemoteError) -> ErrorKind {
        match err {
            RemoteError::Network(_) => ErrorKind::Network,
            RemoteError::Unauthenticated(_) | RemoteError::PermissionDenied(_) => ErrorKind::Auth,
            RemoteError::Rejected(_) | RemoteError::Unavailable(_) => ErrorKind::Server,
            RemoteError::DeadlineExceeded(_) => ErrorKind::Timeout,
            RemoteError::InvalidArgument(_) | RemoteError::NotFound(_) => ErrorKind::Validation,
            RemoteError::Other(message) => Self::kind_from_message(message),
        }
    }

    /// Substring heuristics for failures that only carry text.
    pub fn kind_from_message(message: &str) -> ErrorKind {
        let lowered = message.to_lowercase();
        let matches = |hints: &[&str]| hints.iter().any(|hint| lowered.contains(hint));

        if matches(NETWORK_HINTS) || matches(IO_HINTS) {
            ErrorKind::Network
        } else if matches(AUTH_HINTS) {
            ErrorKind::Auth
        } else if matches(SERVER_HINTS) {
            ErrorKind::Server
        } else if matches(TIMEOUT_HINTS) {
            ErrorKind::Timeout
        } else if matches(VALIDATION_HINTS) {
            ErrorKind::Validation
        } else {
            ErrorKind::Unknown
        }
    }

    /// Local storage failures are retried only when they look like I/O.
    fn storage_kind(message: &str) -> ErrorKind {
        let lowered = message.to_lowercase();
        if IO_HINTS.iter().any(|hint| lowered.contains(hint)) {
            ErrorKind::Network
        } else {
            ErrorKind::Unknown
        }
    }

    /// True while `retry_count` attempts leave budget and the kind is transient.
    pub fn should_retry(&self, retry_count: u32, error: &ErrorInfo) -> bool {
        retry_count < self.max_retries && error.kind.is_transient()
    }

    /// Backoff before the next attempt, capped at the policy's max delay.
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        self.backoff.delay(retry_count)
    }

    /// False once an operation has been queued longer than the retry window.
    pub fn is_within_retry_window(&self, age: chrono::Duration) -> bool {
        age.to_std().map_or(true, |age| age <= self.max_retry_window)
    }

    /// Most recent classified failure.
    pub fn last_error(&self) -> Option<ErrorInfo> {
        self.last_error.borrow().clone()
    }

    /// Watch classified failures as they happen.
    pub fn subscribe(&self) -> watch::Receiver<Option<ErrorInfo>> {
        self.last_error.subscribe()
    }

    /// Forget the last failure, e.g. after the user dismissed it.
    pub fn clear_last_error(&self) {
        self.last_error.send_replace(None);
    }
}
