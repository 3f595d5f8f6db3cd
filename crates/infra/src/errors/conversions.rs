//! Conversions from external infrastructure errors into domain errors.

use rusqlite::Error as SqlError;
use tipsync_domain::TipSyncError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TipSyncError);

impl From<InfraError> for TipSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TipSyncError> for InfraError {
    fn from(value: TipSyncError) -> Self {
        InfraError(value)
    }
}

trait IntoTipSyncError {
    fn into_tipsync(self) -> TipSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → TipSyncError */
/* -------------------------------------------------------------------------- */

impl IntoTipSyncError for SqlError {
    fn into_tipsync(self) -> TipSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => TipSyncError::Database("database is busy".into()),
                    (ErrorCode::DatabaseLocked, _) => {
                        TipSyncError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        TipSyncError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::DiskFull, _) => TipSyncError::Database("disk is full".into()),
                    (ErrorCode::NotADatabase, _) => {
                        TipSyncError::Database("file is not a database".into())
                    }
                    _ => TipSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => TipSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                TipSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                TipSyncError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => TipSyncError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidPath(path) => TipSyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => TipSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_tipsync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → TipSyncError */
/* -------------------------------------------------------------------------- */

impl IntoTipSyncError for r2d2::Error {
    fn into_tipsync(self) -> TipSyncError {
        TipSyncError::Database(format!("connection pool unavailable: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_tipsync())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → TipSyncError */
/* -------------------------------------------------------------------------- */

impl IntoTipSyncError for JoinError {
    fn into_tipsync(self) -> TipSyncError {
        if self.is_cancelled() {
            TipSyncError::Internal("blocking database task cancelled".into())
        } else {
            TipSyncError::Internal(format!("blocking database task panicked: {self}"))
        }
    }
}

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        InfraError(value.into_tipsync())
    }
}
