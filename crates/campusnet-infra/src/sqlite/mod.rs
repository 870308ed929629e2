//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod chat;
pub mod chunk;
pub mod message;
pub mod pool;

use chrono::{DateTime, Utc};
use campusnet_types::error::RepositoryError;
use sqlx::error::ErrorKind;
use uuid::Uuid;

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn parse_uuid(s: &str, what: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what}: {e}")))
}

/// Map a sqlx error onto the repository error taxonomy.
///
/// Only lock contention and lost connections come back transient. Unique
/// keys become `Conflict`; other constraint failures are permanent.
pub(crate) fn query_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            if db_err.code().as_deref().is_some_and(is_busy_code) {
                return RepositoryError::Busy(message);
            }
            match db_err.kind() {
                ErrorKind::UniqueViolation => RepositoryError::Conflict(message),
                ErrorKind::ForeignKeyViolation
                | ErrorKind::CheckViolation
                | ErrorKind::NotNullViolation => RepositoryError::Constraint(message),
                _ => RepositoryError::Query(message),
            }
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes.
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>()
        .is_ok_and(|c| matches!(c & 0xff, 5 | 6))
}
