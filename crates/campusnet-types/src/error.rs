use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;

/// Errors from repository operations (used by trait definitions in campusnet-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    /// Another writer got there first: a stale record version, a moved
    /// pointer, or a key that already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The database is locked by another connection or process.
    #[error("database busy: {0}")]
    Busy(String),

    /// A foreign key, check, or not-null constraint rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),
}

impl RepositoryError {
    /// Whether retrying the same write could succeed.
    ///
    /// Conflicts are not transient: the caller has to re-read before trying again.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Connection | RepositoryError::Busy(_))
    }
}

/// Errors raised while placing messages into chunks.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chat not found")]
    ChatNotFound,

    #[error("invalid message kind: '{0}'")]
    InvalidMessageKind(String),

    #[error("message weight {weight} exceeds chunk capacity {capacity}")]
    MessageTooLarge { weight: u32, capacity: u32 },

    #[error("chunk persistence failed: {0}")]
    ChunkPersistenceFailure(String),

    #[error("chunk not found")]
    ChunkNotFound,

    #[error("corrupt chunk chain: {0}")]
    CorruptChain(String),
}

/// Errors surfaced by the message append service to its callers.
#[derive(Debug, Error)]
pub enum AppendError {
    #[error("user not found")]
    UserNotFound,

    #[error("chat not found")]
    ChatNotFound,

    #[error("user is not a member of this chat")]
    NotMember,

    #[error("message not found")]
    MessageNotFound,

    #[error("only the sender can delete this message")]
    NotSender,

    #[error("invalid message kind: '{0}'")]
    InvalidMessageKind(String),

    #[error("message content cannot be empty")]
    EmptyContent,

    #[error("message is too large for a chunk (weight {weight}, capacity {capacity})")]
    MessageTooLarge { weight: u32, capacity: u32 },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<ChunkError> for AppendError {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::ChatNotFound => AppendError::ChatNotFound,
            ChunkError::InvalidMessageKind(kind) => AppendError::InvalidMessageKind(kind),
            ChunkError::MessageTooLarge { weight, capacity } => {
                AppendError::MessageTooLarge { weight, capacity }
            }
            ChunkError::ChunkPersistenceFailure(msg) => AppendError::Storage(msg),
            ChunkError::ChunkNotFound => AppendError::Storage("chunk not found".to_string()),
            ChunkError::CorruptChain(msg) => AppendError::Storage(format!("corrupt chunk chain: {msg}")),
        }
    }
}

impl From<RepositoryError> for AppendError {
    fn from(e: RepositoryError) -> Self {
        AppendError::Storage(e.to_string())
    }
}

/// Caller-facing classification of an operation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    NotFound,
    Forbidden,
    Validation,
    Internal,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::NotFound => write!(f, "not_found"),
            OutcomeStatus::Forbidden => write!(f, "forbidden"),
            OutcomeStatus::Validation => write!(f, "validation"),
            OutcomeStatus::Internal => write!(f, "internal"),
        }
    }
}

impl AppendError {
    /// Classify this error for the caller.
    pub fn status(&self) -> OutcomeStatus {
        match self {
            AppendError::UserNotFound | AppendError::ChatNotFound | AppendError::MessageNotFound => {
                OutcomeStatus::NotFound
            }
            AppendError::NotMember | AppendError::NotSender => OutcomeStatus::Forbidden,
            AppendError::InvalidMessageKind(_)
            | AppendError::EmptyContent
            | AppendError::MessageTooLarge { .. } => OutcomeStatus::Validation,
            AppendError::Storage(_) => OutcomeStatus::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_repository_error_transient() {
        assert!(RepositoryError::Connection.is_transient());
        assert!(RepositoryError::Busy("database is locked".into()).is_transient());
        assert!(!RepositoryError::Query("no such column".into()).is_transient());
        assert!(!RepositoryError::NotFound.is_transient());
        assert!(!RepositoryError::Conflict("stale version".into()).is_transient());
        assert!(!RepositoryError::Constraint("FOREIGN KEY constraint failed".into()).is_transient());
    }

    #[test]
    fn test_chunk_error_display() {
        let err = ChunkError::MessageTooLarge {
            weight: 60,
            capacity: 50,
        };
        assert_eq!(err.to_string(), "message weight 60 exceeds chunk capacity 50");
    }

    #[test]
    fn test_chunk_error_converts_to_append_error() {
        let err: AppendError = ChunkError::InvalidMessageKind("sticker".into()).into();
        assert_eq!(err.status(), OutcomeStatus::Validation);
        assert!(err.to_string().contains("sticker"));

        let err: AppendError = ChunkError::ChatNotFound.into();
        assert_eq!(err.status(), OutcomeStatus::NotFound);

        let err: AppendError = ChunkError::ChunkPersistenceFailure("disk full".into()).into();
        assert_eq!(err.status(), OutcomeStatus::Internal);
    }

    #[test]
    fn test_append_error_status_classification() {
        assert_eq!(AppendError::UserNotFound.status(), OutcomeStatus::NotFound);
        assert_eq!(AppendError::NotMember.status(), OutcomeStatus::Forbidden);
        assert_eq!(AppendError::NotSender.status(), OutcomeStatus::Forbidden);
        assert_eq!(AppendError::EmptyContent.status(), OutcomeStatus::Validation);
    }

    #[test]
    fn test_outcome_status_serde() {
        let json = serde_json::to_string(&OutcomeStatus::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }
}
