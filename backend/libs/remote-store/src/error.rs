/// Error types for remote store operations
use std::time::Duration;
use thiserror::Error;

/// Machine-readable class of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorCode {
    NotFound,
    ConstraintViolation,
    RelationMissing,
    Malformed,
    Transport,
    Timeout,
}

impl StoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorCode::NotFound => "not_found",
            StoreErrorCode::ConstraintViolation => "constraint_violation",
            StoreErrorCode::RelationMissing => "relation_missing",
            StoreErrorCode::Malformed => "malformed",
            StoreErrorCode::Transport => "transport",
            StoreErrorCode::Timeout => "timeout",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No row matched the filter of a single-row operation
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Unique or foreign key constraint rejected the write (e.g. duplicate edge)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The table or column addressed does not exist in this deployment
    #[error("Relation does not exist: {0}")]
    RelationMissing(String),

    /// A row came back in a shape that cannot be decoded
    #[error("Malformed row: {0}")]
    Malformed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn code(&self) -> StoreErrorCode {
        match self {
            StoreError::NotFound(_) => StoreErrorCode::NotFound,
            StoreError::ConstraintViolation(_) => StoreErrorCode::ConstraintViolation,
            StoreError::RelationMissing(_) => StoreErrorCode::RelationMissing,
            StoreError::Malformed(_) => StoreErrorCode::Malformed,
            StoreError::Transport(_) => StoreErrorCode::Transport,
            StoreError::Timeout(_) => StoreErrorCode::Timeout,
        }
    }

    /// Transport failures and timeouts are worth retrying; everything else
    /// will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transport(_) | StoreError::Timeout(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Malformed(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
