/// Error types for social-sync
use remote_store::StoreError;
use thiserror::Error;

/// Where an error should be shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSurface {
    /// Next to the control that triggered the action
    Inline,
    /// The single notification surface shared by all remote failures
    Notification,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SocialError {
    /// Rejected before any optimistic mutation (blank content, too many categories, ...)
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Cannot follow yourself")]
    SelfRelationRejected,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transport failure or timeout; the optimistic change was rolled back
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// Neither persistence layout could express the write
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SocialError {
    pub fn surface(&self) -> ErrorSurface {
        match self {
            SocialError::Validation(_)
            | SocialError::NotAuthenticated
            | SocialError::SelfRelationRejected
            | SocialError::Forbidden(_) => ErrorSurface::Inline,
            _ => ErrorSurface::Notification,
        }
    }

    /// Whether the user may simply try again. Schema mismatches are fatal for the action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SocialError::RemoteUnavailable(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SocialError::Validation(_) => "validation",
            SocialError::NotAuthenticated => "not_authenticated",
            SocialError::SelfRelationRejected => "self_relation",
            SocialError::Forbidden(_) => "forbidden",
            SocialError::NotFound(_) => "not_found",
            SocialError::Conflict(_) => "conflict",
            SocialError::RemoteUnavailable(_) => "remote_unavailable",
            SocialError::SchemaMismatch(_) => "schema_mismatch",
            SocialError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for SocialError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => SocialError::NotFound(msg),
            StoreError::ConstraintViolation(msg) => SocialError::Conflict(msg),
            StoreError::RelationMissing(msg) | StoreError::Malformed(msg) => {
                SocialError::SchemaMismatch(msg)
            }
            StoreError::Transport(msg) => SocialError::RemoteUnavailable(msg),
            err @ StoreError::Timeout(_) => SocialError::RemoteUnavailable(err.to_string()),
        }
    }
}

/// Result type alias for social operations
pub type SocialResult<T> = Result<T, SocialError>;
