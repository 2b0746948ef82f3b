use crate::domain::{EdgeKey, Relation};
use remote_store::{Row, StoreError, StoreResult};
use serde::Serialize;
use uuid::Uuid;

/// The second of two non-atomic row writes failed: the subject's side
/// records the new state, the object's side does not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialFailure {
    /// `table.column` of the side that was written
    pub written: String,
    /// `table.column` of the side that still holds the old state
    pub failed: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteReport {
    Complete,
    Partial(PartialFailure),
}

impl WriteReport {
    pub fn partial(&self) -> Option<&PartialFailure> {
        match self {
            WriteReport::Complete => None,
            WriteReport::Partial(p) => Some(p),
        }
    }
}

/// Trait defining one persistence layout for relationship edges.
/// CanonicalGraphAdapter (join tables) and LegacyArrayGraphAdapter (id
/// arrays on rows) implement this; the coordinator only sees the trait.
///
/// `StoreError::RelationMissing` means "this layout does not exist in the
/// deployment" and is what makes the coordinator try the other layout.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GraphAdapter: Send + Sync {
    /// Make the edge exist. Already present is success.
    async fn link(&self, key: &EdgeKey) -> StoreResult<WriteReport>;

    /// Make the edge absent. Already absent is success.
    async fn unlink(&self, key: &EdgeKey) -> StoreResult<WriteReport>;

    /// Objects `subject` points at (posts liked, users followed)
    async fn objects_of(&self, relation: Relation, subject: Uuid) -> StoreResult<Vec<Uuid>>;

    /// Subjects pointing at `object` (likers, followers)
    async fn subjects_of(&self, relation: Relation, object: Uuid) -> StoreResult<Vec<Uuid>>;
}

/// Read a uuid-valued column
pub(crate) fn uuid_column(row: &Row, column: &str) -> StoreResult<Uuid> {
    row.get(column)
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| StoreError::Malformed(format!("column {} is not a uuid", column)))
}
