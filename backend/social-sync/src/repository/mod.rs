mod canonical_repository;
mod comments;
mod legacy_array_repository;
mod posts;
mod r#trait;

pub use canonical_repository::{CanonicalGraphAdapter, EdgeTable};
pub use comments::CommentRepository;
pub use legacy_array_repository::{ArrayColumn, LegacyArrayGraphAdapter, MirroredArrays};
pub use posts::PostRepository;
pub use r#trait::{GraphAdapter, PartialFailure, WriteReport};

#[cfg(test)]
pub use r#trait::MockGraphAdapter;

use remote_store::Row;
use serde_json::Value;

/// Legacy rows carry an id array but no cached counter; derive the counter
/// from the array length when it is missing or null.
pub(crate) fn derive_count(row: &mut Row, count_column: &str, array_column: &str) {
    let missing = matches!(row.get(count_column), None | Some(Value::Null));
    if !missing {
        return;
    }
    if let Some(Value::Array(values)) = row.get(array_column) {
        let count = values.len() as i64;
        row.insert(count_column.to_string(), Value::from(count));
    }
}
