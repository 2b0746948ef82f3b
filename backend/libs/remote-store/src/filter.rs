//! Row shape and filter predicates understood by every store implementation.

use crate::error::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A row as returned by the remote store: a JSON object keyed by column.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
}

impl Condition {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Condition::Eq { column, value } => row.get(column) == Some(value),
            Condition::In { column, values } => row
                .get(column)
                .map(|v| values.contains(v))
                .unwrap_or(false),
        }
    }
}

/// Conjunction of column conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Serialize) -> Self {
        self.conditions.push(Condition::Eq {
            column: column.into(),
            value: serde_json::to_value(value).unwrap_or(Value::Null),
        });
        self
    }

    pub fn is_in<T: Serialize>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.conditions.push(Condition::In {
            column: column.into(),
            values: values
                .into_iter()
                .map(|v| serde_json::to_value(v).unwrap_or(Value::Null))
                .collect(),
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

/// Decode a row into a typed record.
pub fn from_row<T: DeserializeOwned>(row: Row) -> StoreResult<T> {
    serde_json::from_value(Value::Object(row)).map_err(StoreError::from)
}

/// Encode a typed record as a row. Non-object values are rejected.
pub fn to_row<T: Serialize>(value: &T) -> StoreResult<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Malformed(format!(
            "expected an object row, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::all().matches(&row(json!({"id": 1}))));
    }

    #[test]
    fn test_conjunction() {
        let filter = Filter::all().eq("user_id", "a").eq("post_id", "p");
        assert!(filter.matches(&row(json!({"user_id": "a", "post_id": "p"}))));
        assert!(!filter.matches(&row(json!({"user_id": "a", "post_id": "q"}))));
        assert!(!filter.matches(&row(json!({"user_id": "a"}))));
    }

    #[test]
    fn test_in_condition() {
        let filter = Filter::all().is_in("id", ["a", "b"]);
        assert!(filter.matches(&row(json!({"id": "b"}))));
        assert!(!filter.matches(&row(json!({"id": "c"}))));
    }

    #[test]
    fn test_to_row_rejects_scalars() {
        assert!(matches!(to_row(&5), Err(StoreError::Malformed(_))));
    }
}
