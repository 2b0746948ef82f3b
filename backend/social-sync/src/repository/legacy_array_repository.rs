use super::r#trait::{GraphAdapter, PartialFailure, WriteReport};
use crate::config::TableConfig;
use crate::domain::{EdgeKey, Relation};
use remote_store::{Filter, RemoteStore, Row, StoreError, StoreResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

/// An id array stored on a row keyed by `id`
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayColumn {
    pub table: String,
    pub column: &'static str,
}

impl ArrayColumn {
    fn describe(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// Subject-side and object-side arrays mirroring one relation
#[derive(Debug, Clone, PartialEq)]
pub struct MirroredArrays {
    pub subject: ArrayColumn,
    pub object: ArrayColumn,
}

impl MirroredArrays {
    pub fn for_relation(tables: &TableConfig, relation: Relation) -> Self {
        let users = |column| ArrayColumn {
            table: tables.users.clone(),
            column,
        };
        match relation {
            Relation::Like => Self {
                subject: users("liked_posts"),
                object: ArrayColumn {
                    table: tables.posts.clone(),
                    column: "likes",
                },
            },
            Relation::Follow => Self {
                subject: users("following"),
                object: users("followers"),
            },
            Relation::CommentLike => Self {
                subject: users("liked_comments"),
                object: ArrayColumn {
                    table: tables.comments.clone(),
                    column: "likes",
                },
            },
        }
    }
}

fn same_id(value: &Value, id: &Uuid) -> bool {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .map_or(false, |v| v == *id)
}

/// Add or remove `id`; None when the array is already in the wanted state
fn edit(mut values: Vec<Value>, id: Uuid, present: bool) -> Option<Vec<Value>> {
    let has = values.iter().any(|v| same_id(v, &id));
    match (present, has) {
        (true, false) => {
            values.push(Value::String(id.to_string()));
            Some(values)
        }
        (false, true) => {
            values.retain(|v| !same_id(v, &id));
            Some(values)
        }
        _ => None,
    }
}

/// Legacy denormalized layout: `following[]` / `followers[]` style arrays on
/// both participants' rows, written one row at a time.
#[derive(Clone)]
pub struct LegacyArrayGraphAdapter {
    store: Arc<dyn RemoteStore>,
    tables: TableConfig,
}

impl LegacyArrayGraphAdapter {
    pub fn new(store: Arc<dyn RemoteStore>, tables: TableConfig) -> Self {
        Self { store, tables }
    }

    fn arrays(&self, relation: Relation) -> MirroredArrays {
        MirroredArrays::for_relation(&self.tables, relation)
    }

    /// Raw array values; a missing or null column reads as empty
    async fn read_values(&self, side: &ArrayColumn, id: Uuid) -> StoreResult<Vec<Value>> {
        let rows = self
            .store
            .select(&side.table, &Filter::all().eq("id", id))
            .await?;
        let row = rows.into_iter().next().ok_or_else(|| {
            StoreError::NotFound(format!("{} row {} not found", side.table, id))
        })?;

        match row.get(side.column) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(values)) => Ok(values.clone()),
            Some(other) => Err(StoreError::Malformed(format!(
                "{} holds {} instead of an array",
                side.describe(),
                other
            ))),
        }
    }

    async fn read_ids(&self, side: &ArrayColumn, id: Uuid) -> StoreResult<Vec<Uuid>> {
        let values = self.read_values(side, id).await?;
        let ids = values
            .iter()
            .filter_map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
            .collect::<Vec<_>>();
        if ids.len() != values.len() {
            warn!(
                column = %side.describe(),
                row = %id,
                skipped = values.len() - ids.len(),
                "Ignoring non-uuid entries in legacy array"
            );
        }
        Ok(ids)
    }

    async fn write_values(&self, side: &ArrayColumn, id: Uuid, values: Vec<Value>) -> StoreResult<()> {
        let mut patch = Row::new();
        patch.insert(side.column.to_string(), Value::Array(values));
        self.store
            .update(&side.table, &Filter::all().eq("id", id), patch)
            .await
            .map(|_| ())
    }

    /// Read both arrays, then write the subject's row and the object's row.
    /// The two writes are independent: if the second fails the edge is
    /// recorded on one side only and a partial report is returned.
    async fn write(&self, key: &EdgeKey, present: bool) -> StoreResult<WriteReport> {
        let arrays = self.arrays(key.relation);

        let subject_values = self.read_values(&arrays.subject, key.subject).await?;
        let object_values = self.read_values(&arrays.object, key.object).await?;

        if let Some(values) = edit(subject_values, key.object, present) {
            self.write_values(&arrays.subject, key.subject, values).await?;
        }

        if let Some(values) = edit(object_values, key.subject, present) {
            if let Err(e) = self.write_values(&arrays.object, key.object, values).await {
                error!(
                    relation = key.relation.as_str(),
                    subject = %key.subject,
                    object = %key.object,
                    written = %arrays.subject.describe(),
                    failed = %arrays.object.describe(),
                    error = %e,
                    "Legacy mirror write failed after the first side was written (data drift)"
                );
                return Ok(WriteReport::Partial(PartialFailure {
                    written: arrays.subject.describe(),
                    failed: arrays.object.describe(),
                    reason: e.to_string(),
                }));
            }
        }

        Ok(WriteReport::Complete)
    }
}

#[async_trait::async_trait]
impl GraphAdapter for LegacyArrayGraphAdapter {
    async fn link(&self, key: &EdgeKey) -> StoreResult<WriteReport> {
        self.write(key, true).await
    }

    async fn unlink(&self, key: &EdgeKey) -> StoreResult<WriteReport> {
        self.write(key, false).await
    }

    async fn objects_of(&self, relation: Relation, subject: Uuid) -> StoreResult<Vec<Uuid>> {
        let arrays = self.arrays(relation);
        self.read_ids(&arrays.subject, subject).await
    }

    async fn subjects_of(&self, relation: Relation, object: Uuid) -> StoreResult<Vec<Uuid>> {
        let arrays = self.arrays(relation);
        self.read_ids(&arrays.object, object).await
    }
}
