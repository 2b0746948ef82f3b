use super::r#trait::{uuid_column, GraphAdapter, WriteReport};
use crate::config::TableConfig;
use crate::domain::{EdgeKey, Relation};
use remote_store::{Filter, RemoteStore, Row, StoreError, StoreResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Join table holding one row per edge
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeTable {
    pub table: String,
    pub subject_column: &'static str,
    pub object_column: &'static str,
}

impl EdgeTable {
    pub fn for_relation(tables: &TableConfig, relation: Relation) -> Self {
        match relation {
            Relation::Like => Self {
                table: tables.likes.clone(),
                subject_column: "user_id",
                object_column: "post_id",
            },
            Relation::Follow => Self {
                table: tables.follows.clone(),
                subject_column: "follower_id",
                object_column: "followee_id",
            },
            Relation::CommentLike => Self {
                table: tables.comment_likes.clone(),
                subject_column: "user_id",
                object_column: "comment_id",
            },
        }
    }

    fn key_filter(&self, key: &EdgeKey) -> Filter {
        Filter::all()
            .eq(self.subject_column, key.subject)
            .eq(self.object_column, key.object)
    }
}

/// Normalized layout: insert / delete a single edge row
#[derive(Clone)]
pub struct CanonicalGraphAdapter {
    store: Arc<dyn RemoteStore>,
    tables: TableConfig,
}

impl CanonicalGraphAdapter {
    pub fn new(store: Arc<dyn RemoteStore>, tables: TableConfig) -> Self {
        Self { store, tables }
    }

    fn table(&self, relation: Relation) -> EdgeTable {
        EdgeTable::for_relation(&self.tables, relation)
    }
}

#[async_trait::async_trait]
impl GraphAdapter for CanonicalGraphAdapter {
    async fn link(&self, key: &EdgeKey) -> StoreResult<WriteReport> {
        let table = self.table(key.relation);
        let mut row = Row::new();
        row.insert(
            table.subject_column.to_string(),
            Value::String(key.subject.to_string()),
        );
        row.insert(
            table.object_column.to_string(),
            Value::String(key.object.to_string()),
        );

        match self.store.insert(&table.table, row).await {
            Ok(_) => Ok(WriteReport::Complete),
            Err(StoreError::ConstraintViolation(msg)) => {
                // Only a duplicate edge is benign; a dangling reference is not
                let existing = self.store.select(&table.table, &table.key_filter(key)).await?;
                if existing.is_empty() {
                    warn!(
                        relation = key.relation.as_str(),
                        subject = %key.subject,
                        object = %key.object,
                        "Edge rejected by constraint: {}",
                        msg
                    );
                    return Err(StoreError::ConstraintViolation(msg));
                }
                debug!(
                    relation = key.relation.as_str(),
                    subject = %key.subject,
                    object = %key.object,
                    "Edge already present: {}",
                    msg
                );
                Ok(WriteReport::Complete)
            }
            Err(e) => Err(e),
        }
    }

    async fn unlink(&self, key: &EdgeKey) -> StoreResult<WriteReport> {
        let table = self.table(key.relation);
        match self.store.delete(&table.table, &table.key_filter(key)).await {
            Ok(()) | Err(StoreError::NotFound(_)) => Ok(WriteReport::Complete),
            Err(e) => Err(e),
        }
    }

    async fn objects_of(&self, relation: Relation, subject: Uuid) -> StoreResult<Vec<Uuid>> {
        let table = self.table(relation);
        let rows = self
            .store
            .select(&table.table, &Filter::all().eq(table.subject_column, subject))
            .await?;
        rows.iter()
            .map(|row| uuid_column(row, table.object_column))
            .collect()
    }

    async fn subjects_of(&self, relation: Relation, object: Uuid) -> StoreResult<Vec<Uuid>> {
        let table = self.table(relation);
        let rows = self
            .store
            .select(&table.table, &Filter::all().eq(table.object_column, object))
            .await?;
        rows.iter()
            .map(|row| uuid_column(row, table.subject_column))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_store::{InMemoryStore, StoreOp};

    fn adapter() -> (Arc<InMemoryStore>, CanonicalGraphAdapter) {
        let store = Arc::new(InMemoryStore::new());
        store.add_unique_key("follows", &["follower_id", "followee_id"]);
        let adapter = CanonicalGraphAdapter::new(store.clone(), TableConfig::default());
        (store, adapter)
    }

    #[tokio::test]
    async fn test_link_is_idempotent() {
        let (store, adapter) = adapter();
        let key = EdgeKey::follow(Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(adapter.link(&key).await.unwrap(), WriteReport::Complete);
        assert_eq!(adapter.link(&key).await.unwrap(), WriteReport::Complete);
        assert_eq!(store.rows("follows").len(), 1);
    }

    #[tokio::test]
    async fn test_dangling_reference_is_not_a_duplicate() {
        let (store, adapter) = adapter();
        store.create_table("likes");
        store.fail_next(
            StoreOp::Insert,
            "likes",
            StoreError::ConstraintViolation("violates foreign key (post_id)".into()),
        );

        let err = adapter
            .link(&EdgeKey::like(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert!(store.rows("likes").is_empty());
    }

    #[tokio::test]
    async fn test_unlink_and_listing() {
        let (store, adapter) = adapter();
        let me = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        adapter.link(&EdgeKey::follow(me, a)).await.unwrap();
        adapter.link(&EdgeKey::follow(me, b)).await.unwrap();

        let mut following = adapter.objects_of(Relation::Follow, me).await.unwrap();
        following.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(following, expected);
        assert_eq!(adapter.subjects_of(Relation::Follow, a).await.unwrap(), vec![me]);

        adapter.unlink(&EdgeKey::follow(me, a)).await.unwrap();
        adapter.unlink(&EdgeKey::follow(me, a)).await.unwrap();
        assert_eq!(store.rows("follows").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_table_is_reported() {
        let (_store, adapter) = adapter();
        let err = adapter
            .link(&EdgeKey::like(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RelationMissing(_)));
    }
}
