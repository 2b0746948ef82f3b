use super::derive_count;
use super::r#trait::uuid_column;
use crate::config::TableConfig;
use crate::domain::Comment;
use remote_store::{from_row, Filter, RemoteStore, Row, StoreError, StoreResult};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Repository for Comment operations
#[derive(Clone)]
pub struct CommentRepository {
    store: Arc<dyn RemoteStore>,
    tables: TableConfig,
}

fn decode(mut row: Row) -> StoreResult<Comment> {
    derive_count(&mut row, "like_count", "likes");
    from_row(row)
}

impl CommentRepository {
    pub fn new(store: Arc<dyn RemoteStore>, tables: TableConfig) -> Self {
        Self { store, tables }
    }

    /// All comments of a post. Rows that cannot be decoded are skipped.
    pub async fn list_for_post(&self, post_id: Uuid) -> StoreResult<Vec<Comment>> {
        let rows = self
            .store
            .select(&self.tables.comments, &Filter::all().eq("post_id", post_id))
            .await?;

        let mut comments = Vec::with_capacity(rows.len());
        for row in rows {
            match decode(row) {
                Ok(comment) => comments.push(comment),
                Err(e) => warn!(post_id = %post_id, error = %e, "Skipping undecodable comment row"),
            }
        }
        Ok(comments)
    }

    /// Create a new comment
    pub async fn create_comment(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        content: &str,
        parent_id: Option<Uuid>,
    ) -> StoreResult<Comment> {
        let mut row = Row::new();
        row.insert("post_id".into(), json!(post_id));
        row.insert("author_id".into(), json!(author_id));
        row.insert("content".into(), json!(content));
        row.insert("parent_id".into(), json!(parent_id));
        row.insert("like_count".into(), json!(0));
        row.insert("edited".into(), json!(false));

        let stored = self.store.insert(&self.tables.comments, row).await?;
        decode(stored)
    }

    /// Update a comment's content; only matches when `author_id` wrote it
    pub async fn update_comment(
        &self,
        comment_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> StoreResult<Comment> {
        let mut patch = Row::new();
        patch.insert("content".into(), Value::String(content.to_string()));
        patch.insert("edited".into(), Value::Bool(true));

        let stored = self
            .store
            .update(
                &self.tables.comments,
                &Filter::all().eq("id", comment_id).eq("author_id", author_id),
                patch,
            )
            .await?;
        decode(stored)
    }

    /// Ids of `root` and every stored comment below it, root first.
    ///
    /// Works on raw rows so that replies which fail to decode still count.
    pub async fn subtree_ids(&self, post_id: Uuid, root: Uuid) -> StoreResult<Vec<Uuid>> {
        let rows = self
            .store
            .select(&self.tables.comments, &Filter::all().eq("post_id", post_id))
            .await?;

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for row in &rows {
            let id = match uuid_column(row, "id") {
                Ok(id) => id,
                Err(e) => {
                    warn!(post_id = %post_id, error = %e, "Comment row without id");
                    continue;
                }
            };
            if let Some(parent) = row
                .get("parent_id")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                children.entry(parent).or_default().push(id);
            }
        }

        let mut ids = vec![root];
        let mut seen: HashSet<Uuid> = ids.iter().copied().collect();
        let mut next = 0;
        while next < ids.len() {
            let parent = ids[next];
            next += 1;
            for &child in children.get(&parent).into_iter().flatten() {
                if seen.insert(child) {
                    ids.push(child);
                }
            }
        }
        Ok(ids)
    }

    /// Delete comments and their like edges.
    ///
    /// Like edges go first so that a failure in between leaves comments
    /// without likes rather than likes pointing at nothing.
    pub async fn delete_comments(&self, ids: &[Uuid]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        match self
            .store
            .delete(
                &self.tables.comment_likes,
                &Filter::all().is_in("comment_id", ids.iter().copied()),
            )
            .await
        {
            Ok(()) => {}
            Err(StoreError::RelationMissing(msg)) => {
                debug!("No comment like table, legacy arrays go with the rows: {}", msg);
            }
            Err(e) => return Err(e),
        }

        self.store
            .delete(
                &self.tables.comments,
                &Filter::all().is_in("id", ids.iter().copied()),
            )
            .await
    }
}
