use super::derive_count;
use crate::config::TableConfig;
use crate::domain::{CurrentUser, Post, PostDraft};
use remote_store::{from_row, to_row, Filter, RemoteStore, Row, StoreResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Repository for the post collection
#[derive(Clone)]
pub struct PostRepository {
    store: Arc<dyn RemoteStore>,
    tables: TableConfig,
}

fn decode(mut row: Row) -> StoreResult<Post> {
    derive_count(&mut row, "like_count", "likes");
    from_row(row)
}

impl PostRepository {
    pub fn new(store: Arc<dyn RemoteStore>, tables: TableConfig) -> Self {
        Self { store, tables }
    }

    /// The whole known collection. Undecodable rows are skipped, not fatal.
    pub async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let rows = self.store.select(&self.tables.posts, &Filter::all()).await?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            match decode(row) {
                Ok(post) => posts.push(post),
                Err(e) => warn!(error = %e, "Skipping undecodable post row"),
            }
        }
        Ok(posts)
    }

    /// Insert a validated draft authored by `author`
    pub async fn create_post(&self, draft: &PostDraft, author: &CurrentUser) -> StoreResult<Post> {
        let mut row = to_row(draft)?;
        row.insert("author_id".into(), Value::String(author.id.to_string()));
        row.insert(
            "author_display_name".into(),
            Value::String(author.display_name.clone()),
        );
        row.insert("like_count".into(), Value::from(0));
        row.insert("comment_count".into(), Value::from(0));

        let stored = self.store.insert(&self.tables.posts, row).await?;
        decode(stored)
    }
}
