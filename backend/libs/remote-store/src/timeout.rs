/// Timeout decorator for remote store calls
use crate::{Filter, RemoteStore, Row, StoreError, StoreResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Wraps any [`RemoteStore`] and fails calls that exceed `duration` with
/// [`StoreError::Timeout`]. The underlying request is not cancelled on the
/// server side; only the caller stops waiting.
#[derive(Clone)]
pub struct TimeoutStore {
    inner: Arc<dyn RemoteStore>,
    duration: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn RemoteStore>, duration: Duration) -> Self {
        Self { inner, duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    async fn guarded<F, T>(&self, op: &'static str, table: &str, future: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match timeout(self.duration, future).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation = op,
                    table = table,
                    timeout_ms = self.duration.as_millis() as u64,
                    "Remote store call timed out"
                );
                Err(StoreError::Timeout(self.duration))
            }
        }
    }
}

#[async_trait::async_trait]
impl RemoteStore for TimeoutStore {
    async fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        self.guarded("select", table, self.inner.select(table, filter))
            .await
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        self.guarded("insert", table, self.inner.insert(table, row))
            .await
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Row) -> StoreResult<Row> {
        self.guarded("update", table, self.inner.update(table, filter, patch))
            .await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> StoreResult<()> {
        self.guarded("delete", table, self.inner.delete(table, filter))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryStore, StoreOp};

    #[tokio::test]
    async fn test_timeout_success() {
        let memory = InMemoryStore::new();
        memory.create_table("posts");
        let store = TimeoutStore::new(Arc::new(memory), Duration::from_secs(1));

        let rows = store.select("posts", &Filter::all()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_elapsed() {
        let memory = InMemoryStore::new();
        memory.create_table("posts");
        // Never resumed: the call hangs until the deadline
        let _suspension = memory.suspend(StoreOp::Select, "posts");
        let store = TimeoutStore::new(Arc::new(memory), Duration::from_millis(10));

        let result = store.select("posts", &Filter::all()).await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_inner_errors_pass_through() {
        let store = TimeoutStore::new(Arc::new(InMemoryStore::new()), Duration::from_secs(1));

        let result = store.select("missing", &Filter::all()).await;
        assert!(matches!(result, Err(StoreError::RelationMissing(_))));
    }
}
