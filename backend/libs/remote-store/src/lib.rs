/// Remote data store contract for the social client
///
/// The hosted backend is reached through a generic table store: every
/// operation names a table and a filter predicate and returns either rows
/// or a [`StoreError`] carrying a machine-readable code. Callers rely on
/// those codes to tell "the relation does not exist here" apart from
/// transport failures and constraint violations.
///
/// This crate provides:
/// - **RemoteStore**: the async trait the rest of the workspace depends on
/// - **TimeoutStore**: decorator enforcing a deadline on every call
/// - **InMemoryStore**: table store with fault injection, used for offline
///   sessions and tests
///
/// # Example
///
/// ```rust,no_run
/// use remote_store::{Filter, InMemoryStore, RemoteStore};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::new();
///     store.create_table("follows");
///     store.add_unique_key("follows", &["follower_id", "followee_id"]);
///
///     let row = json!({"follower_id": "a", "followee_id": "b"});
///     store.insert("follows", row.as_object().cloned().unwrap()).await.unwrap();
///
///     let rows = store
///         .select("follows", &Filter::all().eq("follower_id", "a"))
///         .await
///         .unwrap();
///     assert_eq!(rows.len(), 1);
/// }
/// ```

pub mod error;
pub mod filter;
pub mod memory;
pub mod timeout;

pub use error::{StoreError, StoreErrorCode, StoreResult};
pub use filter::{from_row, to_row, Condition, Filter, Row};
pub use memory::{InMemoryStore, StoreOp, Suspension};
pub use timeout::TimeoutStore;

/// Table-oriented access to the hosted backend.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Return every row of `table` matching `filter`
    async fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>>;

    /// Insert a row and return it as stored (server-assigned columns filled in)
    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row>;

    /// Merge `patch` into the rows matching `filter`; returns the first updated row.
    /// Fails with `NotFound` when nothing matched.
    async fn update(&self, table: &str, filter: &Filter, patch: Row) -> StoreResult<Row>;

    /// Delete the rows matching `filter`. Deleting nothing is not an error.
    async fn delete(&self, table: &str, filter: &Filter) -> StoreResult<()>;
}
