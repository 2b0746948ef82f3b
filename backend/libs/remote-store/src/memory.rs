//! In-memory table store
//!
//! Behaves like the hosted backend as far as the error codes go: unknown
//! tables report `RelationMissing`, unique keys report
//! `ConstraintViolation`, single-row updates that match nothing report
//! `NotFound`. Faults and suspensions can be injected per (operation, table)
//! so callers can exercise partial failures and in-flight states.

use crate::{Filter, RemoteStore, Row, StoreError, StoreResult};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    unique_keys: Vec<Vec<String>>,
}

struct Fault {
    op: StoreOp,
    table: String,
    /// Matching calls still allowed through before this fault fires
    skip: usize,
    error: StoreError,
}

struct Pause {
    op: StoreOp,
    table: String,
    reached: Arc<Notify>,
    resume: Arc<Notify>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    faults: Vec<Fault>,
    pauses: Vec<Pause>,
    calls: HashMap<(StoreOp, String), usize>,
}

/// Handle on a suspended call. The call parks right before touching the
/// table until [`Suspension::resume`] is invoked.
pub struct Suspension {
    reached: Arc<Notify>,
    resume: Arc<Notify>,
}

impl Suspension {
    /// Wait until the suspended call has been issued
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn resume(&self) {
        self.resume.notify_one();
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, table: &str) {
        self.state
            .lock()
            .tables
            .entry(table.to_string())
            .or_default();
    }

    pub fn drop_table(&self, table: &str) {
        self.state.lock().tables.remove(table);
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().tables.contains_key(table)
    }

    /// Declare a unique key over `columns`; the table is created if needed
    pub fn add_unique_key(&self, table: &str, columns: &[&str]) {
        let mut state = self.state.lock();
        let entry = state.tables.entry(table.to_string()).or_default();
        entry
            .unique_keys
            .push(columns.iter().map(|c| c.to_string()).collect());
    }

    /// Load rows verbatim, bypassing constraints and faults
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut state = self.state.lock();
        let entry = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            if let Value::Object(map) = row {
                entry.rows.push(map);
            }
        }
    }

    /// Snapshot of a table's rows; empty when the table does not exist
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Fail the next matching call with `error`
    pub fn fail_next(&self, op: StoreOp, table: &str, error: StoreError) {
        self.fail_nth(op, table, 1, error);
    }

    /// Let `nth - 1` matching calls succeed, then fail one with `error`
    pub fn fail_nth(&self, op: StoreOp, table: &str, nth: usize, error: StoreError) {
        self.state.lock().faults.push(Fault {
            op,
            table: table.to_string(),
            skip: nth.saturating_sub(1),
            error,
        });
    }

    /// Park the next matching call until the returned handle resumes it
    pub fn suspend(&self, op: StoreOp, table: &str) -> Suspension {
        let reached = Arc::new(Notify::new());
        let resume = Arc::new(Notify::new());
        self.state.lock().pauses.push(Pause {
            op,
            table: table.to_string(),
            reached: reached.clone(),
            resume: resume.clone(),
        });
        Suspension { reached, resume }
    }

    /// Number of calls issued for (op, table), including failed ones
    pub fn call_count(&self, op: StoreOp, table: &str) -> usize {
        self.state
            .lock()
            .calls
            .get(&(op, table.to_string()))
            .copied()
            .unwrap_or(0)
    }

    async fn enter(&self, op: StoreOp, table: &str) -> StoreResult<()> {
        let (pause, fault) = {
            let mut state = self.state.lock();
            *state.calls.entry((op, table.to_string())).or_default() += 1;

            let pause = state
                .pauses
                .iter()
                .position(|p| p.op == op && p.table == table)
                .map(|idx| state.pauses.remove(idx));

            let mut fired = None;
            if let Some(idx) = state
                .faults
                .iter()
                .position(|f| f.op == op && f.table == table)
            {
                if state.faults[idx].skip > 0 {
                    state.faults[idx].skip -= 1;
                } else {
                    fired = Some(state.faults.remove(idx).error);
                }
            }
            (pause, fired)
        };

        if let Some(pause) = pause {
            pause.reached.notify_one();
            pause.resume.notified().await;
        }

        match fault {
            Some(error) => {
                debug!(?op, table = table, error = %error, "Injected store fault");
                Err(error)
            }
            None => Ok(()),
        }
    }
}

fn missing(table: &str) -> StoreError {
    StoreError::RelationMissing(format!("relation \"{}\" does not exist", table))
}

fn violates(table: &Table, row: &Row) -> Option<String> {
    let id_clash = row.get("id").map_or(false, |id| {
        table.rows.iter().any(|existing| existing.get("id") == Some(id))
    });
    if id_clash {
        return Some("id".to_string());
    }

    table
        .unique_keys
        .iter()
        .find(|key| {
            table.rows.iter().any(|existing| {
                key.iter()
                    .all(|col| row.get(col).is_some() && existing.get(col) == row.get(col))
            })
        })
        .map(|key| key.join(", "))
}

#[async_trait::async_trait]
impl RemoteStore for InMemoryStore {
    async fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        self.enter(StoreOp::Select, table).await?;
        let state = self.state.lock();
        let entry = state.tables.get(table).ok_or_else(|| missing(table))?;
        Ok(entry
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn insert(&self, table: &str, mut row: Row) -> StoreResult<Row> {
        self.enter(StoreOp::Insert, table).await?;
        let mut state = self.state.lock();
        let entry = state.tables.get_mut(table).ok_or_else(|| missing(table))?;

        row.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        row.entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        if let Some(key) = violates(entry, &row) {
            return Err(StoreError::ConstraintViolation(format!(
                "duplicate key ({}) in \"{}\"",
                key, table
            )));
        }

        entry.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Row) -> StoreResult<Row> {
        self.enter(StoreOp::Update, table).await?;
        let mut state = self.state.lock();
        let entry = state.tables.get_mut(table).ok_or_else(|| missing(table))?;

        let mut first = None;
        for row in entry.rows.iter_mut().filter(|row| filter.matches(row)) {
            for (column, value) in &patch {
                row.insert(column.clone(), value.clone());
            }
            if first.is_none() {
                first = Some(row.clone());
            }
        }

        first.ok_or_else(|| StoreError::NotFound(format!("no matching row in \"{}\"", table)))
    }

    async fn delete(&self, table: &str, filter: &Filter) -> StoreResult<()> {
        self.enter(StoreOp::Delete, table).await?;
        let mut state = self.state.lock();
        let entry = state.tables.get_mut(table).ok_or_else(|| missing(table))?;
        entry.rows.retain(|row| !filter.matches(row));
        Ok(())
    }
}
