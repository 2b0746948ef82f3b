//! Optimistic mutation primitive
//!
//! Every user-facing write (edge toggle, comment create/update/delete)
//! follows the same shape: change local state immediately, send the
//! remote write, then either settle the local state against what the store
//! returned or roll it back. Implementors supply the four steps; the
//! driver sequences them and records rollbacks.

use crate::error::{SocialError, SocialResult};
use crate::metrics::MutationMetrics;
use tracing::{debug, warn};

#[async_trait::async_trait]
pub trait OptimisticMutation: Send {
    /// What `apply` captured to undo itself
    type Snapshot: Send;
    type Output: Send;

    /// Label used in logs and metrics
    fn name(&self) -> &'static str;

    /// Apply the change locally and capture how to undo it
    fn apply(&mut self) -> Self::Snapshot;

    /// Issue the remote write
    async fn commit(&mut self) -> SocialResult<Self::Output>;

    /// Reconcile local state with the confirmed result
    fn settle(&mut self, _snapshot: Self::Snapshot, _output: &Self::Output) {}

    /// Undo the local change after `commit` failed
    fn rollback(&mut self, snapshot: Self::Snapshot, error: &SocialError);
}

/// Run `mutation` through apply → commit → settle | rollback.
pub async fn run_optimistic<M: OptimisticMutation>(mut mutation: M) -> SocialResult<M::Output> {
    let snapshot = mutation.apply();
    commit_applied(mutation, snapshot).await
}

/// Second half of [`run_optimistic`] for a mutation whose `apply` already
/// ran, so the local change can show before the write is scheduled.
pub async fn commit_applied<M: OptimisticMutation>(
    mut mutation: M,
    snapshot: M::Snapshot,
) -> SocialResult<M::Output> {
    debug!(mutation = mutation.name(), "Optimistic change applied");

    match mutation.commit().await {
        Ok(output) => {
            mutation.settle(snapshot, &output);
            Ok(output)
        }
        Err(error) => {
            warn!(
                mutation = mutation.name(),
                error = %error,
                "Remote write failed, rolling back optimistic change"
            );
            MutationMetrics::record_rollback(mutation.name(), error.kind());
            mutation.rollback(snapshot, &error);
            Err(error)
        }
    }
}
