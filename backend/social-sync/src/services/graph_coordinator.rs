/// Dual-path graph coordinator
///
/// Like / Follow / CommentLike toggles are applied to the session cache
/// first, then written through one of two persistence layouts: the
/// canonical join tables or the legacy id arrays. The canonical path is
/// tried first until a write finds its table missing; from then on the
/// relation sticks to whichever path last succeeded, with the other one
/// kept as fallback.
///
/// Toggles for the same edge coalesce: while one is in flight, further
/// toggles only flip the desired state and wait. The write loop runs on its
/// own task, so callers that stop waiting never cancel an issued write. It
/// issues at most one corrective write per flip and every waiter receives
/// the same outcome.
use crate::domain::{EdgeKey, Relation, WritePath};
use crate::error::{SocialError, SocialResult};
use crate::identity::IdentityProvider;
use crate::metrics::GraphMetrics;
use crate::repository::{GraphAdapter, PartialFailure, WriteReport};
use crate::services::optimistic::{commit_applied, OptimisticMutation};
use crate::session::SessionStore;
use parking_lot::Mutex;
use remote_store::StoreError;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Settled = Option<SocialResult<ToggleOutcome>>;

/// Result of a toggle as seen by every coalesced caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToggleOutcome {
    pub relation: Relation,
    /// Edge state differs from what it was before the first toggle
    pub applied: bool,
    /// Edge state confirmed by the store
    pub final_state: bool,
    /// Path of the last remote write; None when toggles cancelled out before any write
    pub path: Option<WritePath>,
    /// Set when the legacy path wrote only one of the two rows
    pub partial: Option<PartialFailure>,
}

impl ToggleOutcome {
    /// Success with data drift between the mirrored legacy arrays
    pub fn is_degraded(&self) -> bool {
        self.partial.is_some()
    }
}

struct InFlight {
    desired: bool,
    settled: watch::Sender<Settled>,
}

enum Lookup {
    Objects(Uuid),
    Subjects(Uuid),
}

/// State shared between the coordinator and its detached write tasks
struct GraphCore {
    session: Arc<SessionStore>,
    canonical: Arc<dyn GraphAdapter>,
    legacy: Arc<dyn GraphAdapter>,
    preferred: Mutex<HashMap<Relation, WritePath>>,
    inflight: Mutex<HashMap<EdgeKey, InFlight>>,
}

pub struct DualPathGraphCoordinator {
    core: Arc<GraphCore>,
    identity: Arc<dyn IdentityProvider>,
}

impl DualPathGraphCoordinator {
    pub fn new(
        session: Arc<SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        canonical: Arc<dyn GraphAdapter>,
        legacy: Arc<dyn GraphAdapter>,
    ) -> Self {
        Self {
            core: Arc::new(GraphCore {
                session,
                canonical,
                legacy,
                preferred: Mutex::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
            }),
            identity,
        }
    }

    /// Path tried first for `relation`
    pub fn preferred_path(&self, relation: Relation) -> WritePath {
        self.core.preferred_path(relation)
    }

    /// Whether a toggle for the edge is waiting on the store
    pub fn is_pending(&self, relation: Relation, subject: Uuid, object: Uuid) -> bool {
        self.core
            .inflight
            .lock()
            .contains_key(&EdgeKey::new(relation, subject, object))
    }

    /// Cached edge state
    pub fn is_linked(&self, relation: Relation, subject: Uuid, object: Uuid) -> bool {
        self.core
            .session
            .has_edge(&EdgeKey::new(relation, subject, object))
    }

    /// Toggle with the signed-in user as subject
    pub async fn toggle_current(&self, relation: Relation, object: Uuid) -> SocialResult<ToggleOutcome> {
        let user = self.identity.require_user()?;
        self.toggle(relation, user.id, object).await
    }

    /// Flip the edge locally, then write it through the store.
    ///
    /// Dropping the returned future only stops waiting: the write keeps
    /// going and still settles the session cache.
    pub async fn toggle(
        &self,
        relation: Relation,
        subject: Uuid,
        object: Uuid,
    ) -> SocialResult<ToggleOutcome> {
        let user = self.identity.require_user()?;
        if user.id != subject {
            return Err(SocialError::Forbidden(
                "edges can only be toggled for the signed-in user".into(),
            ));
        }
        if !relation.allows_self() && subject == object {
            return Err(SocialError::SelfRelationRejected);
        }

        let key = EdgeKey::new(relation, subject, object);
        let session = &self.core.session;

        let (mut settled, leader) = {
            let mut inflight = self.core.inflight.lock();
            match inflight.get_mut(&key) {
                Some(entry) => {
                    entry.desired = !entry.desired;
                    session.set_edge(&key, entry.desired);
                    debug!(
                        relation = relation.as_str(),
                        subject = %subject,
                        object = %object,
                        desired = entry.desired,
                        "Toggle coalesced into in-flight write"
                    );
                    (entry.settled.subscribe(), None)
                }
                None => {
                    let original = session.has_edge(&key);
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(
                        key,
                        InFlight {
                            desired: !original,
                            settled: tx,
                        },
                    );
                    (rx, Some(original))
                }
            }
        };

        if let Some(original) = leader {
            let mut mutation = ToggleMutation {
                core: self.core.clone(),
                key,
                original,
                confirmed: original,
                settled: None,
                finished: false,
            };
            mutation.apply();
            tokio::spawn(commit_applied(mutation, ()));
        }

        let result = match settled.wait_for(Option::is_some).await {
            Ok(outcome) => outcome
                .clone()
                .unwrap_or_else(|| Err(SocialError::Internal("toggle settled without outcome".into()))),
            Err(_) => Err(SocialError::Internal("in-flight toggle was abandoned".into())),
        };
        result
    }

    /// Load the objects `subject` points at (posts liked, users followed)
    /// into the session. Edges with a toggle in flight keep their local state.
    pub async fn refresh_objects(&self, relation: Relation, subject: Uuid) -> SocialResult<Vec<Uuid>> {
        let ids = self.core.read(relation, &Lookup::Objects(subject)).await?;
        let pending = self.core.pending_keys();
        self.core
            .session
            .seed_objects(relation, subject, &ids, |k| pending.contains(k));
        debug!(relation = relation.as_str(), subject = %subject, count = ids.len(), "Edges refreshed");
        Ok(ids)
    }

    /// Load the subjects pointing at `object` (likers, followers) into the session
    pub async fn refresh_subjects(&self, relation: Relation, object: Uuid) -> SocialResult<Vec<Uuid>> {
        let ids = self.core.read(relation, &Lookup::Subjects(object)).await?;
        let pending = self.core.pending_keys();
        self.core
            .session
            .seed_subjects(relation, object, &ids, |k| pending.contains(k));
        debug!(relation = relation.as_str(), object = %object, count = ids.len(), "Edges refreshed");
        Ok(ids)
    }
}

impl GraphCore {
    fn preferred_path(&self, relation: Relation) -> WritePath {
        self.preferred
            .lock()
            .get(&relation)
            .copied()
            .unwrap_or(WritePath::Canonical)
    }

    fn remember(&self, relation: Relation, path: WritePath) {
        let previous = self.preferred.lock().insert(relation, path);
        if previous.unwrap_or(WritePath::Canonical) != path {
            info!(
                relation = relation.as_str(),
                path = path.as_str(),
                "Switching preferred graph path"
            );
        }
    }

    fn adapter(&self, path: WritePath) -> &Arc<dyn GraphAdapter> {
        match path {
            WritePath::Canonical => &self.canonical,
            WritePath::Legacy => &self.legacy,
        }
    }

    fn path_order(&self, relation: Relation) -> [WritePath; 2] {
        let first = self.preferred_path(relation);
        [first, first.other()]
    }

    fn pending_keys(&self) -> HashSet<EdgeKey> {
        self.inflight.lock().keys().copied().collect()
    }

    /// Write one edge state, falling back to the other path when the
    /// preferred one has no table for it.
    async fn write(&self, key: &EdgeKey, present: bool) -> SocialResult<(WritePath, WriteReport)> {
        let relation = key.relation.as_str();
        let mut missing = Vec::with_capacity(2);

        for (attempt, path) in self.path_order(key.relation).into_iter().enumerate() {
            let adapter = self.adapter(path);
            let result = if present {
                adapter.link(key).await
            } else {
                adapter.unlink(key).await
            };

            match result {
                Ok(report) => {
                    let label = if report.partial().is_some() { "partial" } else { "ok" };
                    GraphMetrics::record_write(relation, path.as_str(), label);
                    self.remember(key.relation, path);
                    return Ok((path, report));
                }
                Err(StoreError::RelationMissing(msg)) => {
                    GraphMetrics::record_write(relation, path.as_str(), "missing");
                    if attempt == 0 {
                        warn!(
                            relation = relation,
                            from = path.as_str(),
                            to = path.other().as_str(),
                            reason = %msg,
                            "Graph path unavailable, falling back"
                        );
                        GraphMetrics::record_fallback(relation, path.as_str(), path.other().as_str());
                    }
                    missing.push(format!("{}: {}", path.as_str(), msg));
                }
                Err(e) => {
                    GraphMetrics::record_write(relation, path.as_str(), "error");
                    return Err(e.into());
                }
            }
        }

        Err(SocialError::SchemaMismatch(format!(
            "no graph path can store {} edges ({})",
            relation,
            missing.join("; ")
        )))
    }

    async fn read(&self, relation: Relation, lookup: &Lookup) -> SocialResult<Vec<Uuid>> {
        let mut missing = Vec::with_capacity(2);

        for (attempt, path) in self.path_order(relation).into_iter().enumerate() {
            let adapter = self.adapter(path);
            let result = match lookup {
                Lookup::Objects(subject) => adapter.objects_of(relation, *subject).await,
                Lookup::Subjects(object) => adapter.subjects_of(relation, *object).await,
            };

            match result {
                Ok(ids) => {
                    self.remember(relation, path);
                    return Ok(ids);
                }
                Err(StoreError::RelationMissing(msg)) => {
                    if attempt == 0 {
                        warn!(
                            relation = relation.as_str(),
                            from = path.as_str(),
                            to = path.other().as_str(),
                            reason = %msg,
                            "Graph path unavailable for read, falling back"
                        );
                        GraphMetrics::record_fallback(
                            relation.as_str(),
                            path.as_str(),
                            path.other().as_str(),
                        );
                    }
                    missing.push(format!("{}: {}", path.as_str(), msg));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SocialError::SchemaMismatch(format!(
            "no graph path can read {} edges ({})",
            relation.as_str(),
            missing.join("; ")
        )))
    }
}

/// Write loop of a coalesced toggle, run on its own task
struct ToggleMutation {
    core: Arc<GraphCore>,
    key: EdgeKey,
    original: bool,
    /// Last state the store acknowledged
    confirmed: bool,
    settled: Option<watch::Sender<Settled>>,
    finished: bool,
}

impl ToggleMutation {
    /// Remove the in-flight entry, restoring the edge to `state` locally.
    /// Caller holds the in-flight lock.
    fn release(
        &mut self,
        inflight: &mut HashMap<EdgeKey, InFlight>,
        state: bool,
    ) -> Option<watch::Sender<Settled>> {
        self.finished = true;
        self.core.session.set_edge(&self.key, state);
        inflight.remove(&self.key).map(|entry| entry.settled)
    }
}

#[async_trait::async_trait]
impl OptimisticMutation for ToggleMutation {
    type Snapshot = ();
    type Output = ToggleOutcome;

    fn name(&self) -> &'static str {
        match self.key.relation {
            Relation::Like => "toggle_like",
            Relation::Follow => "toggle_follow",
            Relation::CommentLike => "toggle_comment_like",
        }
    }

    fn apply(&mut self) {
        let inflight = self.core.inflight.lock();
        let desired = inflight
            .get(&self.key)
            .map(|entry| entry.desired)
            .unwrap_or(!self.original);
        self.core.session.set_edge(&self.key, desired);
    }

    async fn commit(&mut self) -> SocialResult<ToggleOutcome> {
        let core = Arc::clone(&self.core);
        let mut path = None;
        let mut partial = None;

        loop {
            let target = {
                let mut inflight = core.inflight.lock();
                let desired = inflight
                    .get(&self.key)
                    .map(|entry| entry.desired)
                    .unwrap_or(self.confirmed);
                if desired == self.confirmed {
                    let confirmed = self.confirmed;
                    self.settled = self.release(&mut inflight, confirmed);
                    break;
                }
                desired
            };

            let (used, report) = core.write(&self.key, target).await?;
            self.confirmed = target;
            path = Some(used);
            partial = report.partial().cloned();

            if let Some(p) = &partial {
                warn!(
                    relation = self.key.relation.as_str(),
                    subject = %self.key.subject,
                    object = %self.key.object,
                    written = %p.written,
                    failed = %p.failed,
                    "Edge stored on one side only (degraded success)"
                );
                GraphMetrics::record_partial_failure(self.key.relation.as_str());
            }
        }

        Ok(ToggleOutcome {
            relation: self.key.relation,
            applied: self.confirmed != self.original,
            final_state: self.confirmed,
            path,
            partial,
        })
    }

    fn settle(&mut self, _snapshot: (), outcome: &ToggleOutcome) {
        if let Some(settled) = self.settled.take() {
            settled.send_replace(Some(Ok(outcome.clone())));
        }
    }

    fn rollback(&mut self, _snapshot: (), error: &SocialError) {
        let core = Arc::clone(&self.core);
        let settled = {
            let mut inflight = core.inflight.lock();
            let confirmed = self.confirmed;
            self.release(&mut inflight, confirmed)
        };
        if let Some(settled) = settled {
            settled.send_replace(Some(Err(error.clone())));
        }
    }
}

impl Drop for ToggleMutation {
    fn drop(&mut self) {
        // Only reached when the task panicked or the runtime shut down;
        // waiters then see a closed channel
        if !self.finished {
            let core = Arc::clone(&self.core);
            let mut inflight = core.inflight.lock();
            let confirmed = self.confirmed;
            self.release(&mut inflight, confirmed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CurrentUser;
    use crate::identity::SessionIdentity;
    use crate::repository::MockGraphAdapter;

    fn adapter() -> MockGraphAdapter {
        MockGraphAdapter::new()
    }

    fn missing() -> StoreError {
        StoreError::RelationMissing("relation does not exist".into())
    }

    fn coordinator(
        canonical: MockGraphAdapter,
        legacy: MockGraphAdapter,
    ) -> (Uuid, Arc<SessionStore>, DualPathGraphCoordinator) {
        let me = Uuid::new_v4();
        let session = Arc::new(SessionStore::new());
        let identity = Arc::new(SessionIdentity::signed_in(CurrentUser::new(me, "me")));
        let coordinator = DualPathGraphCoordinator::new(
            session.clone(),
            identity,
            Arc::new(canonical),
            Arc::new(legacy),
        );
        (me, session, coordinator)
    }

    #[tokio::test]
    async fn test_canonical_write() {
        let mut canonical = adapter();
        canonical
            .expect_link()
            .times(1)
            .returning(|_| Ok(WriteReport::Complete));
        let (me, session, coordinator) = coordinator(canonical, adapter());
        let post = Uuid::new_v4();

        let outcome = coordinator.toggle(Relation::Like, me, post).await.unwrap();

        assert!(outcome.applied);
        assert!(outcome.final_state);
        assert_eq!(outcome.path, Some(WritePath::Canonical));
        assert!(session.has_edge(&EdgeKey::like(me, post)));
        assert!(!coordinator.is_pending(Relation::Like, me, post));
    }

    #[tokio::test]
    async fn test_fallback_is_remembered() {
        let mut canonical = adapter();
        canonical.expect_link().times(1).returning(|_| Err(missing()));
        let mut legacy = adapter();
        legacy
            .expect_link()
            .times(1)
            .returning(|_| Ok(WriteReport::Complete));
        legacy
            .expect_unlink()
            .times(1)
            .returning(|_| Ok(WriteReport::Complete));
        let (me, _session, coordinator) = coordinator(canonical, legacy);
        let other = Uuid::new_v4();

        let first = coordinator.toggle(Relation::Follow, me, other).await.unwrap();
        assert_eq!(first.path, Some(WritePath::Legacy));
        assert_eq!(coordinator.preferred_path(Relation::Follow), WritePath::Legacy);
        assert_eq!(coordinator.preferred_path(Relation::Like), WritePath::Canonical);

        // Canonical is not tried again: its mock allows a single call
        let second = coordinator.toggle(Relation::Follow, me, other).await.unwrap();
        assert!(!second.final_state);
        assert_eq!(second.path, Some(WritePath::Legacy));
    }

    #[tokio::test]
    async fn test_no_path_is_schema_mismatch_and_rolls_back() {
        let mut canonical = adapter();
        canonical.expect_link().returning(|_| Err(missing()));
        let mut legacy = adapter();
        legacy.expect_link().returning(|_| Err(missing()));
        let (me, session, coordinator) = coordinator(canonical, legacy);
        let post = Uuid::new_v4();

        let err = coordinator.toggle(Relation::Like, me, post).await.unwrap_err();

        assert!(matches!(err, SocialError::SchemaMismatch(_)));
        assert!(!session.has_edge(&EdgeKey::like(me, post)));
        assert!(!coordinator.is_pending(Relation::Like, me, post));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_fall_back() {
        let mut canonical = adapter();
        canonical
            .expect_link()
            .times(1)
            .returning(|_| Err(StoreError::Transport("reset".into())));
        let mut legacy = adapter();
        legacy.expect_link().never();
        let (me, session, coordinator) = coordinator(canonical, legacy);
        let post = Uuid::new_v4();

        let err = coordinator.toggle(Relation::Like, me, post).await.unwrap_err();

        assert!(matches!(err, SocialError::RemoteUnavailable(_)));
        assert_ne!(err, SocialError::NotAuthenticated);
        assert!(!session.has_edge(&EdgeKey::like(me, post)));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_local_state() {
        let mut canonical = adapter();
        canonical.expect_link().returning(|_| Err(missing()));
        let mut legacy = adapter();
        legacy.expect_link().returning(|_| {
            Ok(WriteReport::Partial(PartialFailure {
                written: "users.following".into(),
                failed: "users.followers".into(),
                reason: "timeout".into(),
            }))
        });
        let (me, session, coordinator) = coordinator(canonical, legacy);
        let other = Uuid::new_v4();

        let outcome = coordinator.toggle(Relation::Follow, me, other).await.unwrap();

        assert!(outcome.is_degraded());
        assert!(outcome.final_state);
        assert!(session.has_edge(&EdgeKey::follow(me, other)));
    }

    #[tokio::test]
    async fn test_rejections_before_any_write() {
        let mut canonical = adapter();
        canonical.expect_link().never();
        let (me, _session, coordinator) = coordinator(canonical, adapter());

        assert_eq!(
            coordinator.toggle(Relation::Follow, me, me).await.unwrap_err(),
            SocialError::SelfRelationRejected
        );
        assert!(matches!(
            coordinator.toggle(Relation::Like, Uuid::new_v4(), Uuid::new_v4()).await,
            Err(SocialError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_anonymous_toggle() {
        let session = Arc::new(SessionStore::new());
        let coordinator = DualPathGraphCoordinator::new(
            session,
            Arc::new(SessionIdentity::anonymous()),
            Arc::new(adapter()),
            Arc::new(adapter()),
        );

        let err = coordinator
            .toggle_current(Relation::Like, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err, SocialError::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_refresh_reads_through_fallback() {
        let followed = vec![Uuid::new_v4(), Uuid::new_v4()];
        let mut canonical = adapter();
        canonical.expect_objects_of().returning(|_, _| Err(missing()));
        let mut legacy = adapter();
        let ids = followed.clone();
        legacy
            .expect_objects_of()
            .returning(move |_, _| Ok(ids.clone()));
        let (me, session, coordinator) = coordinator(canonical, legacy);

        coordinator.refresh_objects(Relation::Follow, me).await.unwrap();

        let mut cached = session.objects_of(Relation::Follow, me);
        cached.sort();
        let mut expected = followed;
        expected.sort();
        assert_eq!(cached, expected);
        assert_eq!(coordinator.preferred_path(Relation::Follow), WritePath::Legacy);
    }
}
