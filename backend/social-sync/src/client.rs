//! Session wiring
//!
//! One `SocialClient` per signed-in session. It owns the session store and
//! hands every component the same store, identity and timeout-wrapped
//! remote store.

use crate::config::Config;
use crate::domain::Relation;
use crate::error::SocialResult;
use crate::identity::IdentityProvider;
use crate::repository::{
    CanonicalGraphAdapter, CommentRepository, LegacyArrayGraphAdapter, PostRepository,
};
use crate::services::{
    CommentThreadManager, DualPathGraphCoordinator, FeedKind, FeedView, PostCatalog,
};
use crate::session::SessionStore;
use remote_store::{RemoteStore, TimeoutStore};
use std::sync::Arc;
use tracing::info;

pub struct SocialClient {
    config: Config,
    identity: Arc<dyn IdentityProvider>,
    session: Arc<SessionStore>,
    graph: DualPathGraphCoordinator,
    comments: CommentThreadManager,
    catalog: PostCatalog,
}

impl SocialClient {
    pub fn new(
        config: Config,
        store: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let store: Arc<dyn RemoteStore> =
            Arc::new(TimeoutStore::new(store, config.remote.timeout()));
        let session = Arc::new(SessionStore::new());
        let tables = &config.tables;

        let graph = DualPathGraphCoordinator::new(
            session.clone(),
            identity.clone(),
            Arc::new(CanonicalGraphAdapter::new(store.clone(), tables.clone())),
            Arc::new(LegacyArrayGraphAdapter::new(store.clone(), tables.clone())),
        );
        let comments = CommentThreadManager::new(
            session.clone(),
            identity.clone(),
            CommentRepository::new(store.clone(), tables.clone()),
        );
        let catalog = PostCatalog::new(
            session.clone(),
            identity.clone(),
            PostRepository::new(store, tables.clone()),
            config.posts.clone(),
        );

        Self {
            config,
            identity,
            session,
            graph,
            comments,
            catalog,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn graph(&self) -> &DualPathGraphCoordinator {
        &self.graph
    }

    pub fn comments(&self) -> &CommentThreadManager {
        &self.comments
    }

    pub fn catalog(&self) -> &PostCatalog {
        &self.catalog
    }

    /// A fresh feed or explore view over this session's posts
    pub fn feed_view(&self, kind: FeedKind) -> FeedView {
        FeedView::new(self.session.clone(), kind, &self.config.paging)
    }

    /// Load posts and, when signed in, the user's likes and follows
    pub async fn bootstrap(&self) -> SocialResult<()> {
        let posts = self.catalog.refresh().await?;
        if let Some(user) = self.identity.current_user() {
            let liked = self.graph.refresh_objects(Relation::Like, user.id).await?;
            let following = self.graph.refresh_objects(Relation::Follow, user.id).await?;
            info!(
                user_id = %user.id,
                posts = posts,
                liked = liked.len(),
                following = following.len(),
                "Session bootstrapped"
            );
        }
        Ok(())
    }

    /// Tear the session down. Writes still in flight finish remotely but
    /// no longer touch local state.
    pub fn logout(&self) {
        self.session.teardown();
        info!("Session closed");
    }
}
