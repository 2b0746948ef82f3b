use crate::config::PostConfig;
use crate::domain::{Post, PostDraft};
use crate::error::SocialResult;
use crate::identity::IdentityProvider;
use crate::repository::PostRepository;
use crate::session::SessionStore;
use std::sync::Arc;
use tracing::info;

/// Post collection of the session: loading and publishing
pub struct PostCatalog {
    session: Arc<SessionStore>,
    identity: Arc<dyn IdentityProvider>,
    repository: PostRepository,
    config: PostConfig,
}

impl PostCatalog {
    pub fn new(
        session: Arc<SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        repository: PostRepository,
        config: PostConfig,
    ) -> Self {
        Self {
            session,
            identity,
            repository,
            config,
        }
    }

    /// Reload every post into the session
    pub async fn refresh(&self) -> SocialResult<usize> {
        let posts = self.repository.list_posts().await?;
        let count = posts.len();
        self.session.replace_posts(posts);
        info!(count = count, "Post catalog refreshed");
        Ok(count)
    }

    /// Validate and store a new post, then show it first.
    /// Nothing is written when validation fails.
    pub async fn publish(&self, draft: PostDraft) -> SocialResult<Post> {
        let author = self.identity.require_user()?;
        let draft = draft.normalize(self.config.max_categories)?;

        let post = self.repository.create_post(&draft, &author).await?;
        info!(post_id = %post.id, author_id = %author.id, "Post published");
        self.session.prepend_post(post.clone());
        Ok(post)
    }
}
