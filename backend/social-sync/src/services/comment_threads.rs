/// Comment thread manager
///
/// Create, edit and delete comments optimistically against the session's
/// comment forests. Creates are rolled back precisely; failed edits and
/// deletes reload the post's whole thread from the store. Each write runs
/// on its own task and settles the session even when its caller is gone.
use crate::domain::{Comment, CurrentUser, Relation, Timestamp};
use crate::error::{SocialError, SocialResult};
use crate::identity::IdentityProvider;
use crate::metrics::MutationMetrics;
use crate::repository::CommentRepository;
use crate::services::comment_forest::{CommentForest, ThreadEntry};
use crate::services::optimistic::{commit_applied, OptimisticMutation};
use crate::session::SessionStore;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct CommentThreadManager {
    core: Arc<ThreadCore>,
    identity: Arc<dyn IdentityProvider>,
}

/// State shared with detached comment writes
struct ThreadCore {
    session: Arc<SessionStore>,
    repository: CommentRepository,
}

fn validate_content(content: &str) -> SocialResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(SocialError::Validation("comment must not be empty".into()));
    }
    Ok(content.to_string())
}

/// Run an applied comment write on its own task; dropping the caller only stops waiting
async fn detach<T, F>(write: F) -> SocialResult<T>
where
    T: Send + 'static,
    F: Future<Output = SocialResult<T>> + Send + 'static,
{
    match tokio::spawn(write).await {
        Ok(result) => result,
        Err(e) => Err(SocialError::Internal(format!("comment write task failed: {}", e))),
    }
}

impl ThreadCore {
    async fn load(&self, post_id: Uuid) -> SocialResult<Vec<ThreadEntry>> {
        let comments = self.repository.list_for_post(post_id).await?;
        let forest = CommentForest::assemble(comments);
        let thread = forest.flatten();
        debug!(post_id = %post_id, comments = thread.len(), "Comment thread loaded");
        self.session.replace_thread(post_id, forest);
        Ok(thread)
    }

    async fn resync(&self, post_id: Uuid, reason: &'static str) {
        match self.load(post_id).await {
            Ok(_) => {
                info!(post_id = %post_id, reason = reason, "Comment thread resynced");
                MutationMetrics::record_resync(reason, "ok");
            }
            Err(e) => {
                warn!(post_id = %post_id, reason = reason, error = %e, "Comment thread resync failed");
                MutationMetrics::record_resync(reason, "error");
            }
        }
    }
}

impl CommentThreadManager {
    pub fn new(
        session: Arc<SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        repository: CommentRepository,
    ) -> Self {
        Self {
            core: Arc::new(ThreadCore {
                session,
                repository,
            }),
            identity,
        }
    }

    /// Fetch a post's comments, rebuild its forest and return the rendered thread
    pub async fn load(&self, post_id: Uuid) -> SocialResult<Vec<ThreadEntry>> {
        self.core.load(post_id).await
    }

    /// Rendered thread from the session; empty until loaded
    pub fn thread(&self, post_id: &Uuid) -> Vec<ThreadEntry> {
        self.core
            .session
            .with_thread(post_id, CommentForest::flatten)
            .unwrap_or_default()
    }

    fn existing(&self, comment_id: &Uuid) -> SocialResult<Comment> {
        let comment = self
            .core
            .session
            .find_comment(comment_id)
            .ok_or_else(|| SocialError::NotFound(format!("comment {} not loaded", comment_id)))?;
        if comment.pending {
            return Err(SocialError::Validation("comment is still being saved".into()));
        }
        Ok(comment)
    }

    fn check_parent(&self, post_id: Uuid, parent_id: Uuid) -> SocialResult<()> {
        let session = &self.core.session;
        let parent = session
            .with_thread(&post_id, |forest| forest.get(&parent_id).cloned())
            .flatten();

        match parent {
            Some(parent) if parent.pending => Err(SocialError::Validation(
                "cannot reply to a comment that is still being saved".into(),
            )),
            Some(_) => Ok(()),
            None if session.find_comment(&parent_id).is_some() => Err(
                SocialError::Validation("parent comment belongs to another post".into()),
            ),
            None => Err(SocialError::Validation("parent comment not found".into())),
        }
    }

    /// Add a comment (or a reply when `parent_id` is set).
    ///
    /// The comment shows up immediately at the front of its list with a
    /// temporary id and is swapped for the stored row once confirmed.
    pub async fn create(
        &self,
        post_id: Uuid,
        content: &str,
        parent_id: Option<Uuid>,
    ) -> SocialResult<Comment> {
        let content = validate_content(content)?;
        let author = self.identity.require_user()?;
        if let Some(parent_id) = parent_id {
            self.check_parent(post_id, parent_id)?;
        }

        let placeholder = Comment {
            id: Uuid::new_v4(),
            post_id,
            author_id: author.id,
            content,
            parent_id,
            created_at: Timestamp::now(),
            like_count: 0,
            edited: false,
            pending: true,
        };

        let mut mutation = CreateComment {
            core: self.core.clone(),
            placeholder,
        };
        let snapshot = mutation.apply();
        detach(commit_applied(mutation, snapshot)).await
    }

    /// Edit a comment's text. Only its author may do so.
    pub async fn update(&self, comment_id: Uuid, content: &str) -> SocialResult<Comment> {
        let content = validate_content(content)?;
        let user = self.identity.require_user()?;
        let comment = self.existing(&comment_id)?;
        if comment.author_id != user.id {
            return Err(SocialError::Forbidden("only the author can edit a comment".into()));
        }

        let post_id = comment.post_id;
        let mut mutation = UpdateComment {
            core: self.core.clone(),
            user,
            comment_id,
            post_id,
            content,
        };
        let snapshot = mutation.apply();
        let core = self.core.clone();
        detach(async move {
            let result = commit_applied(mutation, snapshot).await;

            if result.is_err() {
                core.resync(post_id, "update_failed").await;
            }
            result
        })
        .await
    }

    /// Delete a comment with all its replies. Author or admin only.
    ///
    /// The subtree leaves the session before the store is contacted. The
    /// store side removes every stored descendant, loaded or not.
    /// Returns the ids of every removed comment.
    pub async fn delete(&self, comment_id: Uuid) -> SocialResult<Vec<Uuid>> {
        let user = self.identity.require_user()?;
        let comment = self.existing(&comment_id)?;
        if comment.author_id != user.id && !user.is_admin {
            return Err(SocialError::Forbidden(
                "only the author or an admin can delete a comment".into(),
            ));
        }

        let post_id = comment.post_id;
        let mut mutation = DeleteComment {
            core: self.core.clone(),
            post_id,
            comment_id,
            removed: Vec::new(),
        };
        let snapshot = mutation.apply();
        let core = self.core.clone();
        detach(async move {
            let result = commit_applied(mutation, snapshot).await;

            if result.is_err() {
                core.resync(post_id, "delete_failed").await;
            }
            result
        })
        .await
    }
}

struct CreateComment {
    core: Arc<ThreadCore>,
    placeholder: Comment,
}

#[async_trait::async_trait]
impl OptimisticMutation for CreateComment {
    type Snapshot = ();
    type Output = Comment;

    fn name(&self) -> &'static str {
        "create_comment"
    }

    fn apply(&mut self) {
        let session = &self.core.session;
        let placeholder = self.placeholder.clone();
        session.with_thread_mut(placeholder.post_id, |forest| forest.insert_front(placeholder));
        session.adjust_comment_count(&self.placeholder.post_id, 1);
    }

    async fn commit(&mut self) -> SocialResult<Comment> {
        let c = &self.placeholder;
        let stored = self
            .core
            .repository
            .create_comment(c.post_id, c.author_id, &c.content, c.parent_id)
            .await?;
        Ok(stored)
    }

    fn settle(&mut self, _snapshot: (), stored: &Comment) {
        let temp_id = self.placeholder.id;
        let stored = stored.clone();
        self.core
            .session
            .with_thread_mut(self.placeholder.post_id, |forest| {
                // A reload while the write was out drops the placeholder
                if !forest.replace(&temp_id, stored.clone()) {
                    debug!(comment_id = %stored.id, "Placeholder gone, inserting stored comment");
                    forest.insert_front(stored);
                }
            });
    }

    fn rollback(&mut self, _snapshot: (), _error: &SocialError) {
        let session = &self.core.session;
        let temp_id = self.placeholder.id;
        session.with_thread_mut(self.placeholder.post_id, |forest| forest.remove_subtree(&temp_id));
        session.adjust_comment_count(&self.placeholder.post_id, -1);
    }
}

struct UpdateComment {
    core: Arc<ThreadCore>,
    user: CurrentUser,
    comment_id: Uuid,
    post_id: Uuid,
    content: String,
}

#[async_trait::async_trait]
impl OptimisticMutation for UpdateComment {
    /// (content, edited) before the change
    type Snapshot = Option<(String, bool)>;
    type Output = Comment;

    fn name(&self) -> &'static str {
        "update_comment"
    }

    fn apply(&mut self) -> Option<(String, bool)> {
        let (id, content) = (self.comment_id, self.content.clone());
        self.core
            .session
            .with_thread_mut(self.post_id, |forest| {
                forest.get_mut(&id).map(|comment| {
                    let before = (
                        std::mem::replace(&mut comment.content, content),
                        comment.edited,
                    );
                    comment.edited = true;
                    before
                })
            })
            .flatten()
    }

    async fn commit(&mut self) -> SocialResult<Comment> {
        let stored = self
            .core
            .repository
            .update_comment(self.comment_id, self.user.id, &self.content)
            .await?;
        Ok(stored)
    }

    fn settle(&mut self, _snapshot: Option<(String, bool)>, stored: &Comment) {
        let (id, stored) = (self.comment_id, stored.clone());
        self.core
            .session
            .with_thread_mut(self.post_id, |forest| forest.replace(&id, stored));
    }

    fn rollback(&mut self, snapshot: Option<(String, bool)>, _error: &SocialError) {
        let Some((content, edited)) = snapshot else {
            return;
        };
        let id = self.comment_id;
        self.core.session.with_thread_mut(self.post_id, |forest| {
            if let Some(comment) = forest.get_mut(&id) {
                comment.content = content;
                comment.edited = edited;
            }
        });
    }
}

struct DeleteComment {
    core: Arc<ThreadCore>,
    post_id: Uuid,
    comment_id: Uuid,
    removed: Vec<Uuid>,
}

#[async_trait::async_trait]
impl OptimisticMutation for DeleteComment {
    type Snapshot = ();
    type Output = Vec<Uuid>;

    fn name(&self) -> &'static str {
        "delete_comment"
    }

    fn apply(&mut self) {
        let session = &self.core.session;
        let id = self.comment_id;
        self.removed = session
            .with_thread_mut(self.post_id, |forest| forest.remove_subtree(&id))
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.id)
            .collect();
        session.adjust_comment_count(&self.post_id, -(self.removed.len() as i64));
        session.forget_edges_to(Relation::CommentLike, &self.removed);
    }

    async fn commit(&mut self) -> SocialResult<Vec<Uuid>> {
        let core = Arc::clone(&self.core);
        let stored = core
            .repository
            .subtree_ids(self.post_id, self.comment_id)
            .await?;

        let mut ids = self.removed.clone();
        for id in stored {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        core.repository.delete_comments(&ids).await?;

        // Replies stored after the thread was loaded
        let unseen = &ids[self.removed.len()..];
        if !unseen.is_empty() {
            debug!(
                post_id = %self.post_id,
                comment_id = %self.comment_id,
                count = unseen.len(),
                "Deleted replies that were not loaded"
            );
            core.session.forget_edges_to(Relation::CommentLike, unseen);
        }
        Ok(ids)
    }

    fn rollback(&mut self, _snapshot: (), _error: &SocialError) {
        // Comments come back with the resync; the counter does not
        self.core
            .session
            .adjust_comment_count(&self.post_id, self.removed.len() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::domain::Post;
    use crate::identity::SessionIdentity;
    use remote_store::{InMemoryStore, StoreError, StoreOp};
    use serde_json::json;

    struct Fixture {
        store: Arc<InMemoryStore>,
        session: Arc<SessionStore>,
        identity: Arc<SessionIdentity>,
        manager: CommentThreadManager,
        me: CurrentUser,
        post_id: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        store.create_table("comments");
        store.create_table("comment_likes");
        let me = CurrentUser::new(Uuid::new_v4(), "me");
        let identity = Arc::new(SessionIdentity::signed_in(me.clone()));
        let session = Arc::new(SessionStore::new());
        let post_id = Uuid::new_v4();
        session.replace_posts(vec![Post {
            id: post_id,
            title: "post".into(),
            caption: String::new(),
            body: String::new(),
            author_id: Uuid::new_v4(),
            author_display_name: "author".into(),
            categories: vec![],
            created_at: Timestamp::now(),
            like_count: 0,
            comment_count: 0,
        }]);
        let manager = CommentThreadManager::new(
            session.clone(),
            identity.clone(),
            CommentRepository::new(store.clone(), TableConfig::default()),
        );
        Fixture {
            store,
            session,
            identity,
            manager,
            me,
            post_id,
        }
    }

    fn comment_count(f: &Fixture) -> i64 {
        f.session.post(&f.post_id).map(|p| p.comment_count).unwrap_or(-1)
    }

    #[tokio::test]
    async fn test_create_replaces_placeholder() {
        let f = fixture();
        let created = f.manager.create(f.post_id, "  hello  ", None).await.unwrap();

        assert_eq!(created.content, "hello");
        let thread = f.manager.thread(&f.post_id);
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].comment.id, created.id);
        assert!(!thread[0].comment.pending);
        assert_eq!(comment_count(&f), 1);
    }

    #[tokio::test]
    async fn test_create_failure_rolls_back() {
        let f = fixture();
        f.store
            .fail_next(StoreOp::Insert, "comments", StoreError::Transport("down".into()));

        let err = f.manager.create(f.post_id, "hello", None).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(f.manager.thread(&f.post_id).is_empty());
        assert_eq!(comment_count(&f), 0);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let f = fixture();
        assert!(matches!(
            f.manager.create(f.post_id, "   ", None).await,
            Err(SocialError::Validation(_))
        ));
        assert!(matches!(
            f.manager.create(f.post_id, "reply", Some(Uuid::new_v4())).await,
            Err(SocialError::Validation(_))
        ));

        let other_post = Uuid::new_v4();
        let elsewhere = f.manager.create(other_post, "elsewhere", None).await.unwrap();
        assert!(matches!(
            f.manager.create(f.post_id, "reply", Some(elsewhere.id)).await,
            Err(SocialError::Validation(_))
        ));

        f.identity.sign_out();
        assert_eq!(
            f.manager.create(f.post_id, "hi", None).await.unwrap_err(),
            SocialError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn test_reply_goes_to_front_of_parent() {
        let f = fixture();
        let root = f.manager.create(f.post_id, "root", None).await.unwrap();
        let first = f.manager.create(f.post_id, "first", Some(root.id)).await.unwrap();
        let second = f.manager.create(f.post_id, "second", Some(root.id)).await.unwrap();

        let thread = f.manager.thread(&f.post_id);
        let order: Vec<_> = thread.iter().map(|e| (e.comment.id, e.depth)).collect();
        assert_eq!(order, vec![(root.id, 0), (second.id, 1), (first.id, 1)]);
    }

    #[tokio::test]
    async fn test_update_by_author_only() {
        let f = fixture();
        let stranger = Uuid::new_v4();
        f.store.seed(
            "comments",
            [json!({"id": Uuid::new_v4(), "post_id": f.post_id, "author_id": stranger, "content": "theirs"})],
        );
        f.manager.load(f.post_id).await.unwrap();
        let theirs = f.manager.thread(&f.post_id)[0].comment.id;
        assert!(matches!(
            f.manager.update(theirs, "mine now").await,
            Err(SocialError::Forbidden(_))
        ));

        let mine = f.manager.create(f.post_id, "draft", None).await.unwrap();
        let updated = f.manager.update(mine.id, "final").await.unwrap();
        assert!(updated.edited);
        assert_eq!(f.session.find_comment(&mine.id).unwrap().content, "final");
    }

    #[tokio::test]
    async fn test_failed_update_resyncs() {
        let f = fixture();
        let mine = f.manager.create(f.post_id, "draft", None).await.unwrap();
        f.store
            .fail_next(StoreOp::Update, "comments", StoreError::Transport("down".into()));

        assert!(f.manager.update(mine.id, "final").await.is_err());

        let cached = f.session.find_comment(&mine.id).unwrap();
        assert_eq!(cached.content, "draft");
        assert!(!cached.edited);
        assert_eq!(f.store.call_count(StoreOp::Select, "comments"), 1);
    }

    #[tokio::test]
    async fn test_admin_deletes_subtree() {
        let f = fixture();
        let author = Uuid::new_v4();
        let root = Uuid::new_v4();
        let reply = Uuid::new_v4();
        f.store.seed(
            "comments",
            [
                json!({"id": root, "post_id": f.post_id, "author_id": author, "content": "root",
                       "created_at": "2024-01-01T00:00:00Z"}),
                json!({"id": reply, "post_id": f.post_id, "author_id": author, "content": "reply",
                       "parent_id": root, "created_at": "2024-01-02T00:00:00Z"}),
            ],
        );
        f.manager.load(f.post_id).await.unwrap();
        assert!(matches!(f.manager.delete(root).await, Err(SocialError::Forbidden(_))));

        f.identity.sign_in(f.me.clone().admin());
        let removed = f.manager.delete(root).await.unwrap();

        assert_eq!(removed, vec![root, reply]);
        assert!(f.manager.thread(&f.post_id).is_empty());
        assert!(f.store.rows("comments").is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_reloads_thread() {
        let f = fixture();
        let mine = f.manager.create(f.post_id, "keep me", None).await.unwrap();
        f.store
            .fail_next(StoreOp::Delete, "comments", StoreError::Transport("down".into()));

        assert!(f.manager.delete(mine.id).await.is_err());

        assert!(f.session.find_comment(&mine.id).is_some());
        assert_eq!(comment_count(&f), 1);
    }
}
