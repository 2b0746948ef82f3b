use crate::config::PagingConfig;
use crate::domain::Post;
use crate::services::feed_ranking::{rank_posts, FeedCriteria};
use crate::services::pagination::PaginationWindow;
use crate::session::SessionStore;
use std::sync::Arc;
use tracing::debug;

/// Which screen a view backs; decides the page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Feed,
    Explore,
}

impl FeedKind {
    pub fn page_size(&self, paging: &PagingConfig) -> usize {
        match self {
            FeedKind::Feed => paging.feed_page_size,
            FeedKind::Explore => paging.explore_page_size,
        }
    }
}

/// Ranked, windowed view of the session's posts
pub struct FeedView {
    session: Arc<SessionStore>,
    kind: FeedKind,
    criteria: FeedCriteria,
    window: PaginationWindow,
}

/// What a view renders right now
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    /// Posts matching the criteria, visible or not
    pub total: usize,
    pub has_more: bool,
}

impl FeedView {
    pub fn new(session: Arc<SessionStore>, kind: FeedKind, paging: &PagingConfig) -> Self {
        Self {
            session,
            kind,
            criteria: FeedCriteria::default(),
            window: PaginationWindow::new(kind.page_size(paging)),
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn criteria(&self) -> &FeedCriteria {
        &self.criteria
    }

    pub fn window(&self) -> &PaginationWindow {
        &self.window
    }

    /// Replace the criteria. Any actual change starts again from one page.
    pub fn set_criteria(&mut self, criteria: FeedCriteria) {
        if criteria != self.criteria {
            self.criteria = criteria;
            self.window.reset();
            debug!(kind = ?self.kind, "Feed criteria changed, window reset");
        }
    }

    /// Apply an edit to the current criteria
    pub fn update_criteria(&mut self, edit: impl FnOnce(&mut FeedCriteria)) {
        let mut criteria = self.criteria.clone();
        edit(&mut criteria);
        self.set_criteria(criteria);
    }

    /// Show one more page
    pub fn load_more(&mut self) {
        self.window.grow();
    }

    pub fn page(&self) -> FeedPage {
        let ranked = rank_posts(&self.session.posts(), &self.criteria);
        FeedPage {
            posts: self.window.visible(&ranked).to_vec(),
            total: ranked.len(),
            has_more: self.window.has_more(ranked.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timestamp;
    use crate::services::feed_ranking::SortMode;
    use uuid::Uuid;

    fn session_with(n: usize) -> Arc<SessionStore> {
        let session = Arc::new(SessionStore::new());
        let posts = (0..n)
            .map(|i| crate::domain::Post {
                id: Uuid::new_v4(),
                title: format!("post {}", i),
                caption: String::new(),
                body: String::new(),
                author_id: Uuid::new_v4(),
                author_display_name: "someone".into(),
                categories: vec![if i % 2 == 0 { "even" } else { "odd" }.to_string()],
                created_at: Timestamp::new(format!("2024-01-01T00:00:{:02}Z", i % 60)),
                like_count: i as i64,
                comment_count: 0,
            })
            .collect();
        session.replace_posts(posts);
        session
    }

    #[test]
    fn test_load_more_and_reset_on_filter_change() {
        let mut view = FeedView::new(session_with(30), FeedKind::Feed, &PagingConfig::default());
        assert_eq!(view.page().posts.len(), 6);

        for _ in 0..3 {
            view.load_more();
        }
        let page = view.page();
        assert_eq!(page.posts.len(), 24);
        assert!(page.has_more);

        view.update_criteria(|c| {
            c.categories.insert("even".into());
        });
        assert_eq!(view.window().window_size(), 6);
        assert_eq!(view.page().total, 15);
    }

    #[test]
    fn test_unchanged_criteria_keep_window() {
        let mut view = FeedView::new(session_with(20), FeedKind::Explore, &PagingConfig::default());
        view.load_more();
        view.set_criteria(FeedCriteria::default());
        assert_eq!(view.window().window_size(), 16);

        view.update_criteria(|c| c.sort_mode = SortMode::MostLiked);
        assert_eq!(view.window().window_size(), 8);
        assert_eq!(view.page().posts[0].like_count, 19);
    }
}
