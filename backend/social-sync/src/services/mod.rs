pub mod comment_forest;
pub mod comment_threads;
pub mod feed_ranking;
pub mod feed_view;
pub mod graph_coordinator;
pub mod optimistic;
pub mod pagination;
pub mod post_catalog;

pub use comment_forest::{CommentForest, ThreadEntry};
pub use comment_threads::CommentThreadManager;
pub use feed_ranking::{rank_posts, FeedCriteria, SortMode};
pub use feed_view::{FeedKind, FeedPage, FeedView};
pub use graph_coordinator::{DualPathGraphCoordinator, ToggleOutcome};
pub use optimistic::{commit_applied, run_optimistic, OptimisticMutation};
pub use pagination::PaginationWindow;
pub use post_catalog::PostCatalog;
