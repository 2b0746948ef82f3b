pub mod edge;
pub mod models;

pub use edge::{EdgeKey, Relation, WritePath};
pub use models::{Comment, CurrentUser, Post, PostDraft, Timestamp};
