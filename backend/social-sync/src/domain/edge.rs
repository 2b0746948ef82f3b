use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relationship kinds handled by the graph coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// user -> post
    Like,
    /// follower -> followee
    Follow,
    /// user -> comment
    CommentLike,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Like => "like",
            Relation::Follow => "follow",
            Relation::CommentLike => "comment_like",
        }
    }

    /// Whether subject and object may be the same identity
    pub fn allows_self(&self) -> bool {
        !matches!(self, Relation::Follow)
    }
}

/// One directed edge: (relation, subject, object)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub relation: Relation,
    pub subject: Uuid,
    pub object: Uuid,
}

impl EdgeKey {
    pub fn new(relation: Relation, subject: Uuid, object: Uuid) -> Self {
        Self {
            relation,
            subject,
            object,
        }
    }

    pub fn like(user_id: Uuid, post_id: Uuid) -> Self {
        Self::new(Relation::Like, user_id, post_id)
    }

    pub fn follow(follower_id: Uuid, followee_id: Uuid) -> Self {
        Self::new(Relation::Follow, follower_id, followee_id)
    }

    pub fn comment_like(user_id: Uuid, comment_id: Uuid) -> Self {
        Self::new(Relation::CommentLike, user_id, comment_id)
    }
}

/// Persistence layout an edge write went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePath {
    /// One row per edge in a join table
    Canonical,
    /// Mirrored id arrays on both participants' rows
    Legacy,
}

impl WritePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            WritePath::Canonical => "canonical",
            WritePath::Legacy => "legacy",
        }
    }

    pub fn other(&self) -> WritePath {
        match self {
            WritePath::Canonical => WritePath::Legacy,
            WritePath::Legacy => WritePath::Canonical,
        }
    }
}
