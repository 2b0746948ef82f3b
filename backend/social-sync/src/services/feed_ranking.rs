//! Client-side filtering and ordering of the post collection
//!
//! Pure functions over an in-memory snapshot: nothing here touches the
//! session or the store, and the input slice is never reordered.
//!
//! Filtering:
//! - Text: case-insensitive substring of title, body or author name
//! - Categories: post kept if it carries any selected category
//! - Dates: inclusive bounds; a date-only upper bound covers the whole day.
//!   Unparsable dates never exclude a post (fail-open)
//!
//! Ordering is a stable sort, so ranking an already ranked list is a no-op.

use crate::domain::models::parse_bound;
use crate::domain::Post;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Recent,
    MostLiked,
    MostCommented,
}

/// Filter and sort settings chosen by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCriteria {
    #[serde(default)]
    pub text_query: String,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub author_substring: String,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub sort_mode: SortMode,
}

impl FeedCriteria {
    pub fn with_text(mut self, query: impl Into<String>) -> Self {
        self.text_query = query.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author_substring = author.into();
        self
    }

    pub fn between(mut self, from: Option<&str>, to: Option<&str>) -> Self {
        self.date_from = from.map(str::to_string);
        self.date_to = to.map(str::to_string);
        self
    }

    pub fn sorted_by(mut self, sort_mode: SortMode) -> Self {
        self.sort_mode = sort_mode;
        self
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Compiled form of the criteria, lowercased and parsed once per ranking
struct Matcher<'a> {
    text: Option<String>,
    author: Option<String>,
    categories: &'a BTreeSet<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl<'a> Matcher<'a> {
    fn new(criteria: &'a FeedCriteria) -> Self {
        let lowered = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_lowercase())
        };
        Self {
            text: lowered(&criteria.text_query),
            author: lowered(&criteria.author_substring),
            categories: &criteria.categories,
            from: criteria.date_from.as_deref().and_then(|d| parse_bound(d, false)),
            to: criteria.date_to.as_deref().and_then(|d| parse_bound(d, true)),
        }
    }

    fn matches(&self, post: &Post) -> bool {
        if let Some(text) = &self.text {
            let hit = contains_ci(&post.title, text)
                || contains_ci(&post.body, text)
                || contains_ci(&post.author_display_name, text);
            if !hit {
                return false;
            }
        }

        if !self.categories.is_empty()
            && !post.categories.iter().any(|c| self.categories.contains(c))
        {
            return false;
        }

        if let Some(author) = &self.author {
            if !contains_ci(&post.author_display_name, author) {
                return false;
            }
        }

        match post.created_at.parse() {
            Some(created) => {
                self.from.map_or(true, |from| created >= from)
                    && self.to.map_or(true, |to| created <= to)
            }
            None => true,
        }
    }
}

/// Newest first; unparsable timestamps after every parsable one
fn newest_first(a: &Post, b: &Post) -> Ordering {
    match (a.created_at.parse(), b.created_at.parse()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Filter `posts` by `criteria` and order them by its sort mode
pub fn rank_posts(posts: &[Post], criteria: &FeedCriteria) -> Vec<Post> {
    let matcher = Matcher::new(criteria);
    let mut ranked: Vec<Post> = posts.iter().filter(|p| matcher.matches(p)).cloned().collect();

    match criteria.sort_mode {
        SortMode::Recent => ranked.sort_by(newest_first),
        SortMode::MostLiked => ranked.sort_by(|a, b| {
            b.like_count
                .cmp(&a.like_count)
                .then_with(|| newest_first(a, b))
        }),
        SortMode::MostCommented => ranked.sort_by(|a, b| {
            b.comment_count
                .cmp(&a.comment_count)
                .then_with(|| newest_first(a, b))
        }),
    }

    debug!(
        input = posts.len(),
        output = ranked.len(),
        sort = ?criteria.sort_mode,
        "Feed ranked"
    );
    ranked
}
