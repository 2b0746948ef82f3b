use crate::error::{SocialError, SocialResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Deserialize `null` as the type's default; hosted rows often carry nulls
/// in text and counter columns.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Creation time as received from the store.
///
/// Kept raw and parsed on demand: one malformed record must not fail the
/// decoding of a whole result set, and filters treat unparsable values as
/// "unknown" rather than as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<Value>", into = "String")]
pub struct Timestamp(String);

impl Timestamp {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn now() -> Self {
        Utc::now().into()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Option<DateTime<Utc>> {
        parse_instant(&self.0)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.to_rfc3339())
    }
}

impl From<Option<Value>> for Timestamp {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(Value::String(raw)) => Self(raw),
            // Unix seconds
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(Timestamp::from)
                .unwrap_or_else(|| Self(n.to_string())),
            _ => Self::default(),
        }
    }
}

impl From<Timestamp> for String {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Parse RFC 3339, a naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` (read as UTC) or a bare date.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|n| Utc.from_utc_datetime(&n))
}

/// Parse an inclusive range bound. A bare date used as an upper bound
/// covers the whole day.
pub fn parse_bound(raw: &str, upper: bool) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if upper {
        if let Some(date) = parse_date(trimmed) {
            return date
                .and_hms_nano_opt(23, 59, 59, 999_999_999)
                .map(|n| Utc.from_utc_datetime(&n));
        }
    }
    parse_instant(trimmed)
}

/// The signed-in user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl CurrentUser {
    pub fn new(id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_admin: false,
        }
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// Post entity - like_count and comment_count are caches of the edge counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub caption: String,
    #[serde(default, deserialize_with = "nullable")]
    pub body: String,
    pub author_id: Uuid,
    #[serde(default, deserialize_with = "nullable")]
    pub author_display_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default, deserialize_with = "nullable")]
    pub like_count: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub comment_count: i64,
}

/// Comment entity - parent_id = None means top-level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    #[serde(default, deserialize_with = "nullable")]
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default, deserialize_with = "nullable")]
    pub like_count: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub edited: bool,
    /// Local only: created optimistically, not yet confirmed by the store
    #[serde(skip)]
    pub pending: bool,
}

/// Input for publishing a post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl PostDraft {
    /// Trim fields and deduplicate categories, keeping first-seen order.
    pub fn normalize(self, max_categories: usize) -> SocialResult<PostDraft> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(SocialError::Validation("title must not be empty".into()));
        }

        let mut categories: Vec<String> = Vec::with_capacity(self.categories.len());
        for category in self.categories {
            let category = category.trim();
            if !category.is_empty() && !categories.iter().any(|c| c == category) {
                categories.push(category.to_string());
            }
        }
        if categories.len() > max_categories {
            return Err(SocialError::Validation(format!(
                "a post can have at most {} categories, got {}",
                max_categories,
                categories.len()
            )));
        }

        Ok(PostDraft {
            title,
            caption: self.caption.trim().to_string(),
            body: self.body,
            categories,
        })
    }
}
