/// Configuration management for the social client
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Feed paging settings
    pub paging: PagingConfig,
    /// Remote store settings
    pub remote: RemoteConfig,
    /// Table names in the hosted store
    pub tables: TableConfig,
    /// Post authoring limits
    pub posts: PostConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Reveal-window sizes for infinite scroll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    #[serde(default = "default_feed_page_size")]
    pub feed_page_size: usize,
    #[serde(default = "default_explore_page_size")]
    pub explore_page_size: usize,
}

/// Remote store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Deadline applied to every store call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Table names; the legacy array columns live on `users`, `posts` and `comments`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub posts: String,
    pub comments: String,
    pub users: String,
    pub likes: String,
    pub follows: String,
    pub comment_likes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostConfig {
    #[serde(default = "default_max_categories")]
    pub max_categories: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// EnvFilter directive used when RUST_LOG is not set
    pub filter: String,
}

// Default values
fn default_feed_page_size() -> usize {
    6
}

fn default_explore_page_size() -> usize {
    8
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_categories() -> usize {
    3
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            feed_page_size: default_feed_page_size(),
            explore_page_size: default_explore_page_size(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            posts: "posts".to_string(),
            comments: "comments".to_string(),
            users: "users".to_string(),
            likes: "likes".to_string(),
            follows: "follows".to_string(),
            comment_likes: "comment_likes".to_string(),
        }
    }
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            max_categories: default_max_categories(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "social_sync=info,remote_store=info".to_string(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn string_var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let paging = PagingConfig {
            feed_page_size: parse_var("SOCIAL_FEED_PAGE_SIZE", default_feed_page_size())?,
            explore_page_size: parse_var(
                "SOCIAL_EXPLORE_PAGE_SIZE",
                default_explore_page_size(),
            )?,
        };
        if paging.feed_page_size == 0 || paging.explore_page_size == 0 {
            anyhow::bail!("page sizes must be greater than zero");
        }

        let remote = RemoteConfig {
            timeout_ms: parse_var("SOCIAL_REMOTE_TIMEOUT_MS", default_timeout_ms())?,
        };

        let defaults = TableConfig::default();
        let tables = TableConfig {
            posts: string_var("SOCIAL_TABLE_POSTS", &defaults.posts),
            comments: string_var("SOCIAL_TABLE_COMMENTS", &defaults.comments),
            users: string_var("SOCIAL_TABLE_USERS", &defaults.users),
            likes: string_var("SOCIAL_TABLE_LIKES", &defaults.likes),
            follows: string_var("SOCIAL_TABLE_FOLLOWS", &defaults.follows),
            comment_likes: string_var("SOCIAL_TABLE_COMMENT_LIKES", &defaults.comment_likes),
        };

        let posts = PostConfig {
            max_categories: parse_var("SOCIAL_MAX_CATEGORIES", default_max_categories())?,
        };

        let format = match std::env::var("SOCIAL_LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "" | "pretty" => LogFormat::Pretty,
            other => anyhow::bail!("SOCIAL_LOG_FORMAT must be pretty or json, got {:?}", other),
        };
        let logging = LoggingConfig {
            format,
            filter: string_var("SOCIAL_LOG_FILTER", &LoggingConfig::default().filter),
        };

        Ok(Config {
            paging,
            remote,
            tables,
            posts,
            logging,
        })
    }
}
