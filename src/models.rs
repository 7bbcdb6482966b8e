// Core data structures for blogd

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Opaque, order-preserving metadata document attached to a crawl task
pub type Metadata = Map<String, Value>;

// ============================================================================
// Crawl Tasks
// ============================================================================

/// Lifecycle state of a crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlTaskStatus {
    /// Registered and in progress (initial)
    Running,
    /// Finished successfully (terminal)
    Completed,
    /// Finished with an error (terminal)
    Failed,
}

impl CrawlTaskStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// No transition is permitted out of a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Get all statuses
    pub fn all() -> [Self; 3] {
        [Self::Running, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for CrawlTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for CrawlTaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A unit of crawling work tracked by the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlTask {
    /// Storage-assigned primary key
    pub id: i64,

    /// Caller-chosen identifier, unique and immutable
    pub task_id: String,

    pub task_name: String,

    pub status: CrawlTaskStatus,

    /// Always within 0..=100
    pub progress: u8,

    pub message: String,

    pub start_time: DateTime<Utc>,

    /// Set together with `duration_seconds` by the terminal transition
    pub end_time: Option<DateTime<Utc>>,

    #[serde(rename = "duration")]
    pub duration_seconds: Option<i64>,

    /// Bearer token that registered the task; never sent to API consumers
    #[serde(skip_serializing, default)]
    pub created_by_token: String,

    pub metadata: Option<Metadata>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency version, bumped by every store update
    #[serde(skip)]
    pub version: i64,
}

impl CrawlTask {
    /// Stamp `end_time` and `duration_seconds` for a terminal transition
    pub(crate) fn stamp_end(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        self.duration_seconds = Some((now - self.start_time).num_seconds().max(0));
    }
}

/// Fields supplied when a crawler registers a task
#[derive(Debug, Clone)]
pub struct NewCrawlTask {
    pub task_id: String,
    pub task_name: String,
    pub message: String,
    pub start_time: DateTime<Utc>,
    pub created_by_token: String,
    pub metadata: Option<Metadata>,
}

// ============================================================================
// Articles
// ============================================================================

/// Publication state of an article
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Draft,
    Published,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl FromStr for ArticleStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Blog article, as far as scheduled publishing is concerned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub status: ArticleStatus,
    pub category_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    /// Scheduled (or actual) publish time
    pub publish_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting an article
#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub title: String,
    pub slug: String,
    pub category_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub publish_at: Option<DateTime<Utc>>,
}

/// Category or tag with its denormalized published-article counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub id: i64,
    pub name: String,
    pub article_count: i64,
}

// ============================================================================
// System Logs
// ============================================================================

/// Severity of a persisted system log row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Persisted system log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLog {
    pub id: i64,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Backups
// ============================================================================

/// A backup artifact on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub filename: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_task() -> CrawlTask {
        let now = Utc::now();
        CrawlTask {
            id: 1,
            task_id: "t1".to_string(),
            task_name: "sample".to_string(),
            status: CrawlTaskStatus::Running,
            progress: 0,
            message: String::new(),
            start_time: now,
            end_time: None,
            duration_seconds: None,
            created_by_token: "secret-token".to_string(),
            metadata: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn test_status_roundtrip_strings() {
        for status in CrawlTaskStatus::all() {
            assert_eq!(status.as_str().parse::<CrawlTaskStatus>().unwrap(), status);
        }
        assert!("paused".parse::<CrawlTaskStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CrawlTaskStatus::Running.is_terminal());
        assert!(CrawlTaskStatus::Completed.is_terminal());
        assert!(CrawlTaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_task_serialization_hides_token() {
        let task = sample_task();
        let json = serde_json::to_value(&task).unwrap();

        assert!(json.get("created_by_token").is_none());
        assert!(json.get("version").is_none());
        assert_eq!(json["status"], "running");
        assert!(json["duration"].is_null());
    }

    #[test]
    fn test_stamp_end_computes_duration() {
        let mut task = sample_task();
        task.start_time = Utc::now() - Duration::seconds(42);
        let now = Utc::now();

        task.stamp_end(now);

        assert_eq!(task.end_time, Some(now));
        assert!(task.duration_seconds.unwrap() >= 42);
    }
}
