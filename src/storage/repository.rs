//! Repository traits for database abstraction
//!
//! Business logic talks to storage only through these traits, so the
//! coordination service and the scheduled jobs can run against SQLite in
//! production and against the in-memory implementation in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Business Logic                          │
//! │        (CrawlService, ArticleService, LogService)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Repository Traits                         │
//! │  CrawlTaskRepository, ArticleRepository, LogRepository ...  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!      ┌─────────────────┐           ┌─────────────────┐
//!      │   SqliteStore   │           │  Memory (tests) │
//!      └─────────────────┘           └─────────────────┘
//! ```
//!
//! # Concurrency
//!
//! Crawl task rows carry a `version`. [`CrawlTaskRepository::update_task`]
//! only writes when the caller's copy has the stored version and fails with
//! [`StoreError::Conflict`] otherwise, so a read-modify-write sequence is
//! atomic per task row once the caller retries on conflict.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Article, CrawlTask, CrawlTaskStatus, LogLevel, NewArticle, NewCrawlTask, SystemLog, Taxonomy,
};

// ============================================================================
// Errors
// ============================================================================

/// Storage-layer errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("record not found: {0}")]
    NotFound(String),

    /// Optimistic version check failed; the row was modified concurrently
    #[error("concurrent modification of {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Conflicts resolve by reloading and retrying
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Core Types
// ============================================================================

/// Filter for crawl task listings; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlTaskFilter {
    pub status: Option<CrawlTaskStatus>,
    pub task_id: Option<String>,
    pub created_by_token: Option<String>,
}

impl CrawlTaskFilter {
    pub fn matches(&self, task: &CrawlTask) -> bool {
        self.status.map_or(true, |s| s == task.status)
            && self.task_id.as_deref().map_or(true, |id| id == task.task_id)
            && self
                .created_by_token
                .as_deref()
                .map_or(true, |t| t == task.created_by_token)
    }
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Durable record of crawl tasks keyed by caller-chosen identifier
#[async_trait]
pub trait CrawlTaskRepository: Send + Sync {
    /// Insert a new running task; fails with `AlreadyExists` on a duplicate identifier
    async fn create_task(&self, task: &NewCrawlTask) -> StoreResult<CrawlTask>;

    /// Look up by caller-chosen identifier
    async fn get_task(&self, task_id: &str) -> StoreResult<Option<CrawlTask>>;

    /// Look up by storage primary key
    async fn get_task_by_id(&self, id: i64) -> StoreResult<Option<CrawlTask>>;

    /// Persist a mutated task if its `version` is still current.
    ///
    /// Returns the stored row with the bumped version and fresh `updated_at`.
    async fn update_task(&self, task: &CrawlTask) -> StoreResult<CrawlTask>;

    /// Filtered listing ordered newest first, returning `(items, total)`
    async fn list_tasks(
        &self,
        filter: &CrawlTaskFilter,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<CrawlTask>, u64)>;
}

/// Article persistence as needed by scheduled publishing
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    async fn create_article(&self, article: &NewArticle) -> StoreResult<Article>;

    async fn get_article(&self, id: i64) -> StoreResult<Option<Article>>;

    /// Drafts whose `publish_at` is at or before `now`, oldest first
    async fn pending_publish(&self, now: DateTime<Utc>) -> StoreResult<Vec<Article>>;

    /// Conditionally move a draft to published in one transaction.
    ///
    /// Returns `false` without touching anything when the article is not a
    /// draft. Category and tag counters are bumped only on a real transition.
    async fn publish_article(&self, id: i64, now: DateTime<Utc>) -> StoreResult<bool>;

    async fn create_category(&self, name: &str) -> StoreResult<Taxonomy>;

    async fn create_tag(&self, name: &str) -> StoreResult<Taxonomy>;

    async fn get_category(&self, id: i64) -> StoreResult<Option<Taxonomy>>;

    async fn get_tag(&self, id: i64) -> StoreResult<Option<Taxonomy>>;
}

/// Persisted system log rows
#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn insert_log(
        &self,
        level: LogLevel,
        message: &str,
        source: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<SystemLog>;

    /// Delete rows created strictly before `cutoff`, returning the count
    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    async fn count_logs(&self) -> StoreResult<u64>;
}

/// Long-lived bearer tokens issued to crawler integrations
#[async_trait]
pub trait CrawlerTokenRepository: Send + Sync {
    /// Insert or reactivate a token
    async fn add_crawler_token(&self, token: &str, name: &str) -> StoreResult<()>;

    async fn is_active_crawler_token(&self, token: &str) -> StoreResult<bool>;

    /// Returns `false` if the token was unknown
    async fn deactivate_crawler_token(&self, token: &str) -> StoreResult<bool>;
}

/// Consistent point-in-time copy of the whole database
#[async_trait]
pub trait DatabaseSnapshot: Send + Sync {
    /// Write an uncompressed snapshot to `dest`, which must not exist yet
    async fn snapshot_to(&self, dest: &Path) -> StoreResult<()>;
}

// ============================================================================
// In-Memory Implementation (for testing)
// ============================================================================

/// In-memory crawl task repository
///
/// Implements the same version semantics as the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryCrawlTaskRepository {
    tasks: RwLock<HashMap<String, CrawlTask>>,
    next_id: RwLock<i64>,
}

impl MemoryCrawlTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CrawlTaskRepository for MemoryCrawlTaskRepository {
    async fn create_task(&self, task: &NewCrawlTask) -> StoreResult<CrawlTask> {
        let mut tasks = self.tasks.write().map_err(|_| StoreError::LockPoisoned)?;
        if tasks.contains_key(&task.task_id) {
            return Err(StoreError::AlreadyExists(task.task_id.clone()));
        }

        let mut next_id = self.next_id.write().map_err(|_| StoreError::LockPoisoned)?;
        *next_id += 1;

        let now = Utc::now();
        let stored = CrawlTask {
            id: *next_id,
            task_id: task.task_id.clone(),
            task_name: task.task_name.clone(),
            status: CrawlTaskStatus::Running,
            progress: 0,
            message: task.message.clone(),
            start_time: task.start_time,
            end_time: None,
            duration_seconds: None,
            created_by_token: task.created_by_token.clone(),
            metadata: task.metadata.clone(),
            created_at: now,
            updated_at: now,
            version: 1,
        };
        tasks.insert(stored.task_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_task(&self, task_id: &str) -> StoreResult<Option<CrawlTask>> {
        let tasks = self.tasks.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tasks.get(task_id).cloned())
    }

    async fn get_task_by_id(&self, id: i64) -> StoreResult<Option<CrawlTask>> {
        let tasks = self.tasks.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tasks.values().find(|t| t.id == id).cloned())
    }

    async fn update_task(&self, task: &CrawlTask) -> StoreResult<CrawlTask> {
        let mut tasks = self.tasks.write().map_err(|_| StoreError::LockPoisoned)?;
        let current = tasks
            .get_mut(&task.task_id)
            .ok_or_else(|| StoreError::NotFound(task.task_id.clone()))?;

        if current.version != task.version {
            return Err(StoreError::Conflict(task.task_id.clone()));
        }

        let mut updated = task.clone();
        updated.version += 1;
        updated.updated_at = Utc::now();
        *current = updated.clone();
        Ok(updated)
    }

    async fn list_tasks(
        &self,
        filter: &CrawlTaskFilter,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<CrawlTask>, u64)> {
        let tasks = self.tasks.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut matched: Vec<CrawlTask> =
            tasks.values().filter(|t| filter.matches(t)).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((items, total))
    }
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared task repository
pub type SharedCrawlTaskRepository = Arc<dyn CrawlTaskRepository>;

/// Create a shared in-memory repository
pub fn create_memory_repository() -> SharedCrawlTaskRepository {
    Arc::new(MemoryCrawlTaskRepository::new())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use serde_json::json;

    fn create_test_repos() -> Vec<Box<dyn CrawlTaskRepository>> {
        vec![
            Box::new(SqliteStore::open_in_memory().unwrap()),
            Box::new(MemoryCrawlTaskRepository::new()),
        ]
    }

    fn new_task(task_id: &str, token: &str) -> NewCrawlTask {
        NewCrawlTask {
            task_id: task_id.to_string(),
            task_name: format!("crawl {task_id}"),
            message: "task registered".to_string(),
            start_time: Utc::now(),
            created_by_token: token.to_string(),
            metadata: json!({"source": "x"}).as_object().cloned(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        for repo in create_test_repos() {
            let created = repo.create_task(&new_task("t1", "tok")).await.unwrap();
            assert_eq!(created.status, CrawlTaskStatus::Running);
            assert_eq!(created.progress, 0);
            assert_eq!(created.version, 1);

            let by_key = repo.get_task("t1").await.unwrap().unwrap();
            assert_eq!(by_key.id, created.id);
            assert_eq!(by_key.created_by_token, "tok");
            assert_eq!(by_key.metadata.unwrap()["source"], "x");

            let by_id = repo.get_task_by_id(created.id).await.unwrap().unwrap();
            assert_eq!(by_id.task_id, "t1");

            assert!(repo.get_task("missing").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_duplicate_identifier_rejected() {
        for repo in create_test_repos() {
            repo.create_task(&new_task("dup", "tok")).await.unwrap();
            let err = repo.create_task(&new_task("dup", "other")).await.unwrap_err();
            assert!(matches!(err, StoreError::AlreadyExists(_)));
        }
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_detects_conflict() {
        for repo in create_test_repos() {
            let task = repo.create_task(&new_task("t1", "tok")).await.unwrap();

            let mut first = task.clone();
            first.progress = 40;
            let stored = repo.update_task(&first).await.unwrap();
            assert_eq!(stored.version, 2);
            assert_eq!(stored.progress, 40);

            // Stale copy still at version 1
            let mut stale = task.clone();
            stale.progress = 90;
            let err = repo.update_task(&stale).await.unwrap_err();
            assert!(err.is_conflict());

            let current = repo.get_task("t1").await.unwrap().unwrap();
            assert_eq!(current.progress, 40);
        }
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        for repo in create_test_repos() {
            for i in 0..5 {
                repo.create_task(&new_task(&format!("t{i}"), "tok")).await.unwrap();
            }
            let mut done = repo.get_task("t2").await.unwrap().unwrap();
            done.status = CrawlTaskStatus::Completed;
            repo.update_task(&done).await.unwrap();

            let (all, total) = repo
                .list_tasks(&CrawlTaskFilter::default(), 0, 2)
                .await
                .unwrap();
            assert_eq!(total, 5);
            assert_eq!(all.len(), 2);

            let completed = CrawlTaskFilter {
                status: Some(CrawlTaskStatus::Completed),
                ..Default::default()
            };
            let (items, total) = repo.list_tasks(&completed, 0, 20).await.unwrap();
            assert_eq!(total, 1);
            assert_eq!(items[0].task_id, "t2");

            let by_key = CrawlTaskFilter {
                task_id: Some("t4".to_string()),
                ..Default::default()
            };
            let (items, _) = repo.list_tasks(&by_key, 0, 20).await.unwrap();
            assert_eq!(items.len(), 1);
        }
    }

    #[test]
    fn test_memory_repository_utilities() {
        let repo = MemoryCrawlTaskRepository::new();
        assert!(repo.is_empty());
        assert_eq!(repo.len(), 0);
    }
}
