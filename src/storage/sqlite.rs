//! SQLite implementation of every repository trait
//!
//! One connection guarded by a `Mutex`. Timestamps are stored as RFC 3339
//! strings in UTC with fixed microsecond precision so that lexicographic
//! order equals chronological order.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::repository::{
    ArticleRepository, CrawlTaskFilter, CrawlTaskRepository, CrawlerTokenRepository,
    DatabaseSnapshot, LogRepository, StoreError, StoreResult,
};
use crate::models::{
    Article, ArticleStatus, CrawlTask, CrawlTaskStatus, LogLevel, Metadata, NewArticle,
    NewCrawlTask, SystemLog, Taxonomy,
};

const TASK_COLUMNS: &str = "id, task_id, task_name, status, progress, message, start_time, \
     end_time, duration, created_by_token, metadata, created_at, updated_at, version";

const ARTICLE_COLUMNS: &str =
    "id, title, slug, status, category_id, publish_at, created_at, updated_at";

/// SQLite-backed store for tasks, articles, logs and crawler tokens
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn create_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS crawl_tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id TEXT NOT NULL UNIQUE,
                    task_name TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'running',
                    progress INTEGER NOT NULL DEFAULT 0,
                    message TEXT NOT NULL DEFAULT '',
                    start_time TEXT NOT NULL,
                    end_time TEXT,
                    duration INTEGER,
                    created_by_token TEXT NOT NULL,
                    metadata TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    version INTEGER NOT NULL DEFAULT 1
                );

                CREATE INDEX IF NOT EXISTS idx_crawl_tasks_status
                    ON crawl_tasks(status);

                CREATE INDEX IF NOT EXISTS idx_crawl_tasks_created_at
                    ON crawl_tasks(created_at);

                CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    article_count INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS tags (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    article_count INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS articles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    status TEXT NOT NULL DEFAULT 'draft',
                    category_id INTEGER REFERENCES categories(id),
                    publish_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_articles_status_publish_at
                    ON articles(status, publish_at);

                CREATE TABLE IF NOT EXISTS article_tags (
                    article_id INTEGER NOT NULL REFERENCES articles(id),
                    tag_id INTEGER NOT NULL REFERENCES tags(id),
                    PRIMARY KEY (article_id, tag_id)
                );

                CREATE TABLE IF NOT EXISTS system_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    level TEXT NOT NULL,
                    message TEXT NOT NULL,
                    source TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_system_logs_created_at
                    ON system_logs(created_at);

                CREATE TABLE IF NOT EXISTS crawler_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    token TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL DEFAULT '',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );
                "#,
        )?;

        Ok(())
    }

    fn load_tag_ids(conn: &Connection, article_id: i64) -> StoreResult<Vec<i64>> {
        let mut stmt = conn
            .prepare("SELECT tag_id FROM article_tags WHERE article_id = ?1 ORDER BY tag_id")?;
        let ids = stmt
            .query_map(params![article_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn query_task(conn: &Connection, clause: &str, key: &dyn rusqlite::ToSql) -> StoreResult<Option<CrawlTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM crawl_tasks WHERE {clause}");
        let task = conn
            .query_row(&sql, [key], task_from_row)
            .optional()?;
        Ok(task)
    }
}

// ============================================================================
// Row conversion helpers
// ============================================================================

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, Type::Text, e))
}

fn opt_ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| conversion_error(idx, Type::Text, e)),
        None => Ok(None),
    }
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlTask> {
    let status: String = row.get(3)?;
    let progress: i64 = row.get(4)?;
    let metadata: Option<String> = row.get(10)?;

    Ok(CrawlTask {
        id: row.get(0)?,
        task_id: row.get(1)?,
        task_name: row.get(2)?,
        status: status
            .parse::<CrawlTaskStatus>()
            .map_err(|e| conversion_error(3, Type::Text, e))?,
        progress: u8::try_from(progress).map_err(|e| conversion_error(4, Type::Integer, e))?,
        message: row.get(5)?,
        start_time: ts_at(row, 6)?,
        end_time: opt_ts_at(row, 7)?,
        duration_seconds: row.get(8)?,
        created_by_token: row.get(9)?,
        metadata: metadata
            .map(|raw| serde_json::from_str::<Metadata>(&raw))
            .transpose()
            .map_err(|e| conversion_error(10, Type::Text, e))?,
        created_at: ts_at(row, 11)?,
        updated_at: ts_at(row, 12)?,
        version: row.get(13)?,
    })
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<Article> {
    let status: String = row.get(3)?;
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        status: status
            .parse::<ArticleStatus>()
            .map_err(|e| conversion_error(3, Type::Text, e))?,
        category_id: row.get(4)?,
        tag_ids: Vec::new(),
        publish_at: opt_ts_at(row, 5)?,
        created_at: ts_at(row, 6)?,
        updated_at: ts_at(row, 7)?,
    })
}

fn taxonomy_from_row(row: &Row<'_>) -> rusqlite::Result<Taxonomy> {
    Ok(Taxonomy {
        id: row.get(0)?,
        name: row.get(1)?,
        article_count: row.get(2)?,
    })
}

/// Map a UNIQUE violation to `AlreadyExists`, anything else to `Database`
fn unique_violation(err: rusqlite::Error, key: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::AlreadyExists(key.to_string())
        }
        other => StoreError::Database(other),
    }
}

fn metadata_json(metadata: &Option<Metadata>) -> StoreResult<Option<String>> {
    Ok(metadata.as_ref().map(serde_json::to_string).transpose()?)
}

// ============================================================================
// CrawlTaskRepository
// ============================================================================

#[async_trait]
impl CrawlTaskRepository for SqliteStore {
    async fn create_task(&self, task: &NewCrawlTask) -> StoreResult<CrawlTask> {
        let conn = self.conn()?;
        let now = format_ts(&Utc::now());
        let metadata = metadata_json(&task.metadata)?;

        conn.execute(
            r#"
                INSERT INTO crawl_tasks
                    (task_id, task_name, status, progress, message, start_time,
                     created_by_token, metadata, created_at, updated_at, version)
                VALUES (?1, ?2, 'running', 0, ?3, ?4, ?5, ?6, ?7, ?7, 1)
                "#,
            params![
                task.task_id,
                task.task_name,
                task.message,
                format_ts(&task.start_time),
                task.created_by_token,
                metadata,
                now,
            ],
        )
        .map_err(|e| unique_violation(e, &task.task_id))?;

        let id = conn.last_insert_rowid();
        Self::query_task(&conn, "id = ?1", &id)?
            .ok_or_else(|| StoreError::NotFound(task.task_id.clone()))
    }

    async fn get_task(&self, task_id: &str) -> StoreResult<Option<CrawlTask>> {
        let conn = self.conn()?;
        Self::query_task(&conn, "task_id = ?1", &task_id)
    }

    async fn get_task_by_id(&self, id: i64) -> StoreResult<Option<CrawlTask>> {
        let conn = self.conn()?;
        Self::query_task(&conn, "id = ?1", &id)
    }

    async fn update_task(&self, task: &CrawlTask) -> StoreResult<CrawlTask> {
        let conn = self.conn()?;
        let metadata = metadata_json(&task.metadata)?;

        let changed = conn.execute(
            r#"
                UPDATE crawl_tasks
                SET task_name = ?1, status = ?2, progress = ?3, message = ?4,
                    end_time = ?5, duration = ?6, metadata = ?7, updated_at = ?8,
                    version = version + 1
                WHERE task_id = ?9 AND version = ?10
                "#,
            params![
                task.task_name,
                task.status.as_str(),
                task.progress,
                task.message,
                task.end_time.as_ref().map(format_ts),
                task.duration_seconds,
                metadata,
                format_ts(&Utc::now()),
                task.task_id,
                task.version,
            ],
        )?;

        if changed == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM crawl_tasks WHERE task_id = ?1)",
                params![task.task_id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                StoreError::Conflict(task.task_id.clone())
            } else {
                StoreError::NotFound(task.task_id.clone())
            });
        }

        Self::query_task(&conn, "task_id = ?1", &task.task_id)?
            .ok_or_else(|| StoreError::NotFound(task.task_id.clone()))
    }

    async fn list_tasks(
        &self,
        filter: &CrawlTaskFilter,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<CrawlTask>, u64)> {
        let conn = self.conn()?;

        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<String> = Vec::new();
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            args.push(status.as_str().to_string());
        }
        if let Some(task_id) = &filter.task_id {
            clauses.push("task_id = ?");
            args.push(task_id.clone());
        }
        if let Some(token) = &filter.created_by_token {
            clauses.push("created_by_token = ?");
            args.push(token.clone());
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM crawl_tasks {where_sql}"),
            rusqlite::params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM crawl_tasks {where_sql} \
             ORDER BY created_at DESC, id DESC LIMIT {limit} OFFSET {offset}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((items, total.max(0) as u64))
    }
}

// ============================================================================
// ArticleRepository
// ============================================================================

#[async_trait]
impl ArticleRepository for SqliteStore {
    async fn create_article(&self, article: &NewArticle) -> StoreResult<Article> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = format_ts(&Utc::now());

        tx.execute(
            r#"
                INSERT INTO articles (title, slug, status, category_id, publish_at, created_at, updated_at)
                VALUES (?1, ?2, 'draft', ?3, ?4, ?5, ?5)
                "#,
            params![
                article.title,
                article.slug,
                article.category_id,
                article.publish_at.as_ref().map(format_ts),
                now,
            ],
        )
        .map_err(|e| unique_violation(e, &article.slug))?;
        let id = tx.last_insert_rowid();

        for tag_id in &article.tag_ids {
            tx.execute(
                "INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?1, ?2)",
                params![id, tag_id],
            )?;
        }

        let mut stored = tx.query_row(
            &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
            params![id],
            article_from_row,
        )?;
        stored.tag_ids = Self::load_tag_ids(&tx, id)?;
        tx.commit()?;

        Ok(stored)
    }

    async fn get_article(&self, id: i64) -> StoreResult<Option<Article>> {
        let conn = self.conn()?;
        let article = conn
            .query_row(
                &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
                params![id],
                article_from_row,
            )
            .optional()?;

        match article {
            Some(mut article) => {
                article.tag_ids = Self::load_tag_ids(&conn, id)?;
                Ok(Some(article))
            }
            None => Ok(None),
        }
    }

    async fn pending_publish(&self, now: DateTime<Utc>) -> StoreResult<Vec<Article>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE status = 'draft' AND publish_at IS NOT NULL AND publish_at <= ?1 \
             ORDER BY publish_at ASC, id ASC"
        ))?;
        let mut articles = stmt
            .query_map(params![format_ts(&now)], article_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for article in &mut articles {
            article.tag_ids = Self::load_tag_ids(&conn, article.id)?;
        }
        Ok(articles)
    }

    async fn publish_article(&self, id: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = format_ts(&now);

        let changed = tx.execute(
            r#"
                UPDATE articles
                SET status = 'published', publish_at = COALESCE(publish_at, ?1), updated_at = ?1
                WHERE id = ?2 AND status = 'draft'
                "#,
            params![now, id],
        )?;

        if changed == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM articles WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(StoreError::NotFound(format!("article {id}")));
            }
            return Ok(false);
        }

        tx.execute(
            r#"
                UPDATE categories SET article_count = article_count + 1
                WHERE id = (SELECT category_id FROM articles WHERE id = ?1)
                "#,
            params![id],
        )?;
        tx.execute(
            r#"
                UPDATE tags SET article_count = article_count + 1
                WHERE id IN (SELECT tag_id FROM article_tags WHERE article_id = ?1)
                "#,
            params![id],
        )?;
        tx.commit()?;

        Ok(true)
    }

    async fn create_category(&self, name: &str) -> StoreResult<Taxonomy> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name])
            .map_err(|e| unique_violation(e, name))?;
        Ok(Taxonomy {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            article_count: 0,
        })
    }

    async fn create_tag(&self, name: &str) -> StoreResult<Taxonomy> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])
            .map_err(|e| unique_violation(e, name))?;
        Ok(Taxonomy {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            article_count: 0,
        })
    }

    async fn get_category(&self, id: i64) -> StoreResult<Option<Taxonomy>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, article_count FROM categories WHERE id = ?1",
                params![id],
                taxonomy_from_row,
            )
            .optional()?)
    }

    async fn get_tag(&self, id: i64) -> StoreResult<Option<Taxonomy>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, article_count FROM tags WHERE id = ?1",
                params![id],
                taxonomy_from_row,
            )
            .optional()?)
    }
}

// ============================================================================
// LogRepository
// ============================================================================

#[async_trait]
impl LogRepository for SqliteStore {
    async fn insert_log(
        &self,
        level: LogLevel,
        message: &str,
        source: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<SystemLog> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO system_logs (level, message, source, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![level.as_str(), message, source, format_ts(&created_at)],
        )?;

        Ok(SystemLog {
            id: conn.last_insert_rowid(),
            level,
            message: message.to_string(),
            source: source.to_string(),
            created_at,
        })
    }

    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM system_logs WHERE created_at < ?1",
            params![format_ts(&cutoff)],
        )?;
        Ok(deleted as u64)
    }

    async fn count_logs(&self) -> StoreResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM system_logs", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

// ============================================================================
// CrawlerTokenRepository
// ============================================================================

#[async_trait]
impl CrawlerTokenRepository for SqliteStore {
    async fn add_crawler_token(&self, token: &str, name: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO crawler_tokens (token, name, is_active, created_at)
                VALUES (?1, ?2, 1, ?3)
                ON CONFLICT(token) DO UPDATE SET is_active = 1, name = excluded.name
                "#,
            params![token, name, format_ts(&Utc::now())],
        )?;
        Ok(())
    }

    async fn is_active_crawler_token(&self, token: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let active: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM crawler_tokens WHERE token = ?1 AND is_active = 1)",
            params![token],
            |row| row.get(0),
        )?;
        Ok(active)
    }

    async fn deactivate_crawler_token(&self, token: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE crawler_tokens SET is_active = 0 WHERE token = ?1",
            params![token],
        )?;
        Ok(changed > 0)
    }
}

// ============================================================================
// DatabaseSnapshot
// ============================================================================

#[async_trait]
impl DatabaseSnapshot for SqliteStore {
    async fn snapshot_to(&self, dest: &Path) -> StoreResult<()> {
        let conn = self.conn()?;
        let dest = dest.to_string_lossy().into_owned();
        conn.execute("VACUUM INTO ?1", params![dest])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_publish_is_conditional_and_bumps_counters() {
        let store = SqliteStore::open_in_memory().unwrap();
        let category = store.create_category("rust").await.unwrap();
        let tag_a = store.create_tag("async").await.unwrap();
        let tag_b = store.create_tag("tokio").await.unwrap();

        let article = store
            .create_article(&NewArticle {
                title: "Hello".to_string(),
                slug: "hello".to_string(),
                category_id: Some(category.id),
                tag_ids: vec![tag_a.id, tag_b.id],
                publish_at: None,
            })
            .await
            .unwrap();
        assert_eq!(article.status, ArticleStatus::Draft);
        assert_eq!(article.tag_ids, vec![tag_a.id, tag_b.id]);

        let now = Utc::now();
        assert!(store.publish_article(article.id, now).await.unwrap());
        // Second attempt is a no-op
        assert!(!store.publish_article(article.id, now).await.unwrap());

        let published = store.get_article(article.id).await.unwrap().unwrap();
        assert_eq!(published.status, ArticleStatus::Published);
        assert!(published.publish_at.is_some());

        assert_eq!(store.get_category(category.id).await.unwrap().unwrap().article_count, 1);
        assert_eq!(store.get_tag(tag_a.id).await.unwrap().unwrap().article_count, 1);
        assert_eq!(store.get_tag(tag_b.id).await.unwrap().unwrap().article_count, 1);
    }

    #[tokio::test]
    async fn test_publish_unknown_article() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.publish_article(42, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_pending_publish_selects_due_drafts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        for (slug, publish_at) in [
            ("past", Some(now - Duration::minutes(5))),
            ("future", Some(now + Duration::hours(1))),
            ("unscheduled", None),
        ] {
            store
                .create_article(&NewArticle {
                    title: slug.to_string(),
                    slug: slug.to_string(),
                    publish_at,
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let pending = store.pending_publish(now).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].slug, "past");
    }

    #[tokio::test]
    async fn test_logs_delete_before_cutoff() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        store
            .insert_log(LogLevel::Info, "old", "test", now - Duration::days(100))
            .await
            .unwrap();
        store
            .insert_log(LogLevel::Warn, "recent", "test", now - Duration::days(1))
            .await
            .unwrap();

        let deleted = store
            .delete_logs_before(now - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_logs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_crawler_tokens() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(!store.is_active_crawler_token("tok").await.unwrap());

        store.add_crawler_token("tok", "sdk").await.unwrap();
        assert!(store.is_active_crawler_token("tok").await.unwrap());

        assert!(store.deactivate_crawler_token("tok").await.unwrap());
        assert!(!store.is_active_crawler_token("tok").await.unwrap());

        // Re-adding reactivates
        store.add_crawler_token("tok", "sdk").await.unwrap();
        assert!(store.is_active_crawler_token("tok").await.unwrap());

        assert!(!store.deactivate_crawler_token("unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("blog.db")).unwrap();
        store.add_crawler_token("tok", "sdk").await.unwrap();

        let dest = dir.path().join("snapshot.db");
        store.snapshot_to(&dest).await.unwrap();

        let copy = SqliteStore::open(&dest).unwrap();
        assert!(copy.is_active_crawler_token("tok").await.unwrap());
    }
}
