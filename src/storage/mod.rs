//! Persistence for crawl tasks, articles, system logs and crawler tokens
//!
//! Everything goes through the repository traits in [`repository`]; the
//! production implementation is [`SqliteStore`].

pub mod repository;
pub mod sqlite;

use std::sync::Arc;

pub use repository::{
    create_memory_repository, ArticleRepository, CrawlTaskFilter, CrawlTaskRepository,
    CrawlerTokenRepository, DatabaseSnapshot, LogRepository, MemoryCrawlTaskRepository,
    SharedCrawlTaskRepository, StoreError, StoreResult,
};
pub use sqlite::SqliteStore;

/// Open the SQLite store at `path`, shared across the application
pub fn open_shared(path: impl AsRef<std::path::Path>) -> StoreResult<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::open(path)?))
}
