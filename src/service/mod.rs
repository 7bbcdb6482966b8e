//! Services driven by the scheduled jobs
//!
//! - [`ArticleService`]: draft → published transition and the auto-publish sweep
//! - [`LogService`]: system log recording and retention cleanup
//! - [`BackupService`]: gzip-compressed database snapshots and rotation

pub mod article;
pub mod backup;
pub mod log;

use thiserror::Error;

use crate::storage::StoreError;

pub use article::{ArticleService, PublishReport};
pub use backup::BackupService;
pub use log::{CleanupReport, LogService};

/// Errors from the article, log and backup services
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Publish was requested for an article that is no longer a draft
    #[error("article {0} is already published")]
    AlreadyPublished(i64),

    #[error("not found: {0}")]
    NotFound(String),

    /// Backup file names must be plain `backup_*.db.gz` names
    #[error("invalid backup name: {0}")]
    InvalidName(String),

    /// Retention window too large to compute a cutoff
    #[error("retention of {0} days is out of range")]
    RetentionOutOfRange(i64),

    #[error("storage error: {0}")]
    Store(#[source] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Store(other),
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
