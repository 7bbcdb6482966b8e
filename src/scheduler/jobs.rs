//! The three built-in jobs

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::error::SchedulerResult;
use super::manager::SchedulerManager;
use super::ScheduledJob;
use crate::config::SchedulerConfig;
use crate::service::{ArticleService, BackupService, LogService};

pub const AUTO_PUBLISH_JOB: &str = "auto_publish";
pub const LOG_CLEANUP_JOB: &str = "log_cleanup";
pub const BACKUP_ROTATION_JOB: &str = "backup_rotation";

/// Publishes drafts whose scheduled time has passed
pub struct AutoPublishJob {
    articles: ArticleService,
    schedule: String,
}

impl AutoPublishJob {
    pub fn new(articles: ArticleService, schedule: impl Into<String>) -> Self {
        Self {
            articles,
            schedule: schedule.into(),
        }
    }
}

#[async_trait]
impl ScheduledJob for AutoPublishJob {
    fn name(&self) -> &str {
        AUTO_PUBLISH_JOB
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    async fn run(&self) -> SchedulerResult<()> {
        // Per-article failures are counted in the report, not propagated
        self.articles.process_scheduled_publish().await?;
        Ok(())
    }
}

/// Deletes system logs older than the retention window
pub struct LogCleanupJob {
    logs: LogService,
    schedule: String,
    retention_days: i64,
}

impl LogCleanupJob {
    pub fn new(logs: LogService, schedule: impl Into<String>, retention_days: i64) -> Self {
        Self {
            logs,
            schedule: schedule.into(),
            retention_days,
        }
    }
}

#[async_trait]
impl ScheduledJob for LogCleanupJob {
    fn name(&self) -> &str {
        LOG_CLEANUP_JOB
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    async fn run(&self) -> SchedulerResult<()> {
        self.logs.cleanup_old_logs(self.retention_days).await?;
        Ok(())
    }
}

/// Creates a backup then prunes all but the newest `retention_count`
pub struct BackupRotationJob {
    backups: BackupService,
    schedule: String,
    retention_count: usize,
}

impl BackupRotationJob {
    pub fn new(backups: BackupService, schedule: impl Into<String>, retention_count: usize) -> Self {
        Self {
            backups,
            schedule: schedule.into(),
            retention_count,
        }
    }
}

#[async_trait]
impl ScheduledJob for BackupRotationJob {
    fn name(&self) -> &str {
        BACKUP_ROTATION_JOB
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    async fn run(&self) -> SchedulerResult<()> {
        let backup = self.backups.create_backup().await?;
        info!(backup = %backup.filename, size = backup.size, "Scheduled backup written");

        self.backups.cleanup_old_backups(self.retention_count).await?;
        Ok(())
    }
}

/// Services the built-in jobs call into
#[derive(Clone)]
pub struct JobServices {
    pub articles: ArticleService,
    pub logs: LogService,
    pub backups: BackupService,
}

impl SchedulerManager {
    /// Manager with the three built-in jobs, parameterized from config
    pub fn from_config(config: &SchedulerConfig, services: JobServices) -> SchedulerResult<Self> {
        SchedulerManager::new()
            .with_job(Arc::new(AutoPublishJob::new(
                services.articles,
                config.auto_publish_schedule.clone(),
            )))?
            .with_job(Arc::new(LogCleanupJob::new(
                services.logs,
                config.log_cleanup_schedule.clone(),
                config.effective_log_retention_days(),
            )))?
            .with_job(Arc::new(BackupRotationJob::new(
                services.backups,
                config.backup_schedule.clone(),
                config.effective_backup_retention_count(),
            )))
    }
}
