//! Periodic background jobs
//!
//! The [`SchedulerManager`] owns a set of [`ScheduledJob`]s, each on its own
//! cron timer. Jobs share the process and the database with the HTTP server
//! but never share in-memory state with it; every write a job makes is a
//! single atomic store operation.
//!
//! # Jobs
//!
//! | Job | Default schedule | Work |
//! |---|---|---|
//! | [`AutoPublishJob`] | every minute | publish drafts whose `publish_at` has passed |
//! | [`LogCleanupJob`] | daily 02:00 | delete system logs past retention |
//! | [`BackupRotationJob`] | daily 03:00 | snapshot the database, keep the newest N |
//!
//! Schedules are cron expressions with an optional leading seconds field,
//! evaluated in local time.
//!
//! # Shutdown
//!
//! ```ignore
//! let scheduler = Arc::new(SchedulerManager::from_config(&config.scheduler, services)?);
//! scheduler.start().await?;
//! // ... serve ...
//! scheduler.stop().await; // waits for in-flight runs
//! ```

pub mod error;
pub mod jobs;
pub mod manager;

use async_trait::async_trait;

pub use error::{SchedulerError, SchedulerResult};
pub use jobs::{AutoPublishJob, BackupRotationJob, JobServices, LogCleanupJob};
pub use manager::{JobEntry, SchedulerManager};

/// A named unit of periodic work
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    /// Unique job name, used in logs, metrics and `run_now`
    fn name(&self) -> &str;

    /// Cron expression (5 or 6 fields)
    fn schedule(&self) -> &str;

    /// One sweep. Should finish its current unit of work promptly; it is not
    /// interrupted by shutdown.
    async fn run(&self) -> SchedulerResult<()>;
}
