//! Integration tests for the scheduler manager
//!
//! These tests verify:
//! - `stop()` waits for an in-flight run and disarms every timer
//! - a failing job does not affect the others
//! - manual runs are serialized with timer-driven runs
//! - the built-in jobs against a real database

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blogd::models::{ArticleStatus, LogLevel, NewArticle};
use blogd::scheduler::{
    jobs::{AUTO_PUBLISH_JOB, BACKUP_ROTATION_JOB, LOG_CLEANUP_JOB},
    JobServices, ScheduledJob, SchedulerError, SchedulerManager, SchedulerResult,
};
use blogd::service::{ArticleService, BackupService, LogService};
use blogd::storage::{ArticleRepository, LogRepository, SqliteStore};
use chrono::Utc;
use serial_test::serial;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Job that takes `work` to finish and records its progress
struct SlowJob {
    work: Duration,
    started: Arc<Notify>,
    in_flight: Arc<AtomicBool>,
    runs_started: Arc<AtomicUsize>,
    runs_finished: Arc<AtomicUsize>,
    overlapped: Arc<AtomicBool>,
}

impl SlowJob {
    fn new(work: Duration) -> Self {
        Self {
            work,
            started: Arc::new(Notify::new()),
            in_flight: Arc::new(AtomicBool::new(false)),
            runs_started: Arc::new(AtomicUsize::new(0)),
            runs_finished: Arc::new(AtomicUsize::new(0)),
            overlapped: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl ScheduledJob for SlowJob {
    fn name(&self) -> &str {
        "slow"
    }

    fn schedule(&self) -> &str {
        "* * * * * *"
    }

    async fn run(&self) -> SchedulerResult<()> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.runs_started.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        tokio::time::sleep(self.work).await;

        self.runs_finished.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingJob {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl ScheduledJob for FailingJob {
    fn name(&self) -> &str {
        "failing"
    }

    fn schedule(&self) -> &str {
        "* * * * * *"
    }

    async fn run(&self) -> SchedulerResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SchedulerError::run_failed("always fails"))
    }
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_stop_waits_for_in_flight_run() {
    let job = SlowJob::new(Duration::from_millis(800));
    let started = job.started.clone();
    let runs_started = job.runs_started.clone();
    let runs_finished = job.runs_finished.clone();

    let manager = SchedulerManager::new().with_job(Arc::new(job)).unwrap();
    manager.start().await.unwrap();

    tokio::time::timeout(Duration::from_secs(3), started.notified())
        .await
        .expect("job should fire within a second");
    assert_eq!(runs_finished.load(Ordering::SeqCst), 0, "run is still in flight");

    manager.stop().await;
    assert_eq!(
        runs_finished.load(Ordering::SeqCst),
        runs_started.load(Ordering::SeqCst),
        "stop returned before the sweep finished"
    );

    // No timer fires after stop
    let settled = runs_started.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(2200)).await;
    assert_eq!(runs_started.load(Ordering::SeqCst), settled);
    assert!(manager.entries().await.iter().all(|e| !e.running && e.next_run.is_none()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_stop_waits_for_manual_run() {
    let job = SlowJob::new(Duration::from_millis(500));
    let started = job.started.clone();
    let runs_started = job.runs_started.clone();
    let runs_finished = job.runs_finished.clone();

    let manager = Arc::new(SchedulerManager::new().with_job(Arc::new(job)).unwrap());

    let manual = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run_now("slow").await })
    };
    tokio::time::timeout(Duration::from_secs(2), started.notified())
        .await
        .expect("manual run should start");

    manager.stop().await;
    assert_eq!(
        runs_finished.load(Ordering::SeqCst),
        1,
        "stop returned while a manual run was in flight"
    );
    manual.await.unwrap().unwrap();

    let err = manager.run_now("slow").await.unwrap_err();
    assert!(matches!(err, SchedulerError::Stopped));
    assert_eq!(runs_started.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_failing_job_does_not_affect_others() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let healthy = SlowJob::new(Duration::from_millis(10));
    let healthy_runs = healthy.runs_finished.clone();

    let manager = SchedulerManager::new()
        .with_job(Arc::new(FailingJob {
            attempts: attempts.clone(),
        }))
        .unwrap()
        .with_job(Arc::new(healthy))
        .unwrap();
    manager.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(2600)).await;
    manager.stop().await;

    assert!(attempts.load(Ordering::SeqCst) >= 2, "failing job keeps its schedule");
    assert!(healthy_runs.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_manual_runs_do_not_overlap_timer_runs() {
    let job = SlowJob::new(Duration::from_millis(300));
    let overlapped = job.overlapped.clone();
    let finished = job.runs_finished.clone();

    let manager = Arc::new(SchedulerManager::new().with_job(Arc::new(job)).unwrap());
    manager.start().await.unwrap();

    let mut manual = Vec::new();
    for _ in 0..4 {
        let manager = manager.clone();
        manual.push(tokio::spawn(async move { manager.run_now("slow").await }));
    }
    for handle in manual {
        handle.await.unwrap().unwrap();
    }
    manager.stop().await;

    assert!(!overlapped.load(Ordering::SeqCst), "two runs of one job overlapped");
    assert!(finished.load(Ordering::SeqCst) >= 4);
}

// ============================================================================
// Built-in jobs
// ============================================================================

fn services(dir: &TempDir) -> (Arc<SqliteStore>, JobServices) {
    let store = Arc::new(SqliteStore::open(dir.path().join("blog.db")).unwrap());
    let services = JobServices {
        articles: ArticleService::new(store.clone()),
        logs: LogService::new(store.clone()),
        backups: BackupService::new(store.clone(), dir.path().join("backups")),
    };
    (store, services)
}

#[tokio::test]
async fn test_builtin_jobs_run_on_demand() {
    let dir = TempDir::new().unwrap();
    let (store, services) = services(&dir);
    let backups = services.backups.clone();

    let due = store
        .create_article(&NewArticle {
            title: "scheduled".to_string(),
            slug: "scheduled".to_string(),
            publish_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .insert_log(LogLevel::Info, "stale", "test", Utc::now() - chrono::Duration::days(365))
        .await
        .unwrap();

    let mut config = common::test_config().scheduler;
    config.log_retention_days = 0; // falls back to the default window
    let manager = SchedulerManager::from_config(&config, services).unwrap();

    manager.run_now(AUTO_PUBLISH_JOB).await.unwrap();
    manager.run_now(LOG_CLEANUP_JOB).await.unwrap();
    manager.run_now(BACKUP_ROTATION_JOB).await.unwrap();

    assert_eq!(
        store.get_article(due.id).await.unwrap().unwrap().status,
        ArticleStatus::Published
    );
    assert_eq!(store.count_logs().await.unwrap(), 0);
    assert_eq!(backups.list_backups().await.unwrap().len(), 1);

    let entries = manager.entries().await;
    assert!(entries.iter().all(|e| e.runs == 1 && !e.running));
}

#[tokio::test]
async fn test_malformed_schedule_is_reported_at_start() {
    let dir = TempDir::new().unwrap();
    let (_store, services) = services(&dir);

    let mut config = common::test_config().scheduler;
    config.backup_schedule = "every night".to_string();
    let manager = SchedulerManager::from_config(&config, services).unwrap();

    let err = manager.start().await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidSchedule { ref job, .. } if job == BACKUP_ROTATION_JOB));
    assert!(manager.is_running(), "valid jobs stay armed");

    manager.stop().await;
    assert!(!manager.is_running());
}
