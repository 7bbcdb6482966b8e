//! Scheduler manager: owns the job timer loops and their shutdown

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use croner::Cron;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{SchedulerError, SchedulerResult};
use super::ScheduledJob;

/// Snapshot of one registered job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEntry {
    pub name: String,
    pub schedule: String,
    /// Next timer firing; `None` before `start()` and after `stop()`
    pub next_run: Option<DateTime<Utc>>,
    /// A run is in flight
    pub running: bool,
    /// Completed runs since process start
    pub runs: u64,
}

/// A job plus its runtime bookkeeping
struct JobSlot {
    job: Arc<dyn ScheduledJob>,
    /// Serializes timer-driven runs with `run_now`
    run_lock: Mutex<()>,
    running: AtomicBool,
    runs: AtomicU64,
    next_run: RwLock<Option<DateTime<Utc>>>,
}

impl JobSlot {
    fn new(job: Arc<dyn ScheduledJob>) -> Self {
        Self {
            job,
            run_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            next_run: RwLock::new(None),
        }
    }

    fn name(&self) -> &str {
        self.job.name()
    }

    /// Run the job once on its own task so a panic is contained.
    ///
    /// Cancellation is checked while holding the run lock, so once `stop()`
    /// has drained the lock no new run can begin.
    async fn execute(
        &self,
        trigger: &'static str,
        cancel: &CancellationToken,
    ) -> SchedulerResult<()> {
        let _guard = self.run_lock.lock().await;
        if cancel.is_cancelled() {
            debug!(job = %self.name(), trigger, "Run skipped, scheduler stopped");
            return Err(SchedulerError::Stopped);
        }
        let name = self.name().to_string();

        self.running.store(true, Ordering::SeqCst);
        info!(job = %name, trigger, "Job started");
        let started = Instant::now();

        let job = Arc::clone(&self.job);
        let result = match tokio::spawn(async move { job.run().await }).await {
            Ok(result) => result,
            Err(e) => Err(SchedulerError::RunPanicked {
                job: name.clone(),
                reason: e.to_string(),
            }),
        };

        let elapsed = started.elapsed();
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        crate::metrics::record_job_run(&name, result.is_ok(), elapsed.as_secs_f64());

        match &result {
            Ok(()) => info!(job = %name, elapsed_ms = elapsed.as_millis() as u64, "Job finished"),
            Err(e) => error!(job = %name, elapsed_ms = elapsed.as_millis() as u64, error = %e, "Job failed"),
        }
        result
    }

    async fn entry(&self) -> JobEntry {
        JobEntry {
            name: self.name().to_string(),
            schedule: self.job.schedule().to_string(),
            next_run: *self.next_run.read().await,
            running: self.running.load(Ordering::SeqCst),
            runs: self.runs.load(Ordering::SeqCst),
        }
    }
}

/// Owns a set of independently scheduled jobs.
///
/// `start()` arms one timer loop per job and returns immediately; `stop()`
/// cancels the loops and waits for any in-flight run to finish. A run is never
/// interrupted; cancellation is only observed between runs.
pub struct SchedulerManager {
    jobs: Vec<Arc<JobSlot>>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Default for SchedulerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerManager {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Register a job; names must be unique
    pub fn add_job(&mut self, job: Arc<dyn ScheduledJob>) -> SchedulerResult<()> {
        if self.jobs.iter().any(|slot| slot.name() == job.name()) {
            return Err(SchedulerError::DuplicateJob {
                name: job.name().to_string(),
            });
        }
        self.jobs.push(Arc::new(JobSlot::new(job)));
        Ok(())
    }

    /// Builder-style [`add_job`](Self::add_job)
    pub fn with_job(mut self, job: Arc<dyn ScheduledJob>) -> SchedulerResult<Self> {
        self.add_job(job)?;
        Ok(self)
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|slot| slot.name()).collect()
    }

    /// Arm every job's timer.
    ///
    /// Jobs with a valid schedule are armed even when another job's schedule
    /// is malformed; the first registration error is returned.
    pub async fn start(&self) -> SchedulerResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        let mut first_error = None;
        let mut handles = self.handles.lock().await;

        for slot in &self.jobs {
            let expression = slot.job.schedule();
            let cron = match Cron::new(expression).with_seconds_optional().parse() {
                Ok(cron) => cron,
                Err(e) => {
                    let err = SchedulerError::invalid_schedule(slot.name(), expression, e.to_string());
                    warn!(job = %slot.name(), error = %err, "Job not armed");
                    first_error.get_or_insert(err);
                    continue;
                }
            };

            debug!(job = %slot.name(), schedule = %expression, "Arming job");
            handles.push(tokio::spawn(job_loop(
                Arc::clone(slot),
                cron,
                self.cancel.child_token(),
            )));
        }

        info!(armed = handles.len(), total = self.jobs.len(), "Scheduler started");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Disarm all timers and wait for in-flight runs to finish.
    ///
    /// Manual runs started through [`run_now`](Self::run_now) are waited for
    /// as well; later `run_now` calls fail with [`SchedulerError::Stopped`].
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler loop terminated abnormally");
            }
        }

        // A held run lock means a manual run is still in flight
        for slot in &self.jobs {
            drop(slot.run_lock.lock().await);
        }
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// Run one job immediately on the caller's task
    pub async fn run_now(&self, name: &str) -> SchedulerResult<()> {
        let slot = self
            .jobs
            .iter()
            .find(|slot| slot.name() == name)
            .ok_or_else(|| SchedulerError::job_not_found(name))?;
        slot.execute("manual", &self.cancel).await
    }

    pub async fn entries(&self) -> Vec<JobEntry> {
        let mut entries = Vec::with_capacity(self.jobs.len());
        for slot in &self.jobs {
            entries.push(slot.entry().await);
        }
        entries
    }
}

async fn job_loop(slot: Arc<JobSlot>, cron: Cron, cancel: CancellationToken) {
    loop {
        let now = Local::now();
        let next = match cron.find_next_occurrence(&now, false) {
            Ok(next) => next,
            Err(e) => {
                error!(job = %slot.name(), error = %e, "No next occurrence, disarming job");
                break;
            }
        };
        *slot.next_run.write().await = Some(next.with_timezone(&Utc));

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        // Errors are logged by execute; the next tick runs regardless
        let _ = slot.execute("timer", &cancel).await;
    }

    *slot.next_run.write().await = None;
    debug!(job = %slot.name(), "Job loop exited");
}
