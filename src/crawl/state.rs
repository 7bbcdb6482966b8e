//! Crawl task state machine
//!
//! ```text
//!            UpdateStatus(running)
//!               ┌──────┐
//!               ▼      │
//!           ┌─────────────┐   Complete / UpdateStatus(completed)   ┌───────────┐
//!   ───────▶│   running   │───────────────────────────────────────▶│ completed │
//!  Register └─────────────┘                                        └───────────┘
//!                  │          Fail / UpdateStatus(failed)           ┌───────────┐
//!                  └───────────────────────────────────────────────▶│  failed   │
//!                                                                   └───────────┘
//! ```
//!
//! All rejections happen before the task is touched, so a failed
//! [`Transition::apply`] leaves the task exactly as it was.

use chrono::{DateTime, Utc};

use super::error::TransitionError;
use crate::models::{CrawlTask, CrawlTaskStatus, Metadata};

/// A requested change to a crawl task
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Generic status/progress report. Reaching a terminal status through
    /// this path stamps `end_time` but leaves metadata untouched.
    UpdateStatus {
        status: String,
        progress: i64,
        message: String,
    },

    /// Successful completion; metadata replaces the stored document when given
    Complete {
        message: String,
        metadata: Option<Metadata>,
    },

    /// Failure; metadata is merged over the stored document
    Fail {
        message: String,
        error: String,
        metadata: Option<Metadata>,
    },
}

impl Transition {
    /// Operation name used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateStatus { .. } => "update_status",
            Self::Complete { .. } => "complete",
            Self::Fail { .. } => "fail",
        }
    }

    /// Apply this transition to `task` on behalf of `token`
    pub fn apply(
        &self,
        task: &mut CrawlTask,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        guard(task, token)?;

        match self {
            Self::UpdateStatus {
                status,
                progress,
                message,
            } => {
                let status: CrawlTaskStatus = status
                    .parse()
                    .map_err(|_| TransitionError::InvalidStatus(status.clone()))?;
                let progress = u8::try_from(*progress)
                    .ok()
                    .filter(|p| *p <= 100)
                    .ok_or(TransitionError::InvalidProgress(*progress))?;

                task.status = status;
                task.progress = progress;
                overwrite_message(task, message);
                if status.is_terminal() {
                    task.stamp_end(now);
                }
            }
            Self::Complete { message, metadata } => {
                task.status = CrawlTaskStatus::Completed;
                task.progress = 100;
                overwrite_message(task, message);
                task.stamp_end(now);
                if let Some(metadata) = metadata {
                    task.metadata = Some(metadata.clone());
                }
            }
            Self::Fail {
                message,
                error,
                metadata,
            } => {
                task.status = CrawlTaskStatus::Failed;
                overwrite_message(task, message);
                task.stamp_end(now);

                let mut merged = task.metadata.take().unwrap_or_default();
                if !error.is_empty() {
                    merged.insert("error".to_string(), error.clone().into());
                }
                if let Some(extra) = metadata {
                    for (key, value) in extra {
                        merged.insert(key.clone(), value.clone());
                    }
                }
                task.metadata = Some(merged);
            }
        }

        Ok(())
    }
}

/// Token ownership first, then the terminal-state check
fn guard(task: &CrawlTask, token: &str) -> Result<(), TransitionError> {
    if task.created_by_token != token {
        return Err(TransitionError::Unauthorized);
    }
    match TransitionError::terminal(task.status) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn overwrite_message(task: &mut CrawlTask, message: &str) {
    if !message.is_empty() {
        task.message = message.to_string();
    }
}
