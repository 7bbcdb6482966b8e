//! Crawl coordination service
//!
//! Wraps the task store with the state machine and publishes every
//! persisted change to the hub. The store write always happens before the
//! broadcast, and hub delivery is never awaited or inspected.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::error::{CrawlError, CrawlResult};
use super::state::Transition;
use crate::auth::token_fingerprint;
use crate::hub::{Hub, HubEvent};
use crate::models::{CrawlTask, CrawlTaskStatus, Metadata, NewCrawlTask};
use crate::storage::{CrawlTaskFilter, CrawlTaskRepository};

/// Attempts at load → transition → update before a conflict is surfaced
pub const MAX_CONFLICT_RETRIES: usize = 5;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

const REGISTERED_MESSAGE: &str = "task registered";

// ============================================================================
// Requests and responses
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterTaskRequest {
    pub task_id: String,
    pub task_name: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: String,
    pub progress: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteTaskRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailTaskRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Listing query; zero or missing paging values fall back to defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTasksRequest {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub status: Option<String>,
    pub task_id: Option<String>,
}

/// One page of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    pub items: Vec<CrawlTask>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

// ============================================================================
// Service
// ============================================================================

/// Coordinates crawl task registration and transitions
#[derive(Clone)]
pub struct CrawlService {
    tasks: Arc<dyn CrawlTaskRepository>,
    hub: Hub,
}

impl CrawlService {
    pub fn new(tasks: Arc<dyn CrawlTaskRepository>, hub: Hub) -> Self {
        Self { tasks, hub }
    }

    /// Register a new running task owned by `token`
    pub async fn register_task(
        &self,
        request: RegisterTaskRequest,
        token: &str,
    ) -> CrawlResult<CrawlTask> {
        if request.task_id.trim().is_empty() {
            return Err(CrawlError::invalid_request("task_id is required"));
        }
        if request.task_name.trim().is_empty() {
            return Err(CrawlError::invalid_request("task_name is required"));
        }

        let new_task = NewCrawlTask {
            task_id: request.task_id,
            task_name: request.task_name,
            message: REGISTERED_MESSAGE.to_string(),
            start_time: Utc::now(),
            created_by_token: token.to_string(),
            metadata: request.metadata,
        };

        match self.tasks.create_task(&new_task).await {
            Ok(task) => {
                tracing::info!(
                    task_id = %task.task_id,
                    token = %token_fingerprint(token),
                    "Crawl task registered"
                );
                crate::metrics::record_task_transition("register", "ok");
                self.hub.broadcast(&HubEvent::task_update(&task));
                Ok(task)
            }
            Err(e) => {
                let err = CrawlError::from(e);
                self.log_failure("register", &new_task.task_id, token, &err);
                Err(err)
            }
        }
    }

    /// Generic status/progress report
    pub async fn update_task_status(
        &self,
        task_id: &str,
        request: UpdateTaskStatusRequest,
        token: &str,
    ) -> CrawlResult<CrawlTask> {
        let transition = Transition::UpdateStatus {
            status: request.status,
            progress: request.progress,
            message: request.message,
        };
        self.transition(task_id, transition, token).await
    }

    pub async fn complete_task(
        &self,
        task_id: &str,
        request: CompleteTaskRequest,
        token: &str,
    ) -> CrawlResult<CrawlTask> {
        let transition = Transition::Complete {
            message: request.message,
            metadata: request.metadata,
        };
        self.transition(task_id, transition, token).await
    }

    pub async fn fail_task(
        &self,
        task_id: &str,
        request: FailTaskRequest,
        token: &str,
    ) -> CrawlResult<CrawlTask> {
        let transition = Transition::Fail {
            message: request.message,
            error: request.error,
            metadata: request.metadata,
        };
        self.transition(task_id, transition, token).await
    }

    /// Load, apply and persist, retrying the whole sequence on version conflicts
    async fn transition(
        &self,
        task_id: &str,
        transition: Transition,
        token: &str,
    ) -> CrawlResult<CrawlTask> {
        let op = transition.name();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = async {
                let mut task = self
                    .tasks
                    .get_task(task_id)
                    .await?
                    .ok_or_else(|| CrawlError::not_found(task_id))?;
                transition.apply(&mut task, token, Utc::now())?;
                Ok::<_, CrawlError>(task)
            }
            .await;

            let task = match result {
                Ok(task) => task,
                Err(err) => {
                    self.log_failure(op, task_id, token, &err);
                    return Err(err);
                }
            };

            match self.tasks.update_task(&task).await {
                Ok(stored) => {
                    tracing::info!(
                        task_id = %stored.task_id,
                        op,
                        status = %stored.status,
                        progress = stored.progress,
                        "Crawl task updated"
                    );
                    crate::metrics::record_task_transition(op, "ok");
                    self.hub.broadcast(&HubEvent::task_update(&stored));
                    return Ok(stored);
                }
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                    tracing::debug!(task_id, op, attempt, "Concurrent task update, retrying");
                }
                Err(e) => {
                    let err = CrawlError::from(e);
                    self.log_failure(op, task_id, token, &err);
                    return Err(err);
                }
            }
        }
    }

    /// Paginated, filtered listing (newest first)
    pub async fn list_tasks(&self, request: &ListTasksRequest) -> CrawlResult<TaskPage> {
        let page = request.page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = request
            .page_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);

        let status = match request.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(raw.parse::<CrawlTaskStatus>().map_err(|_| {
                CrawlError::invalid_request(format!("invalid status filter: {raw}"))
            })?),
            None => None,
        };
        let filter = CrawlTaskFilter {
            status,
            task_id: request.task_id.clone().filter(|s| !s.is_empty()),
            created_by_token: None,
        };

        let offset = (page - 1).saturating_mul(page_size);
        let (items, total) = self.tasks.list_tasks(&filter, offset, page_size).await?;

        Ok(TaskPage {
            items,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }

    /// Look up by numeric id or by task identifier
    pub async fn get_task(&self, identifier: &str) -> CrawlResult<CrawlTask> {
        if let Ok(id) = identifier.parse::<i64>() {
            if let Some(task) = self.tasks.get_task_by_id(id).await? {
                return Ok(task);
            }
        }

        self.tasks
            .get_task(identifier)
            .await?
            .ok_or_else(|| CrawlError::not_found(identifier))
    }

    fn log_failure(&self, op: &'static str, task_id: &str, token: &str, err: &CrawlError) {
        crate::metrics::record_task_transition(op, err.kind());

        if err.is_caller_error() {
            tracing::debug!(
                task_id,
                op,
                token = %token_fingerprint(token),
                error = %err,
                "Crawl task request rejected"
            );
        } else {
            tracing::error!(task_id, op, error = %err, "Crawl task store failure");
        }
    }
}
