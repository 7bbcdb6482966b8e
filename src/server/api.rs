//! REST API handlers
//!
//! Every response uses the `{code, message, data}` envelope, with `code`
//! mirroring the HTTP status.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::{require_admin, require_crawler_token, AuthError, CrawlerToken};
use crate::crawl::{
    CompleteTaskRequest, CrawlError, FailTaskRequest, ListTasksRequest, RegisterTaskRequest,
    TransitionError, UpdateTaskStatusRequest,
};
use crate::scheduler::SchedulerError;
use crate::storage::StoreError;

use super::app::AppState;
use super::ws;

// ============================================================================
// Envelope
// ============================================================================

/// Response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::with_status(StatusCode::OK, "success", data)
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, data)
    }

    fn with_status(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Error response carrying its HTTP status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            code: self.status.as_u16(),
            message: self.message,
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Encoding(_) => Self::internal(err.to_string()),
            other => Self::unauthorized(other.to_string()),
        }
    }
}

impl From<CrawlError> for ApiError {
    fn from(err: CrawlError) -> Self {
        match &err {
            CrawlError::NotFound(_) => Self::not_found(err.to_string()),
            CrawlError::Transition(TransitionError::Unauthorized) => {
                Self::new(StatusCode::FORBIDDEN, err.to_string())
            }
            CrawlError::Store(StoreError::Conflict(_)) => {
                Self::new(StatusCode::CONFLICT, "task is being updated concurrently, retry")
            }
            // Store details stay in the server log
            CrawlError::Store(_) => Self::internal("storage failure"),
            _ => Self::bad_request(err.to_string()),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobNotFound { .. } => Self::not_found(err.to_string()),
            SchedulerError::Stopped => Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("invalid query: {}", rejection.body_text()))
    }
}

type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub subscribers: usize,
    pub scheduler_running: bool,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let crawler = Router::new()
        .route("/crawler/tasks", post(register_task))
        .route("/crawler/tasks/{id}", put(update_task_status))
        .route("/crawler/tasks/{id}/complete", put(complete_task))
        .route("/crawler/tasks/{id}/fail", put(fail_task))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_crawler_token));

    let admin = Router::new()
        .route("/admin/crawler/tasks", get(list_tasks))
        .route("/admin/crawler/tasks/{task_id}", get(get_task))
        .route("/admin/scheduler/jobs", get(list_jobs))
        .route("/admin/scheduler/jobs/{name}/run", post(run_job))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let api = Router::new()
        .route("/health", get(health_check))
        .merge(crawler)
        .merge(admin);

    Router::new()
        .nest("/api/v1", api)
        .route("/ws/crawler/tasks", get(ws::task_updates))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> ApiResponse<HealthResponse> {
    let scheduler_running = state
        .scheduler
        .as_ref()
        .is_some_and(|scheduler| scheduler.is_running());

    ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        subscribers: state.hub.subscriber_count().await,
        scheduler_running,
    })
}

async fn metrics_handler() -> Response {
    match crate::metrics::encode_metrics() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            ApiError::internal("failed to encode metrics").into_response()
        }
    }
}

async fn register_task(
    State(state): State<AppState>,
    Extension(CrawlerToken(token)): Extension<CrawlerToken>,
    payload: Result<Json<RegisterTaskRequest>, JsonRejection>,
) -> ApiResult<crate::models::CrawlTask> {
    let Json(request) = payload?;
    let task = state.crawl.register_task(request, &token).await?;
    Ok(ApiResponse::created("task registered", task))
}

async fn update_task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(CrawlerToken(token)): Extension<CrawlerToken>,
    payload: Result<Json<UpdateTaskStatusRequest>, JsonRejection>,
) -> ApiResult<crate::models::CrawlTask> {
    let Json(request) = payload?;
    let task = state.crawl.update_task_status(&id, request, &token).await?;
    Ok(ApiResponse::success(task))
}

async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(CrawlerToken(token)): Extension<CrawlerToken>,
    payload: Result<Json<CompleteTaskRequest>, JsonRejection>,
) -> ApiResult<crate::models::CrawlTask> {
    let Json(request) = payload?;
    let task = state.crawl.complete_task(&id, request, &token).await?;
    Ok(ApiResponse::success(task))
}

async fn fail_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(CrawlerToken(token)): Extension<CrawlerToken>,
    payload: Result<Json<FailTaskRequest>, JsonRejection>,
) -> ApiResult<crate::models::CrawlTask> {
    let Json(request) = payload?;
    let task = state.crawl.fail_task(&id, request, &token).await?;
    Ok(ApiResponse::success(task))
}

async fn list_tasks(
    State(state): State<AppState>,
    query: Result<Query<ListTasksRequest>, QueryRejection>,
) -> ApiResult<crate::crawl::TaskPage> {
    let Query(request) = query?;
    Ok(ApiResponse::success(state.crawl.list_tasks(&request).await?))
}

async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<crate::models::CrawlTask> {
    Ok(ApiResponse::success(state.crawl.get_task(&task_id).await?))
}

async fn list_jobs(State(state): State<AppState>) -> ApiResult<Vec<crate::scheduler::JobEntry>> {
    let entries = match &state.scheduler {
        Some(scheduler) => scheduler.entries().await,
        None => Vec::new(),
    };
    Ok(ApiResponse::success(entries))
}

async fn run_job(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<String> {
    let scheduler = state
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::not_found("scheduler is disabled"))?;
    scheduler.run_now(&name).await?;
    Ok(ApiResponse::success(format!("job {name} finished")))
}
