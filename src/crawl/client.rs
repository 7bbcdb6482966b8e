//! Task reporter client for crawler processes
//!
//! Crawlers use this to register their task with a blogd server and to
//! report progress, completion and failure, authenticated with their
//! long-lived bearer token.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::service::{
    CompleteTaskRequest, FailTaskRequest, RegisterTaskRequest, UpdateTaskStatusRequest,
};
use crate::models::{CrawlTask, CrawlTaskStatus, Metadata};

// ============================================================================
// Client Configuration
// ============================================================================

/// Whether a request may be sent again after a transport error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// Repeating the request leaves the task in the same state
    Idempotent,
    /// Only retried when the connection was never established
    ConnectFailuresOnly,
}

/// Configuration for the task reporter
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Server base URL, e.g. `http://localhost:8080`
    pub base_url: String,

    /// Crawler bearer token
    pub token: String,

    /// Request timeout
    pub timeout: Duration,

    /// Retry count for network failures and 5xx responses
    pub retry_count: u32,

    /// Retry delay
    pub retry_delay: Duration,
}

impl ReporterConfig {
    /// Create a new reporter config
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout: Duration::from_secs(30),
            retry_count: 2,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry count
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Set retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

// ============================================================================
// API Response Envelope
// ============================================================================

/// `{code, message, data}` envelope returned by every endpoint
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

// ============================================================================
// Task Reporter
// ============================================================================

/// Client for reporting crawl task state to the server
pub struct TaskReporter {
    config: ReporterConfig,
    http_client: Client,
}

impl TaskReporter {
    /// Create a new task reporter
    pub fn new(config: ReporterConfig) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Register a new crawl task
    pub async fn register_task(
        &self,
        task_id: &str,
        task_name: &str,
        metadata: Option<Metadata>,
    ) -> Result<CrawlTask, ClientError> {
        let body = RegisterTaskRequest {
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            metadata,
        };
        let task = self
            .request(
                Method::POST,
                "/api/v1/crawler/tasks",
                &body,
                StatusCode::CREATED,
                Replay::ConnectFailuresOnly,
            )
            .await?;
        tracing::info!(task_id, "Task registered");
        Ok(task)
    }

    /// Report status and progress; progress is validated before sending
    pub async fn update_status(
        &self,
        task_id: &str,
        status: CrawlTaskStatus,
        progress: i64,
        message: Option<&str>,
    ) -> Result<CrawlTask, ClientError> {
        if !(0..=100).contains(&progress) {
            return Err(ClientError::InvalidProgress(progress));
        }

        let body = UpdateTaskStatusRequest {
            status: status.as_str().to_string(),
            progress,
            message: message.unwrap_or_default().to_string(),
        };
        let task = self
            .request(
                Method::PUT,
                &format!("/api/v1/crawler/tasks/{task_id}"),
                &body,
                StatusCode::OK,
                Replay::Idempotent,
            )
            .await?;
        tracing::debug!(task_id, status = %status, progress, "Task status updated");
        Ok(task)
    }

    /// Mark the task completed
    pub async fn complete_task(
        &self,
        task_id: &str,
        message: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<CrawlTask, ClientError> {
        let body = CompleteTaskRequest {
            message: message.unwrap_or_default().to_string(),
            metadata,
        };
        let task = self
            .request(
                Method::PUT,
                &format!("/api/v1/crawler/tasks/{task_id}/complete"),
                &body,
                StatusCode::OK,
                Replay::ConnectFailuresOnly,
            )
            .await?;
        tracing::info!(task_id, "Task completed");
        Ok(task)
    }

    /// Mark the task failed
    pub async fn fail_task(
        &self,
        task_id: &str,
        message: Option<&str>,
        error: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<CrawlTask, ClientError> {
        let body = FailTaskRequest {
            message: message.unwrap_or_default().to_string(),
            error: error.unwrap_or_default().to_string(),
            metadata,
        };
        let task = self
            .request(
                Method::PUT,
                &format!("/api/v1/crawler/tasks/{task_id}/fail"),
                &body,
                StatusCode::OK,
                Replay::ConnectFailuresOnly,
            )
            .await?;
        tracing::warn!(task_id, "Task failed");
        Ok(task)
    }

    // Internal: send with retry on transport errors and 5xx, decode the envelope.
    // A transport error after the request went out may hide a committed
    // transition, so non-idempotent requests only retry connect failures.
    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        expected: StatusCode,
        replay: Replay,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut last_error = None;

        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            let response = match self
                .http_client
                .request(method.clone(), &url)
                .bearer_auth(&self.config.token)
                .json(body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let retryable = e.is_connect() || replay == Replay::Idempotent;
                    let err = ClientError::NetworkError(e.to_string());
                    if !retryable {
                        tracing::warn!(path, error = %err, "Request outcome unknown, not retrying");
                        return Err(err);
                    }
                    last_error = Some(err);
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() {
                last_error = Some(ClientError::HttpError {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
                continue;
            }

            let envelope: Envelope<T> = response
                .json()
                .await
                .map_err(|e| ClientError::ParseError(e.to_string()))?;

            if envelope.code != expected.as_u16() {
                return Err(ClientError::Rejected {
                    code: envelope.code,
                    message: envelope.message,
                });
            }

            return envelope
                .data
                .ok_or_else(|| ClientError::InvalidResponse("missing data".to_string()));
        }

        Err(last_error.unwrap_or_else(|| ClientError::NetworkError("Unknown error".to_string())))
    }
}

// ============================================================================
// Client Errors
// ============================================================================

/// Client errors
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Initialization error
    InitError(String),

    /// Progress outside 0..=100, rejected locally
    InvalidProgress(i64),

    /// Network error
    NetworkError(String),

    /// Server-side HTTP error (5xx)
    HttpError { status: u16, message: String },

    /// Request rejected by the server (envelope code mismatch)
    Rejected { code: u16, message: String },

    /// Parse error
    ParseError(String),

    /// Invalid response
    InvalidResponse(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitError(msg) => write!(f, "Initialization error: {msg}"),
            Self::InvalidProgress(p) => write!(f, "Progress must be between 0 and 100, got {p}"),
            Self::NetworkError(msg) => write!(f, "Network error: {msg}"),
            Self::HttpError { status, message } => {
                write!(f, "HTTP error ({status}): {message}")
            }
            Self::Rejected { code, message } => write!(f, "Rejected ({code}): {message}"),
            Self::ParseError(msg) => write!(f, "Parse error: {msg}"),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl ClientError {
    /// Network and server errors may succeed on a later attempt
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::HttpError { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
