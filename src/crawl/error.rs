//! Error types for crawl task coordination

use thiserror::Error;

use crate::models::CrawlTaskStatus;
use crate::storage::StoreError;

/// Result type for crawl service operations
pub type CrawlResult<T> = Result<T, CrawlError>;

/// Rejections produced by the task state machine
///
/// Every variant is a caller error; none of them touches the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The caller's token is not the one that registered the task
    #[error("token is not authorized for this task")]
    Unauthorized,

    #[error("task already completed")]
    AlreadyCompleted,

    #[error("task already failed")]
    AlreadyFailed,

    #[error("invalid task status: {0}")]
    InvalidStatus(String),

    #[error("progress must be between 0 and 100, got {0}")]
    InvalidProgress(i64),
}

impl TransitionError {
    /// Rejection for a task sitting in `status`, if that status is terminal
    pub fn terminal(status: CrawlTaskStatus) -> Option<Self> {
        match status {
            CrawlTaskStatus::Completed => Some(Self::AlreadyCompleted),
            CrawlTaskStatus::Failed => Some(Self::AlreadyFailed),
            CrawlTaskStatus::Running => None,
        }
    }
}

/// Crawl coordination service errors
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Infrastructure failure, propagated unchanged
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for CrawlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(key) => Self::AlreadyExists(key),
            StoreError::NotFound(key) => Self::NotFound(key),
            other => Self::Store(other),
        }
    }
}

impl CrawlError {
    /// Create a not found error
    pub fn not_found(task_id: impl Into<String>) -> Self {
        Self::NotFound(task_id.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    /// Deterministic, local rejection of the caller's request
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }

    /// Check if the error is recoverable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => matches!(e, StoreError::Conflict(_) | StoreError::Io(_)),
            _ => false,
        }
    }

    /// Short label used in metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::Transition(TransitionError::Unauthorized) => "unauthorized",
            Self::Transition(TransitionError::AlreadyCompleted) => "already_completed",
            Self::Transition(TransitionError::AlreadyFailed) => "already_failed",
            Self::Transition(TransitionError::InvalidStatus(_)) => "invalid_status",
            Self::Transition(TransitionError::InvalidProgress(_)) => "invalid_progress",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Store(_) => "store",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_rejection() {
        assert_eq!(
            TransitionError::terminal(CrawlTaskStatus::Completed),
            Some(TransitionError::AlreadyCompleted)
        );
        assert_eq!(
            TransitionError::terminal(CrawlTaskStatus::Failed),
            Some(TransitionError::AlreadyFailed)
        );
        assert_eq!(TransitionError::terminal(CrawlTaskStatus::Running), None);
    }

    #[test]
    fn test_store_error_mapping() {
        let err: CrawlError = StoreError::AlreadyExists("t1".to_string()).into();
        assert!(matches!(err, CrawlError::AlreadyExists(_)));
        assert!(err.is_caller_error());

        let err: CrawlError = StoreError::LockPoisoned.into();
        assert!(matches!(err, CrawlError::Store(_)));
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_is_recoverable() {
        let err: CrawlError = StoreError::Conflict("t1".to_string()).into();
        assert!(err.is_recoverable());

        let err = CrawlError::from(TransitionError::Unauthorized);
        assert!(!err.is_recoverable());
        assert_eq!(err.kind(), "unauthorized");
    }

    #[test]
    fn test_progress_message() {
        let err = TransitionError::InvalidProgress(101);
        assert!(err.to_string().contains("101"));
    }
}
