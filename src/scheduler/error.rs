//! Error types for the scheduler module

use std::fmt;

use crate::service::ServiceError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// Schedule expression could not be parsed
    InvalidSchedule {
        job: String,
        expression: String,
        reason: String,
    },

    /// Two jobs registered under the same name
    DuplicateJob { name: String },

    /// No job registered under this name
    JobNotFound { name: String },

    /// `start()` called on a manager that is running or stopped
    AlreadyStarted,

    /// The manager has been stopped; no further runs are accepted
    Stopped,

    /// A job run returned an error
    RunFailed { reason: String },

    /// A job run panicked
    RunPanicked { job: String, reason: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSchedule {
                job,
                expression,
                reason,
            } => {
                write!(f, "Invalid schedule '{}' for job '{}': {}", expression, job, reason)
            }
            Self::DuplicateJob { name } => {
                write!(f, "Job '{}' is already registered", name)
            }
            Self::JobNotFound { name } => {
                write!(f, "Job not found: {}", name)
            }
            Self::AlreadyStarted => {
                write!(f, "Scheduler has already been started")
            }
            Self::Stopped => {
                write!(f, "Scheduler has been stopped")
            }
            Self::RunFailed { reason } => {
                write!(f, "Job run failed: {}", reason)
            }
            Self::RunPanicked { job, reason } => {
                write!(f, "Job '{}' panicked: {}", job, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<ServiceError> for SchedulerError {
    fn from(err: ServiceError) -> Self {
        Self::RunFailed {
            reason: err.to_string(),
        }
    }
}

impl SchedulerError {
    pub fn invalid_schedule(
        job: impl Into<String>,
        expression: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSchedule {
            job: job.into(),
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    pub fn job_not_found(name: impl Into<String>) -> Self {
        Self::JobNotFound { name: name.into() }
    }

    pub fn run_failed(reason: impl Into<String>) -> Self {
        Self::RunFailed {
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable (the next scheduled run may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RunFailed { .. } | Self::RunPanicked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_schedule_error() {
        let err = SchedulerError::invalid_schedule("backup", "61 * * * *", "minute out of range");
        let text = err.to_string();
        assert!(text.contains("backup"));
        assert!(text.contains("61 * * * *"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(SchedulerError::run_failed("disk full").is_recoverable());
        assert!(!SchedulerError::job_not_found("nope").is_recoverable());
        assert!(!SchedulerError::AlreadyStarted.is_recoverable());
        assert!(!SchedulerError::Stopped.is_recoverable());
    }

    #[test]
    fn test_from_service_error() {
        let err: SchedulerError = ServiceError::AlreadyPublished(3).into();
        assert!(matches!(err, SchedulerError::RunFailed { .. }));
        assert!(err.to_string().contains("3"));
    }
}
