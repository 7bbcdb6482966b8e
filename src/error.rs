//! Unified error handling for the blogd crate
//!
//! Each module keeps its own error enum; [`Error`] wraps them for code that
//! crosses module boundaries (the binary, integration glue).
//!
//! - [`BlogErrorTrait`] - Common interface implemented by the unified error
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use blogd::error::{BlogErrorTrait, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "Retrying: {err}");
//!     } else {
//!         tracing::error!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::auth::AuthError;
pub use crate::crawl::{ClientError, CrawlError};
pub use crate::scheduler::SchedulerError;
pub use crate::server::ServerError;
pub use crate::service::ServiceError;
pub use crate::storage::StoreError;

/// Common trait for blogd error types
pub trait BlogErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Rejected caller input (bad request, state machine violation)
    Caller,
    /// Authentication failures
    Auth,
    /// Storage and I/O errors
    Storage,
    /// Network-related errors (HTTP client, bind)
    Network,
    /// Configuration and validation errors
    Config,
    /// Scheduler and job errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Auth => "auth",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the blogd crate
#[derive(Error, Debug)]
pub enum Error {
    /// Crawl task coordination errors
    #[error("Crawl error: {0}")]
    Crawl(#[from] CrawlError),

    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Article, log and backup service errors
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Scheduler and job errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Task reporter client errors
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BlogErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Crawl(e) => e.is_recoverable(),
            Self::Store(e) => matches!(e, StoreError::Conflict(_) | StoreError::Io(_)),
            Self::Service(e) => matches!(e, ServiceError::Io(_) | ServiceError::Store(StoreError::Io(_))),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Auth(_) => false,
            Self::Client(e) => e.is_recoverable(),
            Self::Server(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Crawl(e) if e.is_caller_error() => ErrorCategory::Caller,
            Self::Crawl(_) | Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Service(ServiceError::AlreadyPublished(_) | ServiceError::InvalidName(_)) => {
                ErrorCategory::Caller
            }
            Self::Service(ServiceError::RetentionOutOfRange(_)) => ErrorCategory::Config,
            Self::Service(_) => ErrorCategory::Storage,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Auth(_) => ErrorCategory::Auth,
            Self::Client(_) | Self::Server(_) => ErrorCategory::Network,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::TransitionError;

    #[test]
    fn test_error_category() {
        let caller: Error = CrawlError::from(TransitionError::AlreadyCompleted).into();
        assert_eq!(caller.category(), ErrorCategory::Caller);

        let store: Error = CrawlError::Store(StoreError::LockPoisoned).into();
        assert_eq!(store.category(), ErrorCategory::Storage);

        let auth: Error = AuthError::Expired.into();
        assert_eq!(auth.category(), ErrorCategory::Auth);
    }

    #[test]
    fn test_is_recoverable() {
        let conflict: Error = StoreError::Conflict("t1".into()).into();
        assert!(conflict.is_recoverable());

        let unauthorized: Error = CrawlError::from(TransitionError::Unauthorized).into();
        assert!(!unauthorized.is_recoverable());

        let run: Error = SchedulerError::run_failed("disk full").into();
        assert!(run.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("jwt_secret is required");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert_eq!(err.category().as_str(), "config");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::with_source("backup failed", io::Error::other("disk full"));
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.to_string(), "backup failed");
    }
}
