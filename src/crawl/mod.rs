//! Crawl task coordination
//!
//! - [`state`]: the task state machine
//! - [`service`]: registration and transitions over the task store, with hub publishing
//! - [`client`]: HTTP task reporter used by crawler processes

pub mod client;
pub mod error;
pub mod service;
pub mod state;

pub use client::{ClientError, ReporterConfig, TaskReporter};
pub use error::{CrawlError, CrawlResult, TransitionError};
pub use service::{
    CompleteTaskRequest, CrawlService, FailTaskRequest, ListTasksRequest, RegisterTaskRequest,
    TaskPage, UpdateTaskStatusRequest,
};
pub use state::Transition;
