//! blogd - personal blog backend
//!
//! The interesting part of the backend is real-time crawl task coordination:
//! crawler processes register and report tasks over HTTP, every accepted
//! transition is persisted and then pushed to connected dashboards over
//! WebSocket, while scheduled maintenance jobs share the same database.
//!
//! # Architecture
//!
//! - [`config`] - Configuration from environment or TOML
//! - [`models`] - Crawl tasks, articles, logs, backups
//! - [`storage`] - Repository traits and the SQLite store
//! - [`crawl`] - Task state machine, coordination service, reporter client
//! - [`hub`] - Broadcast hub and per-connection WebSocket pumps
//! - [`auth`] - Admin JWT and crawler bearer token middleware
//! - [`service`] - Article publishing, log retention, backups
//! - [`scheduler`] - Cron-driven background jobs
//! - [`server`] - REST handlers, WebSocket gateway, server lifecycle
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use blogd::config::Config;
//! use blogd::hub::Hub;
//! use blogd::server::{AppState, BlogServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = blogd::storage::open_shared(&config.database.sqlite_path)?;
//!     let hub = Hub::spawn(config.hub.subscriber_queue_capacity);
//!     let state = AppState::new(&config, store, hub, None);
//!     BlogServer::new(config.server.clone(), state)
//!         .start_with_shutdown(async { let _ = tokio::signal::ctrl_c().await; })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod crawl;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawl::{CrawlService, TaskReporter};
    pub use crate::error::{BlogErrorTrait, Error, ErrorCategory, Result};
    pub use crate::hub::{Hub, HubEvent};
    pub use crate::models::{CrawlTask, CrawlTaskStatus};
    pub use crate::scheduler::{ScheduledJob, SchedulerManager};
    pub use crate::storage::SqliteStore;
}

// Direct re-exports for convenience
pub use models::{CrawlTask, CrawlTaskStatus};
