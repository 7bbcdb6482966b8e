//! HTTP and WebSocket surface
//!
//! ```text
//! /api/v1/health                          public
//! /api/v1/crawler/tasks[...]              crawler bearer token
//! /api/v1/admin/crawler/tasks[...]        admin JWT
//! /api/v1/admin/scheduler/jobs[/{name}/run] admin JWT
//! /ws/crawler/tasks?token=<jwt>           WebSocket, live task updates
//! /metrics                                Prometheus text format
//! ```

pub mod api;
pub mod app;
pub mod ws;

pub use api::{create_router, ApiError, ApiResponse, HealthResponse};
pub use app::{AppState, BlogServer, ServerError};
