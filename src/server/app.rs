//! Blog server lifecycle
//!
//! Builds the shared [`AppState`] and serves the router until a shutdown
//! signal arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::JwtManager;
use crate::config::{Config, ServerConfig};
use crate::crawl::CrawlService;
use crate::hub::{Hub, PumpConfig};
use crate::scheduler::SchedulerManager;
use crate::storage::{CrawlTaskRepository, CrawlerTokenRepository};

use super::api::create_router;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Crawl task coordination
    pub crawl: CrawlService,

    /// Live update hub
    pub hub: Hub,

    /// Admin and dashboard token verification
    pub jwt: Arc<JwtManager>,

    /// Crawler bearer token lookup
    pub crawler_tokens: Arc<dyn CrawlerTokenRepository>,

    /// Background jobs, absent when the scheduler is disabled
    pub scheduler: Option<Arc<SchedulerManager>>,

    /// Per-connection WebSocket limits
    pub pump_config: PumpConfig,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Wire the state from config and a store implementing both task and token repositories
    pub fn new<S>(
        config: &Config,
        store: Arc<S>,
        hub: Hub,
        scheduler: Option<Arc<SchedulerManager>>,
    ) -> Self
    where
        S: CrawlTaskRepository + CrawlerTokenRepository + 'static,
    {
        Self {
            crawl: CrawlService::new(store.clone(), hub.clone()),
            hub,
            jwt: Arc::new(JwtManager::from_config(&config.auth)),
            crawler_tokens: store,
            scheduler,
            pump_config: PumpConfig::from(&config.hub),
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Blog Server
// ============================================================================

pub struct BlogServer {
    config: ServerConfig,
    state: AppState,
}

impl BlogServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Bind the configured address and serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.config.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("{addr}: {e}")))?;

        self.serve(listener, shutdown_signal).await
    }

    /// Serve on an already bound listener.
    ///
    /// When the signal fires, every WebSocket subscriber is closed so that
    /// graceful shutdown does not wait on long-lived connections.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        tracing::info!(address = %local_addr, "Starting blog server");

        let hub = self.state.hub.clone();
        let shutdown = async move {
            shutdown_signal.await;
            tracing::info!("Shutdown requested, closing WebSocket subscribers");
            hub.close_all();
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        tracing::info!("Blog server shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone)]
pub enum ServerError {
    /// Failed to bind to address
    BindError(String),

    /// Server error
    ServeError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
            Self::ServeError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

// ============================================================================
// Tests
// ============================================================================
