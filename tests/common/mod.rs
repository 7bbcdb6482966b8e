//! Common test utilities

use std::sync::Arc;

use blogd::config::Config;
use blogd::crawl::{CrawlService, RegisterTaskRequest};
use blogd::hub::Hub;
use blogd::models::{CrawlTask, Metadata};
use blogd::storage::SqliteStore;

pub const TOKEN_A: &str = "crawler-token-a";
pub const TOKEN_B: &str = "crawler-token-b";
pub const JWT_SECRET: &str = "integration-test-secret";

/// Config valid for tests
#[allow(dead_code)]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = JWT_SECRET.to_string();
    config.server.enable_request_logging = false;
    config
}

/// Coordination service over a fresh in-memory store
#[allow(dead_code)]
pub fn crawl_service() -> (CrawlService, Arc<SqliteStore>, Hub) {
    let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    let hub = Hub::spawn(64);
    (CrawlService::new(store.clone(), hub.clone()), store, hub)
}

/// Register a task owned by `token`
#[allow(dead_code)]
pub async fn register(service: &CrawlService, task_id: &str, token: &str) -> CrawlTask {
    register_with_metadata(service, task_id, token, None).await
}

#[allow(dead_code)]
pub async fn register_with_metadata(
    service: &CrawlService,
    task_id: &str,
    token: &str,
    metadata: Option<Metadata>,
) -> CrawlTask {
    service
        .register_task(
            RegisterTaskRequest {
                task_id: task_id.to_string(),
                task_name: format!("crawl {task_id}"),
                metadata,
            },
            token,
        )
        .await
        .expect("register task")
}

/// Build a metadata document from a JSON object literal
#[allow(dead_code)]
pub fn metadata(value: serde_json::Value) -> Metadata {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("metadata must be an object, got {other}"),
    }
}
