//! System log recording and retention

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use super::{ServiceError, ServiceResult};
use crate::models::{LogLevel, SystemLog};
use crate::storage::LogRepository;

/// Outcome of a retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted_count: u64,
}

#[derive(Clone)]
pub struct LogService {
    logs: Arc<dyn LogRepository>,
}

impl LogService {
    pub fn new(logs: Arc<dyn LogRepository>) -> Self {
        Self { logs }
    }

    pub async fn record(&self, level: LogLevel, message: &str, source: &str) -> ServiceResult<SystemLog> {
        Ok(self.logs.insert_log(level, message, source, Utc::now()).await?)
    }

    /// Delete log rows older than `retention_days`
    pub async fn cleanup_old_logs(&self, retention_days: i64) -> ServiceResult<CleanupReport> {
        let cutoff = Duration::try_days(retention_days.max(0))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or(ServiceError::RetentionOutOfRange(retention_days))?;
        let deleted_count = self.logs.delete_logs_before(cutoff).await?;

        info!(deleted_count, retention_days, cutoff = %cutoff, "Old system logs cleaned up");
        Ok(CleanupReport { deleted_count })
    }
}
