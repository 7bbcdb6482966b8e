//! Configuration management for blogd
//!
//! This module handles loading and validating configuration from environment
//! variables (`BLOGD_*`) and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LOG_RETENTION_DAYS: i64 = 90;

/// Upper bound on the log retention window (100 years)
pub const MAX_LOG_RETENTION_DAYS: i64 = 36_500;
pub const DEFAULT_BACKUP_RETENTION_COUNT: i64 = 10;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Token configuration
    pub auth: AuthConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Scheduled job configuration
    pub scheduler: SchedulerConfig,

    /// Backup configuration
    pub backup: BackupConfig,

    /// WebSocket hub configuration
    pub hub: HubConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Enable permissive CORS
    pub enable_cors: bool,

    /// Enable request tracing
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

/// Token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for dashboard/admin JWTs (required)
    pub jwt_secret: String,

    /// `iss` claim
    pub jwt_issuer: String,

    /// Token lifetime in seconds
    pub jwt_ttl_secs: u64,

    /// Crawler bearer tokens activated at startup
    pub crawler_tokens: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: String::from("blogd"),
            jwt_ttl_secs: 86_400,
            crawler_tokens: Vec::new(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/blog.db"),
        }
    }
}

/// Scheduled job configuration (six-field cron expressions, seconds first)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Arm the scheduler when serving
    pub enabled: bool,

    pub auto_publish_schedule: String,

    pub log_cleanup_schedule: String,

    /// Non-positive values fall back to the default
    pub log_retention_days: i64,

    pub backup_schedule: String,

    /// Non-positive values fall back to the default
    pub backup_retention_count: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_publish_schedule: String::from("0 * * * * *"),
            log_cleanup_schedule: String::from("0 0 2 * * *"),
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            backup_schedule: String::from("0 0 3 * * *"),
            backup_retention_count: DEFAULT_BACKUP_RETENTION_COUNT,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn effective_log_retention_days(&self) -> i64 {
        if self.log_retention_days > 0 {
            self.log_retention_days
        } else {
            DEFAULT_LOG_RETENTION_DAYS
        }
    }

    #[must_use]
    pub fn effective_backup_retention_count(&self) -> usize {
        if self.backup_retention_count > 0 {
            self.backup_retention_count as usize
        } else {
            DEFAULT_BACKUP_RETENTION_COUNT as usize
        }
    }
}

/// Backup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory holding backup artifacts
    pub directory: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/backups"),
        }
    }
}

/// WebSocket hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Bounded queue length per subscriber
    pub subscriber_queue_capacity: usize,

    /// Read deadline in seconds
    pub pong_wait_secs: u64,

    /// Write deadline in seconds
    pub write_wait_secs: u64,

    /// Largest accepted inbound frame in bytes
    pub max_message_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 256,
            pong_wait_secs: 60,
            write_wait_secs: 10,
            max_message_size: 512,
        }
    }
}

impl HubConfig {
    #[must_use]
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    #[must_use]
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    /// Keepalive interval: 90% of the read deadline
    #[must_use]
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let bind_address = match std::env::var("BLOGD_BIND_ADDRESS") {
            Ok(addr) => addr
                .parse()
                .with_context(|| format!("Invalid BLOGD_BIND_ADDRESS: {addr}"))?,
            Err(_) => defaults.server.bind_address,
        };

        let jwt_secret = std::env::var("BLOGD_JWT_SECRET")
            .or_else(|_| std::env::var("JWT_SECRET"))
            .unwrap_or_default();

        let crawler_tokens = std::env::var("BLOGD_CRAWLER_TOKENS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server: ServerConfig {
                bind_address,
                enable_cors: env_parse("BLOGD_ENABLE_CORS", defaults.server.enable_cors),
                enable_request_logging: env_parse(
                    "BLOGD_REQUEST_LOGGING",
                    defaults.server.enable_request_logging,
                ),
            },
            auth: AuthConfig {
                jwt_secret,
                jwt_issuer: std::env::var("BLOGD_JWT_ISSUER")
                    .unwrap_or(defaults.auth.jwt_issuer),
                jwt_ttl_secs: env_parse("BLOGD_JWT_TTL_SECS", defaults.auth.jwt_ttl_secs),
                crawler_tokens,
            },
            database: DatabaseConfig {
                sqlite_path: std::env::var("BLOGD_SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.database.sqlite_path),
            },
            scheduler: SchedulerConfig {
                enabled: env_parse("BLOGD_SCHEDULER_ENABLED", defaults.scheduler.enabled),
                auto_publish_schedule: std::env::var("BLOGD_AUTO_PUBLISH_SCHEDULE")
                    .unwrap_or(defaults.scheduler.auto_publish_schedule),
                log_cleanup_schedule: std::env::var("BLOGD_LOG_CLEANUP_SCHEDULE")
                    .unwrap_or(defaults.scheduler.log_cleanup_schedule),
                log_retention_days: env_parse(
                    "BLOGD_LOG_RETENTION_DAYS",
                    defaults.scheduler.log_retention_days,
                ),
                backup_schedule: std::env::var("BLOGD_BACKUP_SCHEDULE")
                    .unwrap_or(defaults.scheduler.backup_schedule),
                backup_retention_count: env_parse(
                    "BLOGD_BACKUP_RETENTION_COUNT",
                    defaults.scheduler.backup_retention_count,
                ),
            },
            backup: BackupConfig {
                directory: std::env::var("BLOGD_BACKUP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.backup.directory),
            },
            hub: HubConfig {
                subscriber_queue_capacity: env_parse(
                    "BLOGD_HUB_QUEUE_CAPACITY",
                    defaults.hub.subscriber_queue_capacity,
                ),
                pong_wait_secs: env_parse("BLOGD_HUB_PONG_WAIT_SECS", defaults.hub.pong_wait_secs),
                write_wait_secs: env_parse(
                    "BLOGD_HUB_WRITE_WAIT_SECS",
                    defaults.hub.write_wait_secs,
                ),
                max_message_size: env_parse(
                    "BLOGD_HUB_MAX_MESSAGE_SIZE",
                    defaults.hub.max_message_size,
                ),
            },
            logging: LoggingConfig {
                level: std::env::var("BLOGD_LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: std::env::var("BLOGD_LOG_FORMAT").unwrap_or(defaults.logging.format),
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("jwt_secret must be set (BLOGD_JWT_SECRET or JWT_SECRET)");
        }

        if self.auth.jwt_ttl_secs == 0 {
            anyhow::bail!("jwt_ttl_secs must be greater than 0");
        }

        if self.hub.subscriber_queue_capacity == 0 {
            anyhow::bail!("subscriber_queue_capacity must be greater than 0");
        }

        if self.hub.pong_wait_secs == 0 || self.hub.write_wait_secs == 0 {
            anyhow::bail!("hub deadlines must be greater than 0");
        }

        if self.hub.max_message_size == 0 {
            anyhow::bail!("max_message_size must be greater than 0");
        }

        if self.scheduler.log_retention_days > MAX_LOG_RETENTION_DAYS {
            anyhow::bail!("log_retention_days must be at most {MAX_LOG_RETENTION_DAYS}");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging format must be 'text' or 'json'");
        }

        Ok(())
    }
}
