use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blogd::config::Config;
use blogd::hub::Hub;
use blogd::scheduler::{jobs::BACKUP_ROTATION_JOB, JobServices, SchedulerManager};
use blogd::server::{AppState, BlogServer};
use blogd::service::{ArticleService, BackupService, LogService};
use blogd::storage::{self, CrawlerTokenRepository, SqliteStore};

#[derive(Parser)]
#[command(
    name = "blogd",
    version,
    about = "Blog backend with crawler task coordination, live updates and scheduled maintenance",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (defaults to BLOGD_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config value
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WebSocket server and the scheduler until SIGINT/SIGTERM
    Serve,

    /// Mint a dashboard JWT
    IssueToken {
        /// User id carried in the token
        #[arg(long, default_value = "1")]
        user_id: i64,

        /// Username carried in the token
        #[arg(long, default_value = "admin")]
        username: String,
    },

    /// Register (or reactivate) a crawler bearer token
    AddCrawlerToken {
        /// The bearer token crawlers will send
        token: String,

        /// Label for the integration using the token
        #[arg(short, long, default_value = "crawler")]
        name: String,
    },

    /// Create one backup now and rotate old ones
    Backup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, cli.verbose, &config.logging.level)?;

    match cli.command {
        Commands::Serve => serve(config).await?,
        Commands::IssueToken { user_id, username } => {
            let jwt = blogd::auth::JwtManager::from_config(&config.auth);
            let token = jwt.issue(user_id, &username)?;
            tracing::info!(user_id, username = %username, "Issued dashboard token");
            println!("{token}");
        }
        Commands::AddCrawlerToken { token, name } => {
            let store = storage::open_shared(&config.database.sqlite_path)?;
            store.add_crawler_token(&token, &name).await?;
            tracing::info!(
                name = %name,
                token = %blogd::auth::token_fingerprint(&token),
                "Crawler token registered"
            );
        }
        Commands::Backup => {
            let store = storage::open_shared(&config.database.sqlite_path)?;
            let scheduler = SchedulerManager::from_config(&config.scheduler, job_services(&config, &store))?;
            scheduler.run_now(BACKUP_ROTATION_JOB).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, verbose: bool, level: &str) -> Result<()> {
    // RUST_LOG wins over the config level
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => tracing_subscriber::EnvFilter::new("blogd=debug,tower_http=debug,info"),
        Err(_) => tracing_subscriber::EnvFilter::try_new(format!("blogd={level},tower_http={level},warn"))
            .context("Invalid log level")?,
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}

fn job_services(config: &Config, store: &Arc<SqliteStore>) -> JobServices {
    JobServices {
        articles: ArticleService::new(store.clone()),
        logs: LogService::new(store.clone()),
        backups: BackupService::new(store.clone(), config.backup.directory.clone()),
    }
}

async fn serve(config: Config) -> Result<()> {
    if let Err(e) = blogd::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let store = storage::open_shared(&config.database.sqlite_path)
        .with_context(|| format!("Failed to open database {}", config.database.sqlite_path.display()))?;

    for token in &config.auth.crawler_tokens {
        store.add_crawler_token(token, "config").await?;
    }
    if !config.auth.crawler_tokens.is_empty() {
        tracing::info!(count = config.auth.crawler_tokens.len(), "Seeded crawler tokens from config");
    }

    let scheduler = if config.scheduler.enabled {
        let manager = Arc::new(SchedulerManager::from_config(
            &config.scheduler,
            job_services(&config, &store),
        )?);
        if let Err(e) = manager.start().await {
            tracing::warn!(error = %e, "Scheduler started with jobs missing");
        }
        Some(manager)
    } else {
        tracing::info!("Scheduler disabled");
        None
    };

    let hub = Hub::spawn(config.hub.subscriber_queue_capacity);
    let state = AppState::new(&config, store, hub, scheduler.clone());
    let server = BlogServer::new(config.server.clone(), state);

    let served = server.start_with_shutdown(shutdown_signal()).await;

    // Wait for in-flight sweeps before the process exits
    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }

    served?;
    tracing::info!("blogd stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to wait for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}
