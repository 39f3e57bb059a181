//! shelf-sync - collection mirror service
//!
//! Loads configuration, opens the SQLite cache and serves the sync API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelf_common::config::{default_config_path, load_toml_config, resolve_data_folder, user_agent};
use shelf_common::events::EventBus;
use shelf_common::time::SystemClock;
use shelf_sync::config::{resolve_bind_address, SyncConfig, ENV_DATA_DIR};
use shelf_sync::db::{init_database_pool, SqliteCacheStore, DATABASE_FILE_NAME};
use shelf_sync::services::HttpTransport;
use shelf_sync::{build_orchestrator, build_router, AppState};

/// Command-line arguments for shelf-sync
#[derive(Parser, Debug)]
#[command(name = "shelf-sync")]
#[command(about = "Local mirror of a remote record collection")]
#[command(version)]
struct Args {
    /// Path to shelf.toml
    #[arg(short, long, env = "SHELF_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the cache database
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// HTTP bind address, e.g. 127.0.0.1:5740
    #[arg(short, long)]
    bind: Option<String>,

    /// Log filter directive; overrides RUST_LOG and the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Run one sync, print a summary and exit instead of serving HTTP
    #[arg(long)]
    once: bool,

    /// With --once: ignore a valid cache
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let toml = match &config_path {
        Some(path) => load_toml_config(path)?,
        None => Default::default(),
    };

    // Initialize tracing
    let filter = match &args.log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml.logging.level)),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting shelf-sync");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = SyncConfig::from_sources(&toml, |name| std::env::var(name).ok())
        .context("Invalid configuration")?;
    info!(
        base_url = %config.remote.base_url,
        page_size = config.page_size,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "Configuration resolved"
    );

    let data_folder = resolve_data_folder(
        args.data_dir.as_deref(),
        ENV_DATA_DIR,
        toml.data_folder.as_deref(),
    );
    let db_path = data_folder.join(DATABASE_FILE_NAME);
    info!("Database: {}", db_path.display());

    let db_pool = init_database_pool(&db_path)
        .await
        .context("Failed to open cache database")?;

    let transport = HttpTransport::new(
        &config.remote.base_url,
        &config.remote.token,
        &user_agent(),
        config.remote.request_timeout,
    )
    .context("Failed to build HTTP client")?;

    let event_bus = EventBus::new(100);
    let orchestrator = Arc::new(build_orchestrator(
        &config,
        Arc::new(transport),
        Arc::new(SqliteCacheStore::new(db_pool)),
        Arc::new(SystemClock),
        event_bus,
    ));

    if args.once {
        return sync_once(&orchestrator, args.force).await;
    }

    let state = AppState::new(orchestrator);
    let app = build_router(state);

    let bind = resolve_bind_address(args.bind.as_deref(), &toml, |name| {
        std::env::var(name).ok()
    });
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn sync_once(orchestrator: &shelf_sync::services::SyncOrchestrator, force: bool) -> Result<()> {
    let result = orchestrator
        .sync_with_progress(force, |progress| {
            info!(
                phase = progress.phase.as_str(),
                percent = progress.progress_percent,
                "{}",
                progress.message
            );
        })
        .await?;

    for issue in &result.errors {
        tracing::warn!("{}", issue);
    }
    info!(
        success = result.success,
        from_cache = result.from_cache,
        records = result.records.len(),
        duration_ms = result.duration_ms,
        "Sync finished"
    );

    if result.success {
        Ok(())
    } else {
        anyhow::bail!("Sync failed")
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
