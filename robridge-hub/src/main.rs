//! robridge-hub - ESP32 scan ingestion and realtime dashboard feed
//!
//! Devices register, ping and post scans over HTTP. Scans are enriched by
//! the AI analysis service, stored in SQLite and pushed to dashboards over
//! WebSocket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use robridge_common::config::{load_toml_config, resolve_config_path, AiPolicy};
use robridge_common::SystemClock;
use robridge_hub::config::Overrides;
use robridge_hub::enrichment::HttpAnalysisService;
use robridge_hub::{build_router, AppState, HubConfig};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for robridge-hub
#[derive(Parser, Debug)]
#[command(name = "robridge-hub")]
#[command(about = "Robridge scan hub for ESP32 barcode scanners")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "ROBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "ROBRIDGE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "ROBRIDGE_PORT")]
    port: Option<u16>,

    /// sqlx SQLite URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Base URL of the AI analysis service
    #[arg(long, env = "AI_SERVER_URL")]
    ai_server_url: Option<String>,

    /// When to call the AI service: always | capability
    #[arg(long, env = "ROBRIDGE_AI_POLICY")]
    ai_policy: Option<AiPolicy>,

    /// development | production
    #[arg(long, env = "ROBRIDGE_ENV")]
    environment: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let toml_config = load_toml_config(config_path.as_deref())
        .context("Failed to load config file")?;

    let config = HubConfig::resolve(
        toml_config,
        Overrides {
            host: args.host,
            port: args.port,
            database_url: args.database_url,
            ai_server_url: args.ai_server_url,
            ai_policy: args.ai_policy,
            environment: args.environment,
        },
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any slow startup step
    info!(
        "Starting Robridge Hub (robridge-hub) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &config_path {
        Some(path) if path.exists() => info!("Config file: {}", path.display()),
        Some(path) => warn!("Config file {} not found, using defaults", path.display()),
        None => warn!("No config directory on this platform, using defaults"),
    }
    info!(
        environment = %config.environment,
        ai_server = %config.ai_server_url,
        ai_policy = ?config.ai_policy,
        "Configuration resolved"
    );

    let pool = robridge_common::db::init_database(&config.database_url)
        .await
        .context("Failed to initialize database")?;
    info!("Database: {}", config.database_url);

    let analysis = HttpAnalysisService::new(&config.ai_server_url, config.ai_timeout)
        .context("Failed to build AI service client")?;
    info!("AI analysis endpoint: {}", analysis.endpoint());

    let state = AppState::new(pool, &config, Arc::new(analysis), Arc::new(SystemClock));
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("robridge-hub listening on http://{}", addr);
    info!("WebSocket: ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
