//! Task Tracker API
//!
//! Serves CRUD operations over tasks persisted to a single JSON file.
//!
//! # Environment Variables
//!
//! - `TASKS_FILE`: JSON persistence file (default: `tasks.json`)
//! - `HOST`: Server host address (default: `0.0.0.0`)
//! - `PORT`: Server port (default: `3000`)
//! - `LOG_FORMAT`: `pretty` (default) | `json`
//! - `RUST_LOG`: Logging level (e.g., `debug`, `info`, `task_tracker=debug`)

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use task_tracker::api::{AppState, create_router};
use task_tracker::config::{LogFormat, ServiceConfig};
use task_tracker::infrastructure::JsonFileTaskRepository;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Configuration decides the log format, so errors here go to stderr.
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Configuration error: {error}");
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);

    tracing::info!(
        tasks_file = %config.tasks_file.display(),
        host = %config.host,
        port = config.port,
        "Starting Task Tracker API"
    );

    let repository = match JsonFileTaskRepository::open(&config.tasks_file).await {
        Ok(repository) => repository,
        Err(error) => {
            tracing::error!(%error, "Failed to open task store");
            std::process::exit(1);
        }
    };

    let application = create_router(AppState::new(repository));

    let address = match config.socket_addr() {
        Ok(address) => address,
        Err(error) => {
            tracing::error!(%error, "Invalid server address");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, "Failed to bind to address {}", address);
            std::process::exit(1);
        }
    };

    match listener.local_addr() {
        Ok(address) => tracing::info!("Listening on {}", address),
        Err(error) => tracing::warn!(%error, "Could not determine local address"),
    }

    if let Err(error) = axum::serve(listener, application)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Server shutdown complete");
}

/// Installs the global tracing subscriber.
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "task_tracker=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Handles graceful shutdown signals (SIGINT, SIGTERM).
///
/// Every mutation is written through before it returns, so there is no
/// state to flush on the way out.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
