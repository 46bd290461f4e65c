pub mod attainment;
pub mod config;
pub mod errors;
pub mod identity;
pub mod models;
pub mod server;
pub mod store;
pub mod tracker;

use crate::config::Settings;
use crate::server::{create_router, AppState};
use std::net::SocketAddr;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let state = AppState::new(&settings)?;
    if settings.allowed_email.is_none() {
        tracing::warn!("allowed_email is unset; every protected route will answer 401");
    }

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!(%addr, data_dir = %settings.data_dir.display(), "habit tracker listening");

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

/// JSON logs, to daily files under `<data_dir>/logs` or to stderr.
pub fn init_tracing(settings: &Settings) -> Result<(), String> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if !settings.log_to_file {
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| error.to_string());
    }

    let log_dir = settings.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "habit-tracker.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
