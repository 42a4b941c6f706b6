//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tape_ws::WsError),

    #[error("Feed error: {0}")]
    Feed(#[from] tape_feed::FeedError),

    #[error("Chart error: {0}")]
    Chart(#[from] tape_chart::ChartError),

    #[error("Core error: {0}")]
    Core(#[from] tape_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tape_telemetry::TelemetryError),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
