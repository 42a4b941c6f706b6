//! Chart error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed kline: {0}")]
    MalformedKline(String),

    #[error(transparent)]
    Core(#[from] tape_core::CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ChartResult<T> = Result<T, ChartError>;
