//! Prometheus metrics and structured logging for the market tape.
//!
//! - Prometheus metrics for stream connections, subscriptions, news merges
//!   and chart stitching
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
