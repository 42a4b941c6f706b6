//! Market tape terminal.
//!
//! Wires the components together:
//! - Futures and spot combined streams with shared topic subscriptions
//! - News sources merged into one deduplicated feed
//! - Chart series stitched from history and live klines

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
