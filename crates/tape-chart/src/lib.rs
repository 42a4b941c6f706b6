//! Candle series for the tape chart.
//!
//! A selection (symbol, interval) loads a finite history once, then live
//! kline deltas replace the last bucket or append a new one. Display
//! precision is fixed from the first historical open for the lifetime of
//! the selection.

pub mod client;
pub mod error;
pub mod history;
pub mod stitcher;

pub use client::{KlineClient, DEFAULT_FUTURES_BASE_URL, DEFAULT_SPOT_BASE_URL};
pub use error::{ChartError, ChartResult};
pub use history::{fetch_history, HistorySource};
pub use stitcher::{DeltaOutcome, FetchTicket, Selection, SeriesPhase, SeriesStitcher};
