//! Core domain types for the tape market/news terminal.
//!
//! This crate provides the types shared by every pipeline stage:
//! - `Symbol`, `Topic`, `Interval`, `Venue`: stream and instrument addressing
//! - `Price`, `PriceFormat`: precision-safe prices and display precision
//! - `PriceTick`, `Candle`: market data records
//! - `NewsMessage`: the common shape every news source is normalized into

pub mod decimal;
pub mod error;
pub mod market;
pub mod news;
pub mod types;

pub use decimal::Price;
pub use error::{CoreError, Result};
pub use market::{Interval, Symbol, Topic, Venue, THOUSAND_PREFIXED_COINS};
pub use news::{MessageIdentity, NewsMessage, Suggestion};
pub use types::{Candle, PriceFormat, PriceTick};
