//! Market data records.
//!
//! Contains `PriceTick` (latest mark price per symbol), `Candle` (one OHLCV
//! bucket) and `PriceFormat` (display precision fixed per chart selection).

use crate::{Price, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Latest mark price for a symbol.
///
/// One current value per symbol; a newer tick overwrites the older one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: Symbol,
    pub price: Price,
    /// Event time reported by the exchange.
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(symbol: Symbol, price: Price, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol,
            price,
            timestamp,
        }
    }
}

/// One OHLCV bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, seconds since the epoch.
    pub time: i64,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    /// Quote-asset volume.
    pub volume: Decimal,
}

impl Candle {
    pub fn new(time: i64, open: Price, high: Price, low: Price, close: Price, volume: Decimal) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Display precision for a price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFormat {
    /// Decimal places shown.
    pub precision: u32,
    /// Smallest displayed price step.
    pub min_move: Decimal,
}

impl PriceFormat {
    /// Derive the format from a reference price (the first historical open).
    pub fn from_reference(price: Price) -> Self {
        let value = price.inner();
        let (precision, min_move) = if value >= dec!(100) {
            (2, dec!(0.01))
        } else if value >= dec!(10) {
            (3, dec!(0.001))
        } else if value >= dec!(1) {
            (4, dec!(0.0001))
        } else if value >= dec!(0.1) {
            (5, dec!(0.00001))
        } else {
            (6, dec!(0.000001))
        };

        Self {
            precision,
            min_move,
        }
    }

    /// Format a price with this precision.
    pub fn format(&self, price: Price) -> String {
        format!("{:.*}", self.precision as usize, price.inner())
    }
}
