//! Current mark price per symbol.
//!
//! One entry per symbol, overwritten in place on every tick. The first price
//! seen is kept as the reference for the session variation. The board is an
//! owned object shared by `Arc`; there is no global instance.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tape_core::{Price, PriceTick, Symbol};
use tracing::debug;

/// Variation above this (percent) is positive, below its negation negative.
const VARIATION_THRESHOLD: Decimal = dec!(3);

/// Direction of a symbol's move since it was first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variation {
    Positive,
    Negative,
    Neutral,
}

impl Variation {
    pub fn classify(pct: Decimal) -> Self {
        if pct > VARIATION_THRESHOLD {
            Self::Positive
        } else if pct < -VARIATION_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }
}

/// Per-symbol entry.
#[derive(Debug, Clone)]
pub struct PriceEntry {
    pub tick: PriceTick,
    /// First price observed for the symbol.
    pub first_price: Price,
    /// When the entry was last overwritten.
    pub updated_at: DateTime<Utc>,
}

type BoardEntry = Arc<RwLock<PriceEntry>>;

/// Latest price per symbol.
#[derive(Debug, Default)]
pub struct PriceBoard {
    prices: DashMap<Symbol, BoardEntry>,
}

impl PriceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&self, tick: &PriceTick, now: DateTime<Utc>) -> BoardEntry {
        self.prices
            .entry(tick.symbol.clone())
            .or_insert_with(|| {
                debug!(symbol = %tick.symbol, price = %tick.price, "First price for symbol");
                Arc::new(RwLock::new(PriceEntry {
                    tick: tick.clone(),
                    first_price: tick.price,
                    updated_at: now,
                }))
            })
            .clone()
    }

    /// Store a tick, replacing any previous value (last write wins).
    pub fn apply(&self, tick: PriceTick) {
        let now = Utc::now();
        let entry = self.get_or_create(&tick, now);
        let mut entry = entry.write();
        entry.tick = tick;
        entry.updated_at = now;
    }

    pub fn get(&self, symbol: &Symbol) -> Option<PriceTick> {
        self.prices.get(symbol).map(|e| e.read().tick.clone())
    }

    pub fn entry(&self, symbol: &Symbol) -> Option<PriceEntry> {
        self.prices.get(symbol).map(|e| e.read().clone())
    }

    /// Read-only copy of every current tick.
    pub fn snapshot(&self) -> Vec<PriceTick> {
        let mut ticks: Vec<PriceTick> = self.prices.iter().map(|e| e.read().tick.clone()).collect();
        ticks.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        ticks
    }

    /// Drop a symbol once its mark price is no longer subscribed.
    pub fn remove(&self, symbol: &Symbol) -> Option<PriceTick> {
        self.prices
            .remove(symbol)
            .map(|(_, entry)| entry.read().tick.clone())
    }

    /// Percent move since the first observed price, 2 decimal places.
    pub fn variation_pct(&self, symbol: &Symbol) -> Option<Decimal> {
        let entry = self.prices.get(symbol)?;
        let entry = entry.read();
        entry.tick.price.pct_from(entry.first_price)
    }

    pub fn variation(&self, symbol: &Symbol) -> Option<Variation> {
        self.variation_pct(symbol).map(Variation::classify)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn clear(&self) {
        self.prices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, price: Decimal, ms: i64) -> PriceTick {
        PriceTick::new(
            Symbol::parse(symbol).unwrap(),
            Price::new(price),
            DateTime::from_timestamp_millis(ms).unwrap(),
        )
    }

    #[test]
    fn test_last_write_wins() {
        let board = PriceBoard::new();
        board.apply(tick("BTCUSDT", dec!(50000), 2_000));
        board.apply(tick("BTCUSDT", dec!(49000), 1_000));

        let btc = Symbol::parse("BTCUSDT").unwrap();
        assert_eq!(board.get(&btc).unwrap().price.inner(), dec!(49000));
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_variation_against_first_price() {
        let board = PriceBoard::new();
        let sol = Symbol::parse("SOLUSDT").unwrap();

        board.apply(tick("SOLUSDT", dec!(100), 1));
        assert_eq!(board.variation(&sol), Some(Variation::Neutral));

        board.apply(tick("SOLUSDT", dec!(103.5), 2));
        assert_eq!(board.variation_pct(&sol), Some(dec!(3.50)));
        assert_eq!(board.variation(&sol), Some(Variation::Positive));

        board.apply(tick("SOLUSDT", dec!(96.9), 3));
        assert_eq!(board.variation(&sol), Some(Variation::Negative));

        board.apply(tick("SOLUSDT", dec!(97), 4));
        assert_eq!(board.variation(&sol), Some(Variation::Neutral));
        assert_eq!(board.entry(&sol).unwrap().first_price.inner(), dec!(100));
    }

    #[test]
    fn test_snapshot_and_remove() {
        let board = PriceBoard::new();
        board.apply(tick("ETHUSDT", dec!(3000), 1));
        board.apply(tick("BTCUSDT", dec!(50000), 1));

        let symbols: Vec<String> = board
            .snapshot()
            .into_iter()
            .map(|t| t.symbol.to_string())
            .collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);

        let eth = Symbol::parse("ETHUSDT").unwrap();
        assert!(board.remove(&eth).is_some());
        assert!(board.get(&eth).is_none());
        assert!(board.variation(&eth).is_none());
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_zero_first_price_has_no_variation() {
        let board = PriceBoard::new();
        let x = Symbol::parse("XUSDT").unwrap();
        board.apply(tick("XUSDT", dec!(0), 1));
        board.apply(tick("XUSDT", dec!(1), 2));
        assert_eq!(board.variation(&x), None);
    }
}
