//! Instrument and stream addressing.
//!
//! A `Symbol` identifies an instrument (`BTCUSDT`), an `Interval` a candle
//! bucket width, and a `Topic` a logical subscription on a shared combined
//! stream (`btcusdt@markPrice@1s`, `btcusdt@kline_1m`).

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coins whose perpetual contract is quoted per 1000 units.
pub const THOUSAND_PREFIXED_COINS: [&str; 7] = ["PEPE", "FLOKI", "BONK", "SATS", "RATS", "SHIB", "XEC"];

/// Quote asset used when mapping a news coin to a tradable symbol.
const DEFAULT_QUOTE: &str = "USDT";

/// Exchange symbol, always upper-case alphanumeric (e.g. `BTCUSDT`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse a display label such as `"BTC/USDT"` or `"btcusdt"`.
    ///
    /// Every non-alphanumeric character is stripped.
    pub fn parse(label: &str) -> Result<Self> {
        let cleaned: String = label
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if cleaned.is_empty() {
            return Err(CoreError::InvalidSymbol(label.to_string()));
        }
        Ok(Self(cleaned))
    }

    /// Map a coin ticker mentioned in a news item to its USDT perpetual.
    pub fn for_coin(coin: &str) -> Result<Self> {
        let coin = Self::parse(coin)?;
        if THOUSAND_PREFIXED_COINS.contains(&coin.as_str()) {
            Self::parse(&format!("1000{}{}", coin.0, DEFAULT_QUOTE))
        } else {
            Self::parse(&format!("{}{}", coin.0, DEFAULT_QUOTE))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form used in stream names.
    pub fn stream_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// Candle bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1s")]
    Sec1,
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "3m")]
    Min3,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "6h")]
    Hour6,
    #[serde(rename = "8h")]
    Hour8,
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "3d")]
    Day3,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

impl Interval {
    pub const ALL: [Interval; 16] = [
        Self::Sec1,
        Self::Min1,
        Self::Min3,
        Self::Min5,
        Self::Min15,
        Self::Min30,
        Self::Hour1,
        Self::Hour2,
        Self::Hour4,
        Self::Hour6,
        Self::Hour8,
        Self::Hour12,
        Self::Day1,
        Self::Day3,
        Self::Week1,
        Self::Month1,
    ];

    /// Wire name (`"1m"`, `"4h"`, `"1M"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sec1 => "1s",
            Self::Min1 => "1m",
            Self::Min3 => "3m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour2 => "2h",
            Self::Hour4 => "4h",
            Self::Hour6 => "6h",
            Self::Hour8 => "8h",
            Self::Hour12 => "12h",
            Self::Day1 => "1d",
            Self::Day3 => "3d",
            Self::Week1 => "1w",
            Self::Month1 => "1M",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| CoreError::InvalidInterval(s.to_string()))
    }
}

/// Market venue serving history and live candles for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Spot,
    Futures,
}

impl Venue {
    /// Futures serve every listed symbol except at 1s granularity,
    /// which only spot provides.
    pub fn select(listed_on_futures: bool, interval: Interval) -> Self {
        if listed_on_futures && interval != Interval::Sec1 {
            Self::Futures
        } else {
            Self::Spot
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spot => f.write_str("spot"),
            Self::Futures => f.write_str("futures"),
        }
    }
}

/// Logical subscription key on a combined stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Mark price stream, one update per second.
    pub fn mark_price(symbol: &Symbol) -> Self {
        Self(format!("{}@markPrice@1s", symbol.stream_name()))
    }

    /// Kline (candle) stream for one interval.
    pub fn kline(symbol: &Symbol, interval: Interval) -> Self {
        Self(format!("{}@kline_{}", symbol.stream_name(), interval))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}
