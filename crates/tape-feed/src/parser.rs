//! Market stream parsing.
//!
//! Turns routed combined-stream frames into typed market events. The frame's
//! `data.e` field selects the payload kind; prices arrive as decimal strings.

use crate::error::{FeedError, FeedResult};
use chrono::DateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tape_core::{Candle, Interval, Price, PriceTick, Symbol};
use tape_ws::StreamFrame;
use tracing::debug;

/// Mark price payload (`markPriceUpdate`).
#[derive(Debug, Deserialize)]
pub struct RawMarkPrice {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub mark_price: String,
}

/// Kline payload (`kline`).
#[derive(Debug, Deserialize)]
pub struct RawKlineEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: RawKline,
}

#[derive(Debug, Deserialize)]
pub struct RawKline {
    /// Bucket start, milliseconds.
    #[serde(rename = "t")]
    pub start_ms: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
    /// Quote-asset volume.
    #[serde(rename = "q")]
    pub quote_volume: String,
    /// Whether the bucket is final.
    #[serde(rename = "x", default)]
    pub closed: bool,
}

/// Parsed market data event.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    MarkPrice(PriceTick),
    Kline {
        symbol: Symbol,
        interval: Interval,
        candle: Candle,
        closed: bool,
    },
}

/// Parse counters.
#[derive(Debug, Default)]
pub struct ParseStats {
    accepted: AtomicU64,
    ignored: AtomicU64,
}

impl ParseStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }
}

/// Market stream parser.
#[derive(Debug, Default)]
pub struct MessageParser {
    stats: ParseStats,
}

impl MessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Parse one routed frame.
    ///
    /// Returns `Ok(None)` for payload kinds this terminal does not consume.
    pub fn parse_stream_frame(&self, frame: &StreamFrame) -> FeedResult<Option<MarketEvent>> {
        let event = match frame.event_type() {
            Some("markPriceUpdate") => self.parse_mark_price(&frame.data)?,
            Some("kline") => self.parse_kline(&frame.data)?,
            other => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(stream = %frame.stream, kind = ?other, "Ignoring stream payload");
                return Ok(None);
            }
        };

        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(Some(event))
    }

    fn parse_mark_price(&self, data: &serde_json::Value) -> FeedResult<MarketEvent> {
        let raw: RawMarkPrice = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::ParseError(format!("Invalid markPriceUpdate: {e}")))?;

        let symbol = Symbol::parse(&raw.symbol)?;
        let price = parse_price(&raw.mark_price)?;
        let timestamp = DateTime::from_timestamp_millis(raw.event_time)
            .ok_or_else(|| FeedError::InvalidData(format!("event time {}", raw.event_time)))?;

        Ok(MarketEvent::MarkPrice(PriceTick::new(symbol, price, timestamp)))
    }

    fn parse_kline(&self, data: &serde_json::Value) -> FeedResult<MarketEvent> {
        let raw: RawKlineEvent = serde_json::from_value(data.clone())
            .map_err(|e| FeedError::ParseError(format!("Invalid kline: {e}")))?;

        let symbol = Symbol::parse(&raw.symbol)?;
        let interval: Interval = raw.kline.interval.parse()?;
        let candle = Candle::new(
            raw.kline.start_ms.div_euclid(1000),
            parse_price(&raw.kline.open)?,
            parse_price(&raw.kline.high)?,
            parse_price(&raw.kline.low)?,
            parse_price(&raw.kline.close)?,
            parse_decimal(&raw.kline.quote_volume)?,
        );

        Ok(MarketEvent::Kline {
            symbol,
            interval,
            candle,
            closed: raw.kline.closed,
        })
    }
}

fn parse_price(s: &str) -> FeedResult<Price> {
    s.parse()
        .map_err(|_| FeedError::ParseError(format!("Invalid price: {s}")))
}

fn parse_decimal(s: &str) -> FeedResult<Decimal> {
    s.trim()
        .parse()
        .map_err(|_| FeedError::ParseError(format!("Invalid decimal: {s}")))
}
