//! REST client for candle history and futures listings.

use crate::error::{ChartError, ChartResult};
use crate::history::HistorySource;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tape_core::{Candle, Interval, Price, Symbol, Venue};
use tracing::{debug, info};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_FUTURES_BASE_URL: &str = "https://fapi.binance.com";
pub const DEFAULT_SPOT_BASE_URL: &str = "https://api.binance.com";

const FUTURES_KLINES_PATH: &str = "/fapi/v1/klines";
const SPOT_KLINES_PATH: &str = "/api/v3/klines";
const FUTURES_EXCHANGE_INFO_PATH: &str = "/fapi/v1/exchangeInfo";

/// Tuple positions in a REST kline row.
const OPEN_TIME_IDX: usize = 0;
const OPEN_IDX: usize = 1;
const HIGH_IDX: usize = 2;
const LOW_IDX: usize = 3;
const CLOSE_IDX: usize = 4;
const QUOTE_VOLUME_IDX: usize = 7;

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<RawSymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct RawSymbolInfo {
    symbol: String,
    status: String,
}

/// Client for candle history.
pub struct KlineClient {
    client: Client,
    futures_base_url: String,
    spot_base_url: String,
}

impl KlineClient {
    pub fn new(futures_base_url: impl Into<String>, spot_base_url: impl Into<String>) -> ChartResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ChartError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            futures_base_url: futures_base_url.into().trim_end_matches('/').to_string(),
            spot_base_url: spot_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Klines endpoint for a venue.
    pub fn klines_url(&self, venue: Venue) -> String {
        match venue {
            Venue::Futures => format!("{}{}", self.futures_base_url, FUTURES_KLINES_PATH),
            Venue::Spot => format!("{}{}", self.spot_base_url, SPOT_KLINES_PATH),
        }
    }

    /// Fetch the default history window for (symbol, interval).
    pub async fn fetch_klines(
        &self,
        symbol: &Symbol,
        interval: Interval,
        venue: Venue,
    ) -> ChartResult<Vec<Candle>> {
        let url = self.klines_url(venue);
        info!(%url, %symbol, %interval, %venue, "Fetching kline history");

        let body = self
            .get_json(&url, &[("symbol", symbol.as_str()), ("interval", interval.as_str())])
            .await?;
        let candles = parse_kline_rows(&body)?;

        debug!(%symbol, count = candles.len(), "Kline history received");
        Ok(candles)
    }

    /// Tradable USDT/BUSD-quoted futures symbols.
    pub async fn fetch_futures_symbols(&self) -> ChartResult<HashSet<Symbol>> {
        let url = format!("{}{}", self.futures_base_url, FUTURES_EXCHANGE_INFO_PATH);
        info!(%url, "Fetching futures listings");

        let body = self.get_json(&url, &[]).await?;
        let symbols = parse_futures_symbols(body)?;

        info!(count = symbols.len(), "Futures listings received");
        Ok(symbols)
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> ChartResult<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ChartError::Http(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChartError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ChartError::Http(format!("Failed to parse response: {e}")))
    }
}

impl HistorySource for KlineClient {
    async fn fetch(&self, symbol: &Symbol, interval: Interval, venue: Venue) -> ChartResult<Vec<Candle>> {
        self.fetch_klines(symbol, interval, venue).await
    }
}

/// Parse REST kline rows: `[openTimeMs, "o", "h", "l", "c", "v", closeTimeMs, "q", ...]`.
pub fn parse_kline_rows(body: &Value) -> ChartResult<Vec<Candle>> {
    let rows = body
        .as_array()
        .ok_or_else(|| ChartError::MalformedKline("response is not an array".to_string()))?;

    rows.iter()
        .enumerate()
        .map(|(idx, row)| parse_kline_row(row).map_err(|e| ChartError::MalformedKline(format!("row {idx}: {e}"))))
        .collect()
}

fn parse_kline_row(row: &Value) -> Result<Candle, String> {
    let fields = row.as_array().ok_or("not an array")?;
    if fields.len() <= QUOTE_VOLUME_IDX {
        return Err(format!("expected at least {} fields, got {}", QUOTE_VOLUME_IDX + 1, fields.len()));
    }

    let open_time_ms = fields[OPEN_TIME_IDX].as_i64().ok_or("open time is not an integer")?;

    Ok(Candle::new(
        open_time_ms.div_euclid(1000),
        Price::new(decimal_field(fields, OPEN_IDX)?),
        Price::new(decimal_field(fields, HIGH_IDX)?),
        Price::new(decimal_field(fields, LOW_IDX)?),
        Price::new(decimal_field(fields, CLOSE_IDX)?),
        decimal_field(fields, QUOTE_VOLUME_IDX)?,
    ))
}

fn decimal_field(fields: &[Value], idx: usize) -> Result<Decimal, String> {
    match &fields[idx] {
        Value::String(s) => s.trim().parse().map_err(|_| format!("field {idx}: invalid decimal {s:?}")),
        Value::Number(n) => n
            .to_string()
            .parse()
            .map_err(|_| format!("field {idx}: invalid number {n}")),
        other => Err(format!("field {idx}: unexpected {other}")),
    }
}

fn parse_futures_symbols(body: Value) -> ChartResult<HashSet<Symbol>> {
    let info: ExchangeInfo = serde_json::from_value(body)?;

    info.symbols
        .into_iter()
        .filter(|s| s.status == "TRADING" && (s.symbol.ends_with("USDT") || s.symbol.ends_with("BUSD")))
        .map(|s| Symbol::parse(&s.symbol).map_err(ChartError::from))
        .collect()
}
