//! Application configuration.
//!
//! Loaded from a TOML file (missing file = defaults) and overridden by
//! environment variables prefixed `TAPE_`, nested keys separated by `__`
//! (e.g. `TAPE_NEWS__AUDIO_ENABLED=true`).

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tape_chart::{DEFAULT_FUTURES_BASE_URL, DEFAULT_SPOT_BASE_URL};
use tape_core::Interval;
use tape_feed::{AggregatorConfig, NewsSourceKind, DEFAULT_CAP};
use tape_ws::{ConnectionConfig, HeartbeatConfig};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const CONFIG_PATH_ENV: &str = "TAPE_CONFIG";

/// Text heartbeat settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_ping")]
    pub payload: String,
    #[serde(default = "default_pong")]
    pub pong_payload: String,
    /// Reconnect when a probe stays unanswered this long.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

fn default_ping() -> String {
    "ping".to_string()
}

fn default_pong() -> String {
    "pong".to_string()
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval_ms(),
            payload: default_ping(),
            pong_payload: default_pong(),
            timeout_ms: None,
        }
    }
}

impl From<HeartbeatSettings> for HeartbeatConfig {
    fn from(s: HeartbeatSettings) -> Self {
        Self {
            interval_ms: s.interval_ms,
            payload: s.payload,
            pong_payload: s.pong_payload,
            timeout_ms: s.timeout_ms,
        }
    }
}

/// Price streams and REST endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Futures combined stream.
    #[serde(default = "default_futures_ws_url")]
    pub futures_ws_url: String,
    /// Spot combined stream.
    #[serde(default = "default_spot_ws_url")]
    pub spot_ws_url: String,
    #[serde(default = "default_futures_rest_url")]
    pub futures_rest_url: String,
    #[serde(default = "default_spot_rest_url")]
    pub spot_rest_url: String,
    /// 0 = reconnect forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default)]
    pub heartbeat: Option<HeartbeatSettings>,
}

fn default_futures_ws_url() -> String {
    "wss://fstream.binance.com/stream".to_string()
}

fn default_spot_ws_url() -> String {
    "wss://stream.binance.com:9443/stream".to_string()
}

fn default_futures_rest_url() -> String {
    DEFAULT_FUTURES_BASE_URL.to_string()
}

fn default_spot_rest_url() -> String {
    DEFAULT_SPOT_BASE_URL.to_string()
}

fn default_reconnect_interval_ms() -> u64 {
    3_000
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            futures_ws_url: default_futures_ws_url(),
            spot_ws_url: default_spot_ws_url(),
            futures_rest_url: default_futures_rest_url(),
            spot_rest_url: default_spot_rest_url(),
            max_reconnect_attempts: 0,
            reconnect_interval_ms: default_reconnect_interval_ms(),
            heartbeat: None,
        }
    }
}

impl MarketConfig {
    pub fn connection_config(&self, url: &str) -> ConnectionConfig {
        ConnectionConfig {
            url: url.to_string(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_interval_ms: self.reconnect_interval_ms,
            heartbeat: self.heartbeat.clone().map(Into::into),
        }
    }
}

/// One news feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSourceConfig {
    /// Unique name; also the merge priority key.
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub kind: NewsSourceKind,
    #[serde(default = "default_news_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_news_heartbeat")]
    pub heartbeat: Option<HeartbeatSettings>,
}

fn default_news_max_reconnect_attempts() -> u32 {
    100
}

fn default_news_heartbeat() -> Option<HeartbeatSettings> {
    Some(HeartbeatSettings::default())
}

impl NewsSourceConfig {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.url.clone(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_interval_ms: self.reconnect_interval_ms,
            heartbeat: self.heartbeat.clone().map(Into::into),
        }
    }
}

/// News merge settings. Sources are listed in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    #[serde(default)]
    pub sources: Vec<NewsSourceConfig>,
    #[serde(default = "default_cap")]
    pub cap: usize,
    #[serde(default = "default_snapshot_window")]
    pub snapshot_window: usize,
    #[serde(default)]
    pub audio_enabled: bool,
    /// Notification sound per source name.
    #[serde(default)]
    pub sounds: HashMap<String, String>,
    #[serde(default = "default_sound")]
    pub default_sound: String,
}

fn default_cap() -> usize {
    DEFAULT_CAP
}

fn default_snapshot_window() -> usize {
    tape_feed::aggregator::DEFAULT_SNAPSHOT_WINDOW
}

fn default_sound() -> String {
    tape_feed::aggregator::DEFAULT_SOUND.to_string()
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            cap: default_cap(),
            snapshot_window: default_snapshot_window(),
            audio_enabled: false,
            sounds: HashMap::new(),
            default_sound: default_sound(),
        }
    }
}

impl NewsConfig {
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            sources: self.sources.iter().map(|s| s.name.clone()).collect(),
            cap: self.cap,
            snapshot_window: self.snapshot_window,
            audio_enabled: self.audio_enabled,
            sounds: self.sounds.clone(),
            default_sound: self.default_sound.clone(),
        }
    }
}

/// Initial chart selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Display label, e.g. `BTC/USDT`.
    #[serde(default = "default_chart_symbol")]
    pub symbol: String,
    #[serde(default = "default_chart_interval")]
    pub interval: Interval,
    /// Futures listings. Fetched from the exchange when absent.
    #[serde(default)]
    pub futures_symbols: Option<Vec<String>>,
}

fn default_chart_symbol() -> String {
    "BTC/USDT".to_string()
}

fn default_chart_interval() -> Interval {
    Interval::Min1
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            symbol: default_chart_symbol(),
            interval: default_chart_interval(),
            futures_symbols: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Period of connection statistics sampling.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_log_level() -> String {
    "info,tape=debug".to_string()
}

fn default_stats_interval_secs() -> u64 {
    30
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Path: `path` > `TAPE_CONFIG` > `config/default.toml`. A missing file
    /// yields defaults; environment overrides apply either way.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let config: Self = config::Config::builder()
            .add_source(config::File::new(&path, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix("TAPE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without file or environment layers.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        let mut seen = Vec::with_capacity(self.news.sources.len());
        for source in &self.news.sources {
            if source.name.trim().is_empty() {
                return Err(AppError::Config("News source with empty name".to_string()));
            }
            if seen.contains(&source.name.as_str()) {
                return Err(AppError::Config(format!(
                    "Duplicate news source: {}",
                    source.name
                )));
            }
            seen.push(source.name.as_str());
        }
        if self.news.cap == 0 {
            return Err(AppError::Config("news.cap must be positive".to_string()));
        }
        Ok(())
    }
}
