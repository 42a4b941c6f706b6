//! Main application orchestration.
//!
//! Coordinates:
//! - Futures and spot combined streams (mark prices, klines)
//! - News source connections and the merged feed
//! - Chart selection, history fetch and live stitching

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tape_chart::{
    fetch_history, ChartResult, DeltaOutcome, FetchTicket, KlineClient, Selection, SeriesStitcher,
};
use tape_core::{Candle, Interval, Symbol, Topic, Venue};
use tape_feed::{
    dispatch_notifications, normalize_frame, LogSink, MarketEvent, MessageParser, NewItems,
    NewsAggregator, NewsSourceKind, NotificationSink, PriceBoard,
};
use tape_telemetry::Metrics;
use tape_ws::{
    ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStats, ControlMethod,
    SubscriptionMultiplexer, WsError, WsMessage,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const MARKET_CHANNEL_CAPACITY: usize = 1000;
const NEWS_CHANNEL_CAPACITY: usize = 256;
const HISTORY_CHANNEL_CAPACITY: usize = 16;

/// One combined-stream connection and its topic multiplexer.
struct MarketStream {
    label: &'static str,
    manager: Arc<ConnectionManager>,
    mux: Arc<SubscriptionMultiplexer>,
    last_stats: ConnectionStats,
}

impl MarketStream {
    fn new(label: &'static str, config: ConnectionConfig, message_tx: mpsc::Sender<WsMessage>) -> Self {
        let manager = ConnectionManager::new(config, message_tx);
        let mux = Arc::new(SubscriptionMultiplexer::new(manager.write_handle()));
        let manager = Arc::new(manager.with_multiplexer(mux.clone()));

        Self {
            label,
            manager,
            mux,
            last_stats: ConnectionStats::default(),
        }
    }

    fn subscribe(&self, topics: impl IntoIterator<Item = Topic>) -> Vec<Topic> {
        let added = self.mux.add_topics(topics);
        self.record_change(ControlMethod::Subscribe, added.len());
        added
    }

    fn unsubscribe(&self, topics: impl IntoIterator<Item = Topic>) -> Vec<Topic> {
        let removed = self.mux.remove_topics(topics);
        self.record_change(ControlMethod::Unsubscribe, removed.len());
        removed
    }

    fn record_change(&self, method: ControlMethod, changed: usize) {
        if changed == 0 {
            return;
        }
        if self.mux.is_online() {
            Metrics::subscription_frame(self.label, method.as_str());
        }
        Metrics::subscribed_topics(self.label, self.mux.wanted().len());
    }
}

/// One news feed connection.
struct NewsStream {
    name: String,
    label: String,
    kind: NewsSourceKind,
    manager: Arc<ConnectionManager>,
    last_stats: ConnectionStats,
}

/// Receivers drained by the event loop.
struct Inbound {
    futures_rx: mpsc::Receiver<WsMessage>,
    spot_rx: mpsc::Receiver<WsMessage>,
    news_rx: Vec<mpsc::Receiver<WsMessage>>,
    history_rx: mpsc::Receiver<HistoryOutcome>,
}

/// Completion of a history fetch, reported back to the event loop.
#[derive(Debug)]
pub struct HistoryOutcome {
    pub generation: u64,
    pub venue: Venue,
    /// `None` when the fetch was cancelled.
    pub result: Option<ChartResult<Vec<Candle>>>,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    futures: MarketStream,
    spot: MarketStream,
    news: Vec<NewsStream>,
    inbound: Option<Inbound>,
    parser: MessageParser,
    prices: Arc<PriceBoard>,
    aggregator: NewsAggregator,
    sink: Box<dyn NotificationSink>,
    stitcher: SeriesStitcher,
    client: Arc<KlineClient>,
    futures_symbols: HashSet<Symbol>,
    history_tx: mpsc::Sender<HistoryOutcome>,
}

impl Application {
    /// Create the application. No connection is opened until `run`.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let market = &config.market;

        let (futures_tx, futures_rx) = mpsc::channel(MARKET_CHANNEL_CAPACITY);
        let futures = MarketStream::new(
            "futures",
            market.connection_config(&market.futures_ws_url),
            futures_tx,
        );
        let (spot_tx, spot_rx) = mpsc::channel(MARKET_CHANNEL_CAPACITY);
        let spot = MarketStream::new("spot", market.connection_config(&market.spot_ws_url), spot_tx);

        let mut news = Vec::with_capacity(config.news.sources.len());
        let mut news_rx = Vec::with_capacity(config.news.sources.len());
        for source in &config.news.sources {
            let (tx, rx) = mpsc::channel(NEWS_CHANNEL_CAPACITY);
            news.push(NewsStream {
                name: source.name.clone(),
                label: format!("news:{}", source.name),
                kind: source.kind,
                manager: Arc::new(ConnectionManager::new(source.connection_config(), tx)),
                last_stats: ConnectionStats::default(),
            });
            news_rx.push(rx);
        }

        let futures_symbols = match &config.chart.futures_symbols {
            Some(list) => list
                .iter()
                .map(|s| Symbol::parse(s))
                .collect::<Result<HashSet<_>, _>>()?,
            None => HashSet::new(),
        };

        let client = Arc::new(KlineClient::new(
            &market.futures_rest_url,
            &market.spot_rest_url,
        )?);
        let (history_tx, history_rx) = mpsc::channel(HISTORY_CHANNEL_CAPACITY);
        let aggregator = NewsAggregator::new(config.news.aggregator_config());

        Ok(Self {
            futures,
            spot,
            news,
            inbound: Some(Inbound {
                futures_rx,
                spot_rx,
                news_rx,
                history_rx,
            }),
            parser: MessageParser::new(),
            prices: Arc::new(PriceBoard::new()),
            aggregator,
            sink: Box::new(LogSink),
            stitcher: SeriesStitcher::new(),
            client,
            futures_symbols,
            history_tx,
            config,
        })
    }

    /// Replace the notification sink (log-only by default).
    pub fn with_notification_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Fetch the futures listings unless the configuration provides them.
    ///
    /// On failure every chart falls back to spot.
    pub async fn load_futures_symbols(&mut self) {
        if self.config.chart.futures_symbols.is_some() {
            return;
        }
        match self.client.fetch_futures_symbols().await {
            Ok(symbols) => self.futures_symbols = symbols,
            Err(e) => warn!(%e, "Futures listings unavailable, charts use spot"),
        }
    }

    pub fn price_board(&self) -> Arc<PriceBoard> {
        self.prices.clone()
    }

    pub fn aggregator(&self) -> &NewsAggregator {
        &self.aggregator
    }

    /// Receive every batch of newly observed news items.
    pub fn subscribe_news(&self) -> broadcast::Receiver<NewItems> {
        self.aggregator.subscribe()
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.aggregator.set_audio_enabled(enabled);
    }

    pub fn stitcher(&self) -> &SeriesStitcher {
        &self.stitcher
    }

    pub fn multiplexer(&self, venue: Venue) -> &Arc<SubscriptionMultiplexer> {
        &self.market_stream(venue).mux
    }

    /// Stop tracking a symbol's mark price and drop it from the board.
    ///
    /// Returns `false` if the symbol was not tracked.
    pub fn untrack_symbol(&mut self, symbol: &Symbol) -> bool {
        let removed = self.futures.unsubscribe([Topic::mark_price(symbol)]);
        if removed.is_empty() {
            return false;
        }
        self.prices.remove(symbol);
        debug!(%symbol, "Stopped tracking mark price");
        true
    }

    /// Change the chart selection and start loading its history.
    ///
    /// Returns the selection generation. Must be called within the runtime.
    pub fn change_chart(&mut self, symbol: Symbol, interval: Interval) -> u64 {
        let ticket = self.select_chart(symbol, interval);
        let generation = ticket.generation;
        self.spawn_history_fetch(ticket);
        generation
    }

    /// Moves the live kline subscription to the new topic and returns the
    /// ticket for the history fetch. The previous series is discarded.
    fn select_chart(&mut self, symbol: Symbol, interval: Interval) -> FetchTicket {
        let venue = Venue::select(self.futures_symbols.contains(&symbol), interval);
        let ticket = self.stitcher.select(Selection::new(symbol, interval, venue));
        let topic = ticket.selection.topic();

        if let Some(old) = &ticket.replaced {
            if old.venue != venue || old.topic() != topic {
                self.market_stream(old.venue).unsubscribe([old.topic()]);
            }
        }
        self.market_stream(venue).subscribe([topic]);
        ticket
    }

    /// Run the application until Ctrl-C.
    pub async fn run(mut self) -> AppResult<()> {
        let Inbound {
            mut futures_rx,
            mut spot_rx,
            news_rx,
            mut history_rx,
        } = self
            .inbound
            .take()
            .ok_or_else(|| AppError::Config("Application already started".to_string()))?;

        info!(news_sources = self.news.len(), "Starting application");

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        for stream in [&self.futures, &self.spot] {
            tasks.push(spawn_connection(stream.label.to_string(), stream.manager.clone()));
            tasks.push(tokio::spawn(track_state(
                stream.label.to_string(),
                stream.manager.subscribe_state(),
            )));
        }

        let (news_tx, mut news_frames) = mpsc::channel::<(usize, WsMessage)>(NEWS_CHANNEL_CAPACITY);
        for (idx, (stream, rx)) in self.news.iter().zip(news_rx).enumerate() {
            tasks.push(spawn_connection(stream.label.clone(), stream.manager.clone()));
            tasks.push(tokio::spawn(track_state(
                stream.label.clone(),
                stream.manager.subscribe_state(),
            )));
            tasks.push(tokio::spawn(forward_news(idx, rx, news_tx.clone())));
        }
        drop(news_tx);

        let symbol = Symbol::parse(&self.config.chart.symbol)?;
        self.change_chart(symbol, self.config.chart.interval);

        let period = Duration::from_secs(self.config.telemetry.stats_interval_secs.max(1));
        let mut stats_interval = tokio::time::interval(period);

        info!("Entering main event loop");
        loop {
            tokio::select! {
                Some(msg) = futures_rx.recv() => {
                    if let Err(e) = self.handle_market_frame(Venue::Futures, msg) {
                        warn!(?e, "Futures frame handling error");
                    }
                }
                Some(msg) = spot_rx.recv() => {
                    if let Err(e) = self.handle_market_frame(Venue::Spot, msg) {
                        warn!(?e, "Spot frame handling error");
                    }
                }
                Some((idx, msg)) = news_frames.recv() => {
                    if let Err(e) = self.handle_news_frame(idx, msg) {
                        warn!(?e, "News frame handling error");
                    }
                }
                Some(outcome) = history_rx.recv() => self.on_history(outcome),
                _ = stats_interval.tick() => self.record_stats(),
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(
            merged_news = self.aggregator.merged().len(),
            symbols = self.prices.len(),
            candles = self.stitcher.series().len(),
            "Shutting down"
        );

        self.stitcher.cancel_inflight();
        self.futures.manager.shutdown();
        self.spot.manager.shutdown();
        for stream in &self.news {
            stream.manager.shutdown();
        }
        for task in tasks {
            task.abort();
        }

        match Metrics::render() {
            Ok(text) => debug!(metrics = %text, "Final metrics"),
            Err(e) => warn!(%e, "Failed to render metrics"),
        }
        Ok(())
    }

    fn market_stream(&self, venue: Venue) -> &MarketStream {
        match venue {
            Venue::Futures => &self.futures,
            Venue::Spot => &self.spot,
        }
    }

    fn spawn_history_fetch(&self, ticket: FetchTicket) {
        let client = self.client.clone();
        let tx = self.history_tx.clone();

        tokio::spawn(async move {
            let result = fetch_history(client.as_ref(), &ticket).await;
            let outcome = HistoryOutcome {
                generation: ticket.generation,
                venue: ticket.selection.venue,
                result,
            };
            if tx.send(outcome).await.is_err() {
                debug!(generation = ticket.generation, "Event loop gone, history dropped");
            }
        });
    }

    fn on_history(&mut self, outcome: HistoryOutcome) {
        let venue = outcome.venue.to_string();
        let Some(result) = outcome.result else {
            Metrics::history_fetch(&venue, "cancelled");
            return;
        };

        match self.stitcher.resolve_fetch(outcome.generation, result) {
            Ok(true) => Metrics::history_fetch(&venue, "loaded"),
            Ok(false) => Metrics::history_fetch(&venue, "stale"),
            Err(e) => {
                warn!(%e, "History unavailable, keeping the current series");
                Metrics::history_fetch(&venue, "failed");
            }
        }
    }

    fn handle_market_frame(&mut self, venue: Venue, msg: WsMessage) -> AppResult<()> {
        let WsMessage::Stream(frame) = msg else {
            debug!(%venue, "Ignoring non-stream market frame");
            return Ok(());
        };

        match self.parser.parse_stream_frame(&frame)? {
            Some(MarketEvent::MarkPrice(tick)) => self.prices.apply(tick),
            Some(MarketEvent::Kline {
                symbol,
                interval,
                candle,
                ..
            }) => {
                let outcome = if self.stitcher.selection().map(|s| s.venue) == Some(venue) {
                    self.stitcher.apply_delta(&symbol, interval, candle)
                } else {
                    DeltaOutcome::Ignored
                };
                Metrics::candle_delta(outcome.as_str());
            }
            None => Metrics::frames_dropped(self.market_stream(venue).label, "unparsed", 1),
        }
        Ok(())
    }

    /// Feed one frame from news source `idx` into the merged feed.
    ///
    /// Returns how many merged items are new.
    fn handle_news_frame(&mut self, idx: usize, msg: WsMessage) -> AppResult<usize> {
        let Some(stream) = self.news.get(idx) else {
            return Err(AppError::Config(format!("Unknown news source index {idx}")));
        };
        let name = stream.name.clone();

        let Some(update) = normalize_frame(stream.kind, msg)? else {
            return Ok(0);
        };
        let new_items = self.aggregator.apply(&name, update)?;
        Metrics::news_merged(&name);

        let Some(new_items) = new_items else {
            return Ok(0);
        };
        Metrics::news_new_items(&name, new_items.items.len());
        dispatch_notifications(&new_items, self.sink.as_ref());

        let added = self.track_coins(&new_items);
        if !added.is_empty() {
            info!(count = added.len(), "Tracking prices for coins in news");
        }
        Ok(new_items.items.len())
    }

    /// Subscribe the mark price of every coin mentioned by new items.
    fn track_coins(&self, new_items: &NewItems) -> Vec<Topic> {
        let topics: Vec<Topic> = new_items
            .items
            .iter()
            .flat_map(|item| item.message.coins())
            .filter_map(|coin| match Symbol::for_coin(&coin) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    debug!(%coin, %e, "Coin has no tradable symbol");
                    None
                }
            })
            .filter(|symbol| self.futures_symbols.is_empty() || self.futures_symbols.contains(symbol))
            .map(|symbol| Topic::mark_price(&symbol))
            .collect();

        self.futures.subscribe(topics)
    }

    fn record_stats(&mut self) {
        for stream in [&mut self.futures, &mut self.spot] {
            record_drops(stream.label, &stream.manager, &mut stream.last_stats);
        }
        for stream in &mut self.news {
            record_drops(&stream.label, &stream.manager, &mut stream.last_stats);
        }

        let parse = self.parser.stats();
        debug!(
            parsed = parse.accepted(),
            ignored = parse.ignored(),
            merge_passes = self.aggregator.passes(),
            symbols = self.prices.len(),
            "Periodic stats"
        );
    }
}

fn record_drops(label: &str, manager: &ConnectionManager, last: &mut ConnectionStats) {
    let stats = manager.stats();
    Metrics::frames_dropped(
        label,
        "malformed",
        stats.malformed_frames.saturating_sub(last.malformed_frames),
    );
    Metrics::frames_dropped(
        label,
        "unrouted",
        stats.unrouted_frames.saturating_sub(last.unrouted_frames),
    );
    *last = stats;
}

fn spawn_connection(label: String, manager: Arc<ConnectionManager>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match manager.connect().await {
            Ok(()) => info!(connection = %label, "Connection stopped"),
            Err(WsError::ReconnectExhausted { attempts }) => {
                error!(connection = %label, attempts, "Connection abandoned");
            }
            Err(e) => error!(connection = %label, %e, "Connection failed"),
        }
    })
}

async fn track_state(label: String, mut state_rx: watch::Receiver<ConnectionState>) {
    loop {
        let state = *state_rx.borrow_and_update();
        Metrics::ws_state_set(&label, state.as_str());
        if state == ConnectionState::Reconnecting {
            Metrics::ws_reconnect(&label);
        }
        if state_rx.changed().await.is_err() {
            break;
        }
    }
}

async fn forward_news(
    idx: usize,
    mut rx: mpsc::Receiver<WsMessage>,
    tx: mpsc::Sender<(usize, WsMessage)>,
) {
    while let Some(msg) = rx.recv().await {
        if tx.send((idx, msg)).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NewsSourceConfig;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Mutex;
    use tape_core::{NewsMessage, Price};
    use tape_ws::StreamFrame;

    /// Sink that remembers every requested sound.
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl NotificationSink for Recorder {
        fn play(&self, sound: &str, _message: &NewsMessage) {
            self.0.lock().unwrap().push(sound.to_string());
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.news.sources = vec![NewsSourceConfig {
            name: "terminal".to_string(),
            url: "ws://127.0.0.1:1".to_string(),
            kind: NewsSourceKind::Terminal,
            max_reconnect_attempts: 1,
            reconnect_interval_ms: 10,
            heartbeat: None,
        }];
        config.news.audio_enabled = true;
        config.chart.futures_symbols = Some(vec![
            "BTCUSDT".to_string(),
            "SOLUSDT".to_string(),
            "1000PEPEUSDT".to_string(),
        ]);
        config
    }

    fn btc() -> Symbol {
        Symbol::parse("BTCUSDT").unwrap()
    }

    fn kline_frame(stream: &str, start_ms: i64, close: &str) -> WsMessage {
        WsMessage::Stream(StreamFrame {
            stream: stream.to_string(),
            data: json!({
                "e": "kline",
                "E": start_ms + 500,
                "s": "BTCUSDT",
                "k": {
                    "t": start_ms,
                    "i": "1m",
                    "o": "50000",
                    "h": "50600",
                    "l": "49900",
                    "c": close,
                    "q": "1234.5",
                    "x": false
                }
            }),
        })
    }

    fn candle(time: i64, close: Decimal) -> Candle {
        let p = Price::new(close);
        Candle::new(time, p, p, p, p, dec!(1))
    }

    #[test]
    fn test_news_frame_tracks_mentioned_coins() {
        let sounds = Arc::new(Mutex::new(Vec::new()));
        let mut app = Application::new(config())
            .unwrap()
            .with_notification_sink(Box::new(Recorder(sounds.clone())));

        let frame = WsMessage::Payload(json!({
            "_id": "n1",
            "title": "Tree News",
            "body": "SOL and PEPE surge",
            "time": 1_700_000_000_000i64,
            "coin": "SOL",
            "suggestions": [{"coin": "PEPE"}, {"coin": "DOGE"}]
        }));
        assert_eq!(app.handle_news_frame(0, frame.clone()).unwrap(), 1);

        let mux = app.multiplexer(Venue::Futures);
        assert!(mux.is_wanted(&Topic::new("solusdt@markPrice@1s")));
        assert!(mux.is_wanted(&Topic::new("1000pepeusdt@markPrice@1s")));
        // not listed on futures
        assert!(!mux.is_wanted(&Topic::new("dogeusdt@markPrice@1s")));

        assert_eq!(sounds.lock().unwrap().as_slice(), ["default".to_string()]);
        assert_eq!(app.aggregator().merged()[0].source, "Tree News");

        // the same item again is not new
        assert_eq!(app.handle_news_frame(0, frame).unwrap(), 0);
        assert_eq!(sounds.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_news_index_rejected() {
        let mut app = Application::new(config()).unwrap();
        let result = app.handle_news_frame(7, WsMessage::Payload(json!({})));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_mark_price_updates_board() {
        let mut app = Application::new(config()).unwrap();
        let frame = WsMessage::Stream(StreamFrame {
            stream: "btcusdt@markPrice@1s".to_string(),
            data: json!({"e": "markPriceUpdate", "E": 1_700_000_000_000i64, "s": "BTCUSDT", "p": "50123.5"}),
        });

        app.handle_market_frame(Venue::Futures, frame).unwrap();
        let tick = app.price_board().get(&btc()).unwrap();
        assert_eq!(tick.price.inner(), dec!(50123.5));
    }

    #[test]
    fn test_untracked_symbol_leaves_board() {
        let mut app = Application::new(config()).unwrap();
        let frame = WsMessage::Payload(json!({
            "_id": "n1",
            "source": "Blogs",
            "title": "SOL upgrade",
            "time": 1_700_000_000_000i64,
            "coin": "SOL"
        }));
        app.handle_news_frame(0, frame).unwrap();

        let sol = Symbol::parse("SOLUSDT").unwrap();
        let tick = WsMessage::Stream(StreamFrame {
            stream: "solusdt@markPrice@1s".to_string(),
            data: json!({"e": "markPriceUpdate", "E": 1_700_000_000_000i64, "s": "SOLUSDT", "p": "150"}),
        });
        app.handle_market_frame(Venue::Futures, tick).unwrap();
        assert!(app.price_board().get(&sol).is_some());

        assert!(app.untrack_symbol(&sol));
        assert!(app.price_board().get(&sol).is_none());
        assert!(!app
            .multiplexer(Venue::Futures)
            .is_wanted(&Topic::new("solusdt@markPrice@1s")));
        assert!(!app.untrack_symbol(&sol));
    }

    #[test]
    fn test_live_kline_stitched_into_selection() {
        let mut app = Application::new(config()).unwrap();
        let ticket = app.select_chart(btc(), Interval::Min1);
        assert_eq!(ticket.selection.venue, Venue::Futures);
        assert!(app
            .multiplexer(Venue::Futures)
            .is_wanted(&Topic::new("btcusdt@kline_1m")));

        app.on_history(HistoryOutcome {
            generation: ticket.generation,
            venue: Venue::Futures,
            result: Some(Ok(vec![candle(1000, dec!(50000))])),
        });

        app.handle_market_frame(Venue::Futures, kline_frame("btcusdt@kline_1m", 1_000_000, "50500"))
            .unwrap();
        let series = app.stitcher().series();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].close.inner(), dec!(50500));
        assert_eq!(series[0].volume, dec!(1234.5));

        app.handle_market_frame(Venue::Futures, kline_frame("btcusdt@kline_1m", 1_060_000, "50550"))
            .unwrap();
        assert_eq!(app.stitcher().series().len(), 2);

        // the same kline from the other venue is not part of this series
        app.handle_market_frame(Venue::Spot, kline_frame("btcusdt@kline_1m", 1_120_000, "1"))
            .unwrap();
        assert_eq!(app.stitcher().series().len(), 2);
    }

    #[test]
    fn test_selection_change_moves_kline_subscription() {
        let mut app = Application::new(config()).unwrap();
        let first = app.select_chart(btc(), Interval::Min1);

        let eth = Symbol::parse("ETH/USDT").unwrap();
        let second = app.select_chart(eth, Interval::Sec1);
        assert!(first.token.is_cancelled());
        assert_eq!(second.selection.venue, Venue::Spot);

        assert!(!app
            .multiplexer(Venue::Futures)
            .is_wanted(&Topic::new("btcusdt@kline_1m")));
        assert!(app
            .multiplexer(Venue::Spot)
            .is_wanted(&Topic::new("ethusdt@kline_1s")));

        // the superseded fetch resolves late and is discarded
        app.on_history(HistoryOutcome {
            generation: first.generation,
            venue: Venue::Futures,
            result: Some(Ok(vec![candle(1000, dec!(50000))])),
        });
        assert!(app.stitcher().series().is_empty());
    }
}
