//! WebSocket connection manager.
//!
//! Handles connection lifecycle, reconnection on a fixed interval, the text
//! heartbeat and delivery of parsed inbound frames. When a multiplexer is
//! attached it is told about every open and close so it can resubscribe.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::WsMessage;
use crate::subscription::SubscriptionMultiplexer;
use crate::ws_write_handle::{WsOutbound, WsWriteHandle};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const OUTBOUND_CAPACITY: usize = 100;

/// Text heartbeat settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Probe period.
    pub interval_ms: u64,
    /// Probe text.
    pub payload: String,
    /// Reply text, recognized and discarded.
    pub pong_payload: String,
    /// Reconnect when a probe stays unanswered this long. `None` never times out.
    pub timeout_ms: Option<u64>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            payload: "ping".to_string(),
            pong_payload: "pong".to_string(),
            timeout_ms: None,
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Consecutive failed reconnects allowed before giving up (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_interval_ms: u64,
    pub heartbeat: Option<HeartbeatConfig>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0, // Infinite
            reconnect_interval_ms: 3_000,
            heartbeat: None,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Counters exposed for telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Successful opens, including the first.
    pub opens: u64,
    /// Non-JSON frames dropped.
    pub malformed_frames: u64,
    /// Stream frames dropped because their topic is not wanted.
    pub unrouted_frames: u64,
}

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;
type WsStream = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Owns one physical websocket and keeps it alive.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    state_tx: watch::Sender<ConnectionState>,
    heartbeat: Option<HeartbeatManager>,
    multiplexer: Option<Arc<SubscriptionMultiplexer>>,
    message_tx: mpsc::Sender<WsMessage>,
    reconnect_count: RwLock<u32>,
    outbound_tx: mpsc::Sender<WsOutbound>,
    outbound_rx: TokioMutex<mpsc::Receiver<WsOutbound>>,
    shutdown_token: CancellationToken,
    running: AtomicBool,
    opens: AtomicU64,
    malformed_frames: AtomicU64,
    unrouted_frames: AtomicU64,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, message_tx: mpsc::Sender<WsMessage>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let heartbeat = config
            .heartbeat
            .as_ref()
            .map(|hb| HeartbeatManager::new(hb.interval_ms, hb.timeout_ms));

        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            state_tx: watch::channel(ConnectionState::Disconnected).0,
            heartbeat,
            multiplexer: None,
            message_tx,
            reconnect_count: RwLock::new(0),
            outbound_tx,
            outbound_rx: TokioMutex::new(outbound_rx),
            shutdown_token: CancellationToken::new(),
            running: AtomicBool::new(false),
            opens: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            unrouted_frames: AtomicU64::new(0),
        }
    }

    /// Attach a topic multiplexer fed by this connection.
    pub fn with_multiplexer(mut self, multiplexer: Arc<SubscriptionMultiplexer>) -> Self {
        self.multiplexer = Some(multiplexer);
        self
    }

    /// Handle for queueing outbound frames.
    pub fn write_handle(&self) -> WsWriteHandle {
        WsWriteHandle::new(self.outbound_tx.clone(), self.state.clone())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            opens: self.opens.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            unrouted_frames: self.unrouted_frames.load(Ordering::Relaxed),
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Signal graceful shutdown of the message and reconnect loops.
    pub fn shutdown(&self) {
        info!(url = %self.config.url, "ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and keep the connection alive until shutdown or until the
    /// reconnect budget is spent.
    ///
    /// Only one `connect` may run per manager at a time.
    pub async fn connect(&self) -> WsResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(WsError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);
        self.connect_with_retry().await
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        self.state_tx.send_replace(state);
    }

    async fn connect_with_retry(&self) -> WsResult<()> {
        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            match self.try_connect().await {
                Ok(()) => info!(url = %self.config.url, "WebSocket connection closed"),
                Err(e) => warn!(url = %self.config.url, %e, "WebSocket connection error"),
            }

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            let attempt = {
                let mut count = self.reconnect_count.write();
                *count += 1;
                *count
            };

            let max = self.config.max_reconnect_attempts;
            if max > 0 && attempt > max {
                error!(url = %self.config.url, attempts = max, "Max reconnection attempts reached");
                self.set_state(ConnectionState::Disconnected);
                return Err(WsError::ReconnectExhausted { attempts: max });
            }

            self.set_state(ConnectionState::Reconnecting);

            let delay = Duration::from_millis(self.config.reconnect_interval_ms);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during reconnect delay, exiting");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = tokio::select! {
            result = connect_async_tls_with_config(&self.config.url, None, true, None) => result?,
            () = self.shutdown_token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = ws_stream.split();

        // Frames queued for an earlier connection are stale.
        let mut outbound_rx = self.outbound_rx.lock().await;
        let mut stale = 0usize;
        while outbound_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale, "Discarded stale outbound frames");
        }

        self.set_state(ConnectionState::Connected);
        *self.reconnect_count.write() = 0;
        self.opens.fetch_add(1, Ordering::Relaxed);
        info!(url = %self.config.url, "WebSocket connected");

        if let Some(hb) = &self.heartbeat {
            hb.reset();
        }
        if let Some(mux) = &self.multiplexer {
            mux.on_open();
        }

        let heartbeat_timer = self.heartbeat.as_ref().map(|hb| {
            let mut timer = tokio::time::interval_at(Instant::now() + hb.interval(), hb.interval());
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        let result = self
            .run_message_loop(&mut write, &mut read, &mut outbound_rx, heartbeat_timer)
            .await;

        if let Some(mux) = &self.multiplexer {
            mux.on_close();
        }
        result
    }

    async fn run_message_loop(
        &self,
        write: &mut WsSink,
        read: &mut WsStream,
        outbound_rx: &mut mpsc::Receiver<WsOutbound>,
        mut heartbeat_timer: Option<Interval>,
    ) -> WsResult<()> {
        loop {
            let heartbeat_tick = async {
                match heartbeat_timer.as_mut() {
                    Some(timer) => {
                        timer.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("Received protocol pong");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                outbound = outbound_rx.recv() => {
                    if let Some(WsOutbound::Text(text)) = outbound {
                        write.send(Message::Text(text)).await?;
                    }
                }

                () = heartbeat_tick => {
                    if let (Some(hb), Some(cfg)) = (&self.heartbeat, &self.config.heartbeat) {
                        if hb.is_timed_out() {
                            error!("Heartbeat timeout");
                            return Err(WsError::HeartbeatTimeout);
                        }
                        write.send(Message::Text(cfg.payload.clone())).await?;
                        hb.record_ping();
                    }
                }
            }
        }
    }

    async fn handle_text_message(&self, text: &str) {
        if let Some(hb) = &self.heartbeat {
            hb.record_message();
        }

        if self.is_heartbeat_reply(text) {
            if let Some(hb) = &self.heartbeat {
                hb.record_pong();
            }
            return;
        }

        let msg: WsMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                self.malformed_frames.fetch_add(1, Ordering::Relaxed);
                warn!(%e, len = text.len(), "Dropping malformed frame");
                return;
            }
        };

        match &msg {
            WsMessage::Ack(ack) => {
                if ack.is_success() {
                    debug!(id = ack.id, "Control frame acknowledged");
                } else {
                    warn!(id = ack.id, result = %ack.result, "Control frame rejected");
                }
                return;
            }
            WsMessage::Stream(frame) => {
                if let Some(mux) = &self.multiplexer {
                    if !mux.route(frame) {
                        self.unrouted_frames.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                }
            }
            WsMessage::Payload(_) => {}
        }

        if self.message_tx.send(msg).await.is_err() {
            warn!("Message receiver dropped");
        }
    }

    fn is_heartbeat_reply(&self, text: &str) -> bool {
        self.config
            .heartbeat
            .as_ref()
            .is_some_and(|hb| text.trim() == hb.pong_payload)
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(config: ConnectionConfig) -> (ConnectionManager, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(16);
        (ConnectionManager::new(config, tx), rx)
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0); // Infinite
        assert_eq!(config.reconnect_interval_ms, 3_000);
        assert!(config.heartbeat.is_none());

        let hb = HeartbeatConfig::default();
        assert_eq!(hb.interval_ms, 10_000);
        assert_eq!(hb.payload, "ping");
        assert_eq!(hb.pong_payload, "pong");
    }

    #[tokio::test]
    async fn test_pong_is_discarded() {
        let (mgr, mut rx) = manager(ConnectionConfig {
            heartbeat: Some(HeartbeatConfig::default()),
            ..Default::default()
        });

        mgr.handle_text_message("pong").await;
        assert!(rx.try_recv().is_err());
        assert_eq!(mgr.stats().malformed_frames, 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped() {
        let (mgr, mut rx) = manager(ConnectionConfig::default());

        mgr.handle_text_message("not json {").await;
        // without a heartbeat, "pong" is just another malformed frame
        mgr.handle_text_message("pong").await;

        assert!(rx.try_recv().is_err());
        assert_eq!(mgr.stats().malformed_frames, 2);
    }

    #[tokio::test]
    async fn test_ack_not_forwarded() {
        let (mgr, mut rx) = manager(ConnectionConfig::default());

        mgr.handle_text_message(r#"{"result":null,"id":1}"#).await;
        assert!(rx.try_recv().is_err());

        mgr.handle_text_message(r#"{"title":"hello"}"#).await;
        assert!(matches!(rx.try_recv(), Ok(WsMessage::Payload(_))));
    }

    #[tokio::test]
    async fn test_unwanted_stream_frame_dropped() {
        let (mgr, mut rx) = manager(ConnectionConfig::default());
        let mux = Arc::new(SubscriptionMultiplexer::new(mgr.write_handle()));
        let mgr = mgr.with_multiplexer(mux.clone());

        let text = r#"{"stream":"btcusdt@markPrice@1s","data":{"e":"markPriceUpdate"}}"#;
        mgr.handle_text_message(text).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(mgr.stats().unrouted_frames, 1);

        mux.add_topics([tape_core::Topic::new("btcusdt@markPrice@1s")]);
        mgr.handle_text_message(text).await;
        assert!(matches!(rx.try_recv(), Ok(WsMessage::Stream(_))));
    }

    #[tokio::test]
    async fn test_second_connect_rejected() {
        let (mgr, _rx) = manager(ConnectionConfig::default());
        mgr.running.store(true, Ordering::Release);

        assert!(matches!(mgr.connect().await, Err(WsError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_reconnect_budget_exhausted() {
        let (mgr, _rx) = manager(ConnectionConfig {
            url: "ws://127.0.0.1:1".to_string(),
            max_reconnect_attempts: 2,
            reconnect_interval_ms: 10,
            heartbeat: None,
        });

        let result = mgr.connect().await;
        assert!(matches!(result, Err(WsError::ReconnectExhausted { attempts: 2 })));
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(!mgr.running.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_shutdown_before_connect() {
        let (mgr, _rx) = manager(ConnectionConfig {
            url: "ws://127.0.0.1:1".to_string(),
            ..Default::default()
        });
        mgr.shutdown();

        assert!(mgr.connect().await.is_ok());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }
}
