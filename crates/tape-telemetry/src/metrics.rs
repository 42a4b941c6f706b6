//! Prometheus metrics for the market tape.
//!
//! Covers:
//! - Stream connection state and reconnects
//! - Subscription control frames and dropped inbound frames
//! - News merge passes and newly observed items
//! - Chart history fetches and live deltas
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which must crash at startup. These panics only
//! occur during static initialization.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_int_gauge_vec, CounterVec, Encoder, GaugeVec,
    IntGaugeVec, TextEncoder,
};

const CONNECTION_STATES: [&str; 4] = ["disconnected", "connecting", "connected", "reconnecting"];

/// Connection state machine current state.
/// Labels: connection, state
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "tape_ws_state",
        "Connection state machine current state (1=active, 0=inactive)",
        &["connection", "state"]
    )
    .unwrap()
});

/// Total reconnection attempts.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tape_ws_reconnect_total",
        "Total reconnection attempts",
        &["connection"]
    )
    .unwrap()
});

/// Inbound frames dropped before reaching a consumer.
/// Labels: connection, reason (malformed/unrouted/unparsed)
pub static WS_DROPPED_FRAMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tape_ws_dropped_frames_total",
        "Inbound frames dropped before reaching a consumer",
        &["connection", "reason"]
    )
    .unwrap()
});

/// Subscription control frames sent.
/// Labels: connection, method (SUBSCRIBE/UNSUBSCRIBE)
pub static SUBSCRIPTION_FRAMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tape_subscription_frames_total",
        "Subscription control frames sent",
        &["connection", "method"]
    )
    .unwrap()
});

/// Topics currently wanted per connection.
pub static SUBSCRIBED_TOPICS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tape_subscribed_topics",
        "Topics currently wanted",
        &["connection"]
    )
    .unwrap()
});

/// News merge passes.
pub static NEWS_MERGE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tape_news_merge_total",
        "News merge passes",
        &["source"]
    )
    .unwrap()
});

/// Newly observed merged news items.
pub static NEWS_NEW_ITEMS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tape_news_new_items_total",
        "Newly observed merged news items",
        &["source"]
    )
    .unwrap()
});

/// Live candle deltas by outcome (replaced/appended/rejected/ignored).
pub static CANDLE_DELTAS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tape_candle_deltas_total",
        "Live candle deltas by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// History fetches by outcome (loaded/stale/cancelled/failed).
pub static HISTORY_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tape_history_fetch_total",
        "History fetches by outcome",
        &["venue", "outcome"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Set the connection state. Only the active state is 1.
    pub fn ws_state_set(connection: &str, state: &str) {
        for s in CONNECTION_STATES {
            WS_STATE.with_label_values(&[connection, s]).set(0.0);
        }
        WS_STATE.with_label_values(&[connection, state]).set(1.0);
    }

    pub fn ws_reconnect(connection: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[connection]).inc();
    }

    /// Record `count` dropped frames.
    pub fn frames_dropped(connection: &str, reason: &str, count: u64) {
        if count > 0 {
            WS_DROPPED_FRAMES_TOTAL
                .with_label_values(&[connection, reason])
                .inc_by(count as f64);
        }
    }

    pub fn subscription_frame(connection: &str, method: &str) {
        SUBSCRIPTION_FRAMES_TOTAL
            .with_label_values(&[connection, method])
            .inc();
    }

    pub fn subscribed_topics(connection: &str, count: usize) {
        SUBSCRIBED_TOPICS
            .with_label_values(&[connection])
            .set(count as i64);
    }

    pub fn news_merged(source: &str) {
        NEWS_MERGE_TOTAL.with_label_values(&[source]).inc();
    }

    pub fn news_new_items(source: &str, count: usize) {
        if count > 0 {
            NEWS_NEW_ITEMS_TOTAL
                .with_label_values(&[source])
                .inc_by(count as f64);
        }
    }

    pub fn candle_delta(outcome: &str) {
        CANDLE_DELTAS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn history_fetch(venue: &str, outcome: &str) {
        HISTORY_FETCH_TOTAL.with_label_values(&[venue, outcome]).inc();
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_active_state() {
        Metrics::ws_state_set("test-state", "connecting");
        Metrics::ws_state_set("test-state", "connected");

        assert_eq!(WS_STATE.with_label_values(&["test-state", "connected"]).get(), 1.0);
        assert_eq!(WS_STATE.with_label_values(&["test-state", "connecting"]).get(), 0.0);
    }

    #[test]
    fn test_zero_counts_not_recorded() {
        Metrics::frames_dropped("test-drop", "malformed", 0);
        Metrics::frames_dropped("test-drop", "unrouted", 3);

        assert_eq!(
            WS_DROPPED_FRAMES_TOTAL
                .with_label_values(&["test-drop", "unrouted"])
                .get(),
            3.0
        );
        let rendered = Metrics::render().unwrap();
        assert!(rendered.contains("tape_ws_dropped_frames_total"));
        assert!(!rendered.contains("connection=\"test-drop\",reason=\"malformed\""));
    }
}
