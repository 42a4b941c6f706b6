//! Streaming connection layer for the tape terminal.
//!
//! Provides:
//! - One physical websocket per endpoint with fixed-interval reconnect
//! - Optional text heartbeat (`ping` / `pong`)
//! - Topic multiplexing over a combined stream with delta subscribe frames
//!   and a full resubscribe on every (re)open
//! - Channel-based outbound writes that are dropped while disconnected

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod subscription;
pub mod ws_write_handle;

pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStats, HeartbeatConfig,
};
pub use error::{WsError, WsResult};
pub use heartbeat::{HeartbeatManager, HeartbeatStats};
pub use message::{ControlMethod, StreamFrame, SubscriptionAck, WsMessage, WsRequest};
pub use subscription::SubscriptionMultiplexer;
pub use ws_write_handle::{SendError, WsOutbound, WsWriteHandle};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
