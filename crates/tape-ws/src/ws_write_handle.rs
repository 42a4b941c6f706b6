//! WebSocket write handle.
//!
//! Outbound frames go through a bounded channel drained by the connection's
//! message loop. Sends while disconnected are rejected rather than queued:
//! callers re-issue their state on the next open.

use crate::connection::ConnectionState;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound message to be sent via WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsOutbound {
    Text(String),
}

/// Why an outbound frame was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Connection is not open; the frame is dropped.
    NotConnected,
    /// Outbound queue is full.
    Full,
    /// Connection manager is gone.
    ChannelClosed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Full => write!(f, "outbound queue full"),
            Self::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for SendError {}

/// Cloneable handle for sending frames on a managed connection.
#[derive(Clone)]
pub struct WsWriteHandle {
    tx: mpsc::Sender<WsOutbound>,
    state: Arc<RwLock<ConnectionState>>,
}

impl WsWriteHandle {
    pub fn new(tx: mpsc::Sender<WsOutbound>, state: Arc<RwLock<ConnectionState>>) -> Self {
        Self { tx, state }
    }

    /// Queue a text frame, waiting for queue capacity.
    pub async fn send_text(&self, text: String) -> Result<(), SendError> {
        if !self.is_connected() {
            debug!("Dropping outbound frame while disconnected");
            return Err(SendError::NotConnected);
        }

        self.tx
            .send(WsOutbound::Text(text))
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Queue a text frame without waiting.
    pub fn try_send_text(&self, text: String) -> Result<(), SendError> {
        if !self.is_connected() {
            debug!("Dropping outbound frame while disconnected");
            return Err(SendError::NotConnected);
        }

        self.tx.try_send(WsOutbound::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    pub fn is_connected(&self) -> bool {
        *self.state.read() == ConnectionState::Connected && !self.tx.is_closed()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle(state: ConnectionState) -> (WsWriteHandle, mpsc::Receiver<WsOutbound>) {
        let (tx, rx) = mpsc::channel(4);
        let handle = WsWriteHandle::new(tx, Arc::new(RwLock::new(state)));
        (handle, rx)
    }

    #[tokio::test]
    async fn test_send_text_success() {
        let (handle, mut rx) = create_test_handle(ConnectionState::Connected);

        handle.send_text("hello".to_string()).await.unwrap();
        assert_eq!(rx.recv().await, Some(WsOutbound::Text("hello".to_string())));
    }

    #[tokio::test]
    async fn test_send_dropped_while_disconnected() {
        let (handle, mut rx) = create_test_handle(ConnectionState::Reconnecting);

        assert_eq!(
            handle.send_text("hello".to_string()).await,
            Err(SendError::NotConnected)
        );
        assert_eq!(handle.try_send_text("hello".to_string()), Err(SendError::NotConnected));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_try_send_full_queue() {
        let (handle, _rx) = create_test_handle(ConnectionState::Connected);
        for i in 0..4 {
            handle.try_send_text(i.to_string()).unwrap();
        }
        assert_eq!(handle.try_send_text("overflow".to_string()), Err(SendError::Full));
    }

    #[test]
    fn test_closed_channel() {
        let (handle, rx) = create_test_handle(ConnectionState::Connected);
        drop(rx);
        assert!(!handle.is_connected());
        assert!(handle.is_closed());
    }
}
