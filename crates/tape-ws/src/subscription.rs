//! Topic multiplexing over one combined-stream connection.
//!
//! The multiplexer owns the wanted-topic set. Growth and shrinkage are sent
//! as delta SUBSCRIBE / UNSUBSCRIBE frames while the connection is open;
//! changes made while it is down are only recorded, and the full set is
//! resubscribed once on the next open. A delta that does not fit in the
//! outbound queue is rolled back, so the wanted set never claims a topic the
//! server was not asked for. Inbound frames update the addressed topic's
//! latest value and wake only that topic's listeners.

use crate::message::{ControlMethod, StreamFrame, WsRequest};
use crate::ws_write_handle::{SendError, WsWriteHandle};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tape_core::Topic;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct MuxState {
    wanted: BTreeSet<Topic>,
    /// Whether the underlying connection is open.
    online: bool,
}

/// Shares one connection among many topic subscriptions.
pub struct SubscriptionMultiplexer {
    state: Mutex<MuxState>,
    listeners: RwLock<HashMap<Topic, watch::Sender<Option<StreamFrame>>>>,
    next_id: AtomicU64,
    writer: WsWriteHandle,
}

impl SubscriptionMultiplexer {
    pub fn new(writer: WsWriteHandle) -> Self {
        Self {
            state: Mutex::new(MuxState::default()),
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            writer,
        }
    }

    /// Add topics to the wanted set.
    ///
    /// Returns the topics that were not already wanted. A SUBSCRIBE frame
    /// listing exactly those is sent if the connection is open. If the
    /// outbound queue is full the topics are not added and nothing is
    /// returned.
    pub fn add_topics(&self, topics: impl IntoIterator<Item = Topic>) -> Vec<Topic> {
        let mut state = self.state.lock();
        let added: Vec<Topic> = topics
            .into_iter()
            .filter(|topic| state.wanted.insert(topic.clone()))
            .collect();

        if added.is_empty() {
            return added;
        }

        debug!(count = added.len(), online = state.online, "Topics added");
        if state.online && self.send_control(ControlMethod::Subscribe, &added) == Err(SendError::Full) {
            for topic in &added {
                state.wanted.remove(topic);
            }
            return Vec::new();
        }
        added
    }

    /// Remove topics from the wanted set.
    ///
    /// Returns the topics that were actually wanted. An UNSUBSCRIBE frame is
    /// sent for those if the connection is open, and their last values are
    /// cleared. If the outbound queue is full the topics stay wanted and
    /// nothing is returned.
    pub fn remove_topics(&self, topics: impl IntoIterator<Item = Topic>) -> Vec<Topic> {
        let mut state = self.state.lock();
        let removed: Vec<Topic> = topics
            .into_iter()
            .filter(|topic| state.wanted.remove(topic))
            .collect();

        if removed.is_empty() {
            return removed;
        }

        debug!(count = removed.len(), online = state.online, "Topics removed");
        if state.online && self.send_control(ControlMethod::Unsubscribe, &removed) == Err(SendError::Full) {
            state.wanted.extend(removed);
            return Vec::new();
        }

        let listeners = self.listeners.read();
        for topic in &removed {
            if let Some(tx) = listeners.get(topic) {
                tx.send_replace(None);
            }
        }
        removed
    }

    /// Connection opened: resubscribe the whole wanted set in one frame.
    pub fn on_open(&self) -> usize {
        let mut state = self.state.lock();
        state.online = true;

        let topics: Vec<Topic> = state.wanted.iter().cloned().collect();
        if !topics.is_empty() {
            info!(count = topics.len(), "Resubscribing wanted topics");
            self.send_control(ControlMethod::Subscribe, &topics);
        }
        topics.len()
    }

    /// Connection closed: stop sending deltas until the next open.
    pub fn on_close(&self) {
        self.state.lock().online = false;
    }

    /// Route an inbound stream frame to its topic.
    ///
    /// Returns `false` for frames on topics that are no longer wanted.
    pub fn route(&self, frame: &StreamFrame) -> bool {
        let topic = frame.topic();
        if !self.state.lock().wanted.contains(&topic) {
            debug!(%topic, "Frame for unwanted topic dropped");
            return false;
        }

        if let Some(tx) = self.listeners.read().get(&topic) {
            tx.send_replace(Some(frame.clone()));
        }
        true
    }

    /// Watch the latest frame of one topic.
    ///
    /// Listening does not subscribe; pair with [`Self::add_topics`].
    pub fn listen(&self, topic: &Topic) -> watch::Receiver<Option<StreamFrame>> {
        if let Some(tx) = self.listeners.read().get(topic) {
            return tx.subscribe();
        }

        self.listeners
            .write()
            .entry(topic.clone())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    pub fn wanted(&self) -> Vec<Topic> {
        self.state.lock().wanted.iter().cloned().collect()
    }

    pub fn is_wanted(&self, topic: &Topic) -> bool {
        self.state.lock().wanted.contains(topic)
    }

    pub fn is_online(&self) -> bool {
        self.state.lock().online
    }

    /// Queue a control frame.
    ///
    /// `NotConnected` and `ChannelClosed` need no handling here: the next
    /// open resubscribes the whole wanted set.
    fn send_control(&self, method: ControlMethod, topics: &[Topic]) -> Result<(), SendError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = match method {
            ControlMethod::Subscribe => WsRequest::subscribe(topics, id),
            ControlMethod::Unsubscribe => WsRequest::unsubscribe(topics, id),
        };

        let text = match serde_json::to_string(&request) {
            Ok(text) => text,
            Err(e) => {
                warn!(?e, "Failed to encode control frame");
                return Ok(());
            }
        };

        let result = self.writer.try_send_text(text);
        match &result {
            Ok(()) => debug!(id, method = method.as_str(), count = topics.len(), "Control frame queued"),
            Err(e) => warn!(id, method = method.as_str(), %e, "Control frame dropped"),
        }
        result
    }
}
