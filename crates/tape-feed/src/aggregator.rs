//! Stateful news aggregation.
//!
//! Holds the latest snapshot of every configured source, re-merges on each
//! change and publishes the merged items whose identity was not present in
//! the previous pass. A pass whose identity set equals the previous one
//! leaves all state untouched and publishes nothing.

use crate::dedup::{assign_identities, merge, DEFAULT_CAP};
use crate::error::{FeedError, FeedResult};
use crate::news_source::SourceUpdate;
use std::collections::{HashMap, HashSet};
use tape_core::{MessageIdentity, NewsMessage};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Per-source snapshot bound.
pub const DEFAULT_SNAPSHOT_WINDOW: usize = 500;
pub const DEFAULT_SOUND: &str = "default";

const EVENT_CAPACITY: usize = 64;

/// Aggregator settings.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Source names in merge priority order.
    pub sources: Vec<String>,
    pub cap: usize,
    pub snapshot_window: usize,
    pub audio_enabled: bool,
    /// Sound per source name, matched case-insensitively.
    pub sounds: HashMap<String, String>,
    pub default_sound: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            cap: DEFAULT_CAP,
            snapshot_window: DEFAULT_SNAPSHOT_WINDOW,
            audio_enabled: false,
            sounds: HashMap::new(),
            default_sound: DEFAULT_SOUND.to_string(),
        }
    }
}

/// A merged item seen for the first time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub identity: MessageIdentity,
    pub message: NewsMessage,
    /// Resolved notification sound.
    pub sound: String,
}

/// Items that appeared in one merge pass, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItems {
    pub items: Vec<NewItem>,
    /// Audio state when the pass ran.
    pub audio_enabled: bool,
}

/// Merges every news source into one deduplicated sequence.
pub struct NewsAggregator {
    names: Vec<String>,
    snapshots: Vec<Vec<NewsMessage>>,
    cap: usize,
    snapshot_window: usize,
    merged: Vec<NewsMessage>,
    identities: Vec<MessageIdentity>,
    identity_set: HashSet<MessageIdentity>,
    audio_enabled: bool,
    sounds: HashMap<String, String>,
    default_sound: String,
    events: broadcast::Sender<NewItems>,
    passes: u64,
}

impl NewsAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        let sounds = config
            .sounds
            .into_iter()
            .map(|(name, sound)| (name.to_lowercase(), sound))
            .collect();

        Self {
            snapshots: vec![Vec::new(); config.sources.len()],
            names: config.sources,
            cap: config.cap,
            snapshot_window: config.snapshot_window,
            merged: Vec::new(),
            identities: Vec::new(),
            identity_set: HashSet::new(),
            audio_enabled: config.audio_enabled,
            sounds,
            default_sound: config.default_sound,
            events: broadcast::channel(EVENT_CAPACITY).0,
            passes: 0,
        }
    }

    /// Receive every future `NewItems` event.
    pub fn subscribe(&self) -> broadcast::Receiver<NewItems> {
        self.events.subscribe()
    }

    /// Replace a source's snapshot (newest first) and re-merge.
    pub fn replace_snapshot(
        &mut self,
        source: &str,
        mut messages: Vec<NewsMessage>,
    ) -> FeedResult<Option<NewItems>> {
        let idx = self.source_index(source)?;
        messages.truncate(self.snapshot_window);
        self.snapshots[idx] = messages;
        Ok(self.recompute())
    }

    /// Prepend one message to a source's snapshot and re-merge.
    pub fn push_message(&mut self, source: &str, message: NewsMessage) -> FeedResult<Option<NewItems>> {
        let idx = self.source_index(source)?;
        let window = self.snapshot_window;
        let snapshot = &mut self.snapshots[idx];
        snapshot.insert(0, message);
        snapshot.truncate(window);
        Ok(self.recompute())
    }

    pub fn apply(&mut self, source: &str, update: SourceUpdate) -> FeedResult<Option<NewItems>> {
        match update {
            SourceUpdate::Message(message) => self.push_message(source, message),
            SourceUpdate::Snapshot(messages) => self.replace_snapshot(source, messages),
        }
    }

    /// Current merged sequence, newest first.
    pub fn merged(&self) -> &[NewsMessage] {
        &self.merged
    }

    /// Merged messages paired with their identities.
    pub fn entries(&self) -> impl Iterator<Item = (&MessageIdentity, &NewsMessage)> {
        self.identities.iter().zip(self.merged.iter())
    }

    pub fn snapshot(&self, source: &str) -> FeedResult<&[NewsMessage]> {
        let idx = self.source_index(source)?;
        Ok(&self.snapshots[idx])
    }

    pub fn sources(&self) -> &[String] {
        &self.names
    }

    /// Merged messages whose title contains `keyword`, ignoring case.
    pub fn search(&self, keyword: &str) -> Vec<&NewsMessage> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return self.merged.iter().collect();
        }
        self.merged
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&needle))
            .collect()
    }

    /// Notification sound for a source name.
    pub fn sound_for(&self, source: &str) -> &str {
        self.sounds
            .get(&source.to_lowercase())
            .map(String::as_str)
            .unwrap_or(&self.default_sound)
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.audio_enabled = enabled;
    }

    /// Merge passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    fn source_index(&self, source: &str) -> FeedResult<usize> {
        self.names
            .iter()
            .position(|name| name == source)
            .ok_or_else(|| FeedError::UnknownSource(source.to_string()))
    }

    fn recompute(&mut self) -> Option<NewItems> {
        self.passes += 1;
        let merged = merge(&self.snapshots, self.cap);
        let identities = assign_identities(&merged);
        let identity_set: HashSet<MessageIdentity> = identities.iter().cloned().collect();

        if identity_set == self.identity_set {
            debug!(pass = self.passes, "Merged identity set unchanged");
            return None;
        }

        let items: Vec<NewItem> = identities
            .iter()
            .zip(merged.iter())
            .filter(|(identity, _)| !self.identity_set.contains(*identity))
            .map(|(identity, message)| NewItem {
                identity: identity.clone(),
                message: message.clone(),
                sound: self.sound_for(&message.source).to_string(),
            })
            .collect();

        self.merged = merged;
        self.identities = identities;
        self.identity_set = identity_set;

        if items.is_empty() {
            return None;
        }

        info!(count = items.len(), total = self.merged.len(), "New news items");
        let event = NewItems {
            items,
            audio_enabled: self.audio_enabled,
        };
        // No receivers is fine: the return value still carries the event.
        let _ = self.events.send(event.clone());
        Some(event)
    }
}
