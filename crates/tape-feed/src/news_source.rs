//! Boundary normalization of news feeds.
//!
//! Each feed pushes its own JSON shape. Frames are turned into the common
//! `NewsMessage` here, before they reach the aggregator.

use crate::error::{FeedError, FeedResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tape_core::NewsMessage;
use tape_ws::WsMessage;
use tracing::warn;

/// Wire shape of a news feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsSourceKind {
    /// Terminal feed: messages with a `body` carry the author in `title`
    /// and the text in `body`.
    Terminal,
    /// Messages already in the common shape.
    #[default]
    Json,
}

/// What one inbound frame contributes to a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceUpdate {
    /// One new message, prepended to the snapshot.
    Message(NewsMessage),
    /// Full replacement of the source's snapshot, newest first.
    Snapshot(Vec<NewsMessage>),
}

/// Normalize a parsed frame. Stream frames and acknowledgements carry no news.
pub fn normalize_frame(kind: NewsSourceKind, frame: WsMessage) -> FeedResult<Option<SourceUpdate>> {
    match frame {
        WsMessage::Payload(value) => normalize_value(kind, value).map(Some),
        WsMessage::Stream(_) | WsMessage::Ack(_) => Ok(None),
    }
}

/// Normalize a JSON document: an object is one message, an array a snapshot.
///
/// Snapshot items that cannot be read as a message are skipped; the rest of
/// the snapshot is kept.
pub fn normalize_value(kind: NewsSourceKind, value: Value) -> FeedResult<SourceUpdate> {
    match value {
        Value::Array(items) => {
            let mut messages: Vec<NewsMessage> = items
                .into_iter()
                .filter_map(|item| match normalize_message(kind, item) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!(%e, "Skipping unreadable news item");
                        None
                    }
                })
                .collect();
            messages.sort_by(|a, b| b.time.cmp(&a.time));
            Ok(SourceUpdate::Snapshot(messages))
        }
        Value::Object(_) => normalize_message(kind, value).map(SourceUpdate::Message),
        other => Err(FeedError::InvalidData(format!(
            "expected news object or array, got {other}"
        ))),
    }
}

fn normalize_message(kind: NewsSourceKind, mut value: Value) -> FeedResult<NewsMessage> {
    if let Value::Object(map) = &mut value {
        // `_id` wins over a plain `id`
        if let Some(id) = map.remove("id") {
            map.entry("_id").or_insert(id);
        }
    }

    if kind == NewsSourceKind::Terminal {
        if let Value::Object(map) = &mut value {
            let body = map
                .remove("body")
                .filter(|b| b.as_str().is_some_and(|s| !s.is_empty()));
            if let Some(body) = body {
                let title = map.remove("title").unwrap_or(Value::Null);
                map.insert("source".to_string(), title);
                map.insert("title".to_string(), body);
            }
        }
    }
    Ok(serde_json::from_value(value)?)
}
