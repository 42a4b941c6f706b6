//! Notification side effects for new news items.
//!
//! Playback belongs to an external collaborator behind `NotificationSink`;
//! this module only decides which items should be announced.

use crate::aggregator::NewItems;
use tape_core::NewsMessage;
use tracing::info;

#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    /// Play `sound` for `message`.
    fn play(&self, sound: &str, message: &NewsMessage);
}

/// Announce each new item that has a source, if audio is enabled.
///
/// Returns how many notifications were requested.
pub fn dispatch_notifications(new_items: &NewItems, sink: &dyn NotificationSink) -> usize {
    if !new_items.audio_enabled {
        return 0;
    }

    let mut played = 0;
    for item in new_items
        .items
        .iter()
        .filter(|item| !item.message.source.is_empty())
    {
        sink.play(&item.sound, &item.message);
        played += 1;
    }
    played
}

/// Sink that only logs; used when no audio device is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn play(&self, sound: &str, message: &NewsMessage) {
        info!(sound, source = %message.source, title = %message.title, "News notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::NewItem;
    use chrono::DateTime;
    use mockall::predicate::eq;
    use tape_core::MessageIdentity;

    fn item(source: &str, sound: &str) -> NewItem {
        NewItem {
            identity: MessageIdentity::Id(format!("{source}-id")),
            message: NewsMessage::new(source, "title", DateTime::UNIX_EPOCH),
            sound: sound.to_string(),
        }
    }

    #[test]
    fn test_plays_resolved_sound_per_item() {
        let mut sink = MockNotificationSink::new();
        sink.expect_play()
            .with(eq("binance.mp3"), mockall::predicate::always())
            .times(1)
            .return_const(());
        sink.expect_play()
            .with(eq("default"), mockall::predicate::always())
            .times(1)
            .return_const(());

        let new_items = NewItems {
            items: vec![item("Binance", "binance.mp3"), item("Other", "default")],
            audio_enabled: true,
        };
        assert_eq!(dispatch_notifications(&new_items, &sink), 2);
    }

    #[test]
    fn test_muted_plays_nothing() {
        let mut sink = MockNotificationSink::new();
        sink.expect_play().never();

        let new_items = NewItems {
            items: vec![item("Binance", "binance.mp3")],
            audio_enabled: false,
        };
        assert_eq!(dispatch_notifications(&new_items, &sink), 0);
    }

    #[test]
    fn test_items_without_source_are_silent() {
        let mut sink = MockNotificationSink::new();
        sink.expect_play().times(1).return_const(());

        let new_items = NewItems {
            items: vec![item("", "default"), item("Binance", "binance.mp3")],
            audio_enabled: true,
        };
        assert_eq!(dispatch_notifications(&new_items, &sink), 1);
    }
}
