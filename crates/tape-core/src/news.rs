//! Common news message shape.
//!
//! Every news source is normalized into `NewsMessage` at its boundary.
//! Deserialization is lenient so one odd field never rejects a message:
//! text fields accept strings or numbers, a missing or mistyped
//! `source`/`title` becomes an empty string, a mistyped `_id`/`coin` becomes
//! `None`, and `time` accepts epoch milliseconds, numeric strings or RFC 3339
//! text (anything else maps to the epoch so it sorts last).

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Coin suggestion attached to a news item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default, deserialize_with = "lenient_text")]
    pub coin: Option<String>,
}

/// A single news/announcement item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsMessage {
    /// Stable upstream identifier, when the source provides one.
    #[serde(
        rename = "_id",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub source: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(default = "epoch", deserialize_with = "lenient_time")]
    pub time: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub coin: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub suggestions: Vec<Suggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl NewsMessage {
    pub fn new(source: impl Into<String>, title: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            id: None,
            source: source.into(),
            title: title.into(),
            time,
            coin: None,
            suggestions: Vec::new(),
            link: None,
            url: None,
            icon: None,
            image: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Whether the message has a title worth showing.
    pub fn is_displayable(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Distinct coins mentioned by the message: `coin` first, then
    /// suggestions, in first-seen order.
    pub fn coins(&self) -> Vec<String> {
        let mut coins: Vec<String> = Vec::new();
        let candidates = self
            .coin
            .iter()
            .chain(self.suggestions.iter().filter_map(|s| s.coin.as_ref()));

        for coin in candidates {
            if !coin.is_empty() && !coins.contains(coin) {
                coins.push(coin.clone());
            }
        }
        coins
    }

    /// Outbound link, preferring `link` over `url`.
    pub fn link_url(&self) -> Option<&str> {
        self.link.as_deref().or(self.url.as_deref())
    }
}

/// Identity of a merged message for incremental consumption.
///
/// Upstream ids are used when present. Otherwise the identity is the
/// `(source, time)` pair plus the ordinal among merged messages sharing
/// that pair, which stays stable when unrelated messages are inserted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageIdentity {
    Id(String),
    Synthetic {
        source: String,
        time: DateTime<Utc>,
        position: usize,
    },
}

fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawText {
    Text(String),
    Int(i64),
    Float(f64),
    Other(IgnoredAny),
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawText::deserialize(deserializer)? {
        RawText::Text(text) => Some(text),
        RawText::Int(n) => Some(n.to_string()),
        RawText::Float(n) => Some(n.to_string()),
        RawText::Other(_) => None,
    })
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_text(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawList<T> {
    List(Vec<T>),
    Other(IgnoredAny),
}

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match RawList::<T>::deserialize(deserializer)? {
        RawList::List(items) => items,
        RawList::Other(_) => Vec::new(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Millis(i64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

fn lenient_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match RawTime::deserialize(deserializer)? {
        RawTime::Millis(ms) => DateTime::from_timestamp_millis(ms),
        RawTime::Float(ms) => DateTime::from_timestamp_millis(ms as i64),
        RawTime::Text(text) => DateTime::parse_from_rfc3339(text.trim())
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                text.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(DateTime::from_timestamp_millis)
            }),
        RawTime::Other(_) => None,
    };
    Ok(parsed.unwrap_or_else(epoch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_deserialize_full_message() {
        let raw = r#"{
            "_id": "abc123",
            "source": "Binance",
            "title": "Binance will list FOO",
            "time": 1700000000000,
            "coin": "FOO",
            "suggestions": [{"coin": "FOO"}, {"coin": "BAR"}],
            "url": "https://example.com/foo"
        }"#;

        let msg: NewsMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.id.as_deref(), Some("abc123"));
        assert_eq!(msg.time, Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
        assert_eq!(msg.coins(), vec!["FOO".to_string(), "BAR".to_string()]);
        assert_eq!(msg.link_url(), Some("https://example.com/foo"));
    }

    #[test]
    fn test_deserialize_lenient_fields() {
        let raw = r#"{"source": null, "time": "2024-05-01T12:00:00Z"}"#;
        let msg: NewsMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.source, "");
        assert_eq!(msg.title, "");
        assert!(!msg.is_displayable());
        assert_eq!(msg.time, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_deserialize_time_variants() {
        let numeric_string: NewsMessage =
            serde_json::from_str(r#"{"title": "a", "time": "1700000000000"}"#).unwrap();
        assert_eq!(numeric_string.time.timestamp_millis(), 1_700_000_000_000);

        let garbage: NewsMessage =
            serde_json::from_str(r#"{"title": "a", "time": "yesterday"}"#).unwrap();
        assert_eq!(garbage.time, DateTime::UNIX_EPOCH);

        let missing: NewsMessage = serde_json::from_str(r#"{"title": "a"}"#).unwrap();
        assert_eq!(missing.time, DateTime::UNIX_EPOCH);

        let mistyped: NewsMessage = serde_json::from_str(r#"{"title": "a", "time": true}"#).unwrap();
        assert_eq!(mistyped.time, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_deserialize_mistyped_fields() {
        let raw = r#"{
            "_id": 42,
            "source": 7,
            "title": "Numbers everywhere",
            "time": 1700000000000,
            "coin": {"ticker": "FOO"},
            "suggestions": "BAR"
        }"#;
        let msg: NewsMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.id.as_deref(), Some("42"));
        assert_eq!(msg.source, "7");
        assert_eq!(msg.coin, None);
        assert!(msg.suggestions.is_empty());

        let numeric_coin: NewsMessage =
            serde_json::from_str(r#"{"title": "a", "coin": 7, "suggestions": [{"coin": null}]}"#).unwrap();
        assert_eq!(numeric_coin.coins(), vec!["7".to_string()]);
    }

    #[test]
    fn test_coins_skip_empty_and_duplicates() {
        let mut msg = NewsMessage::new("src", "title", DateTime::UNIX_EPOCH);
        msg.suggestions = vec![
            Suggestion { coin: Some("ETH".into()) },
            Suggestion { coin: None },
            Suggestion { coin: Some(String::new()) },
            Suggestion { coin: Some("ETH".into()) },
        ];
        assert_eq!(msg.coins(), vec!["ETH".to_string()]);
    }
}
