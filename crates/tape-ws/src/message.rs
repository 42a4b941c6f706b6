//! WebSocket frame types.
//!
//! Outbound control frames are `{"method": "SUBSCRIBE", "params": [...], "id": n}`.
//! Inbound text is one of: a combined-stream frame (`{"stream", "data"}`),
//! a control acknowledgement (`{"result", "id"}`) or any other JSON payload
//! (news feeds push bare objects).

use serde::{Deserialize, Serialize};
use tape_core::Topic;

// ============================================================================
// Control frames (outgoing)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMethod {
    Subscribe,
    Unsubscribe,
}

impl ControlMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
        }
    }
}

/// Subscribe / unsubscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsRequest {
    pub method: ControlMethod,
    pub params: Vec<String>,
    pub id: u64,
}

impl WsRequest {
    pub fn subscribe<'a>(topics: impl IntoIterator<Item = &'a Topic>, id: u64) -> Self {
        Self::new(ControlMethod::Subscribe, topics, id)
    }

    pub fn unsubscribe<'a>(topics: impl IntoIterator<Item = &'a Topic>, id: u64) -> Self {
        Self::new(ControlMethod::Unsubscribe, topics, id)
    }

    fn new<'a>(method: ControlMethod, topics: impl IntoIterator<Item = &'a Topic>, id: u64) -> Self {
        Self {
            method,
            params: topics.into_iter().map(|t| t.as_str().to_string()).collect(),
            id,
        }
    }
}

// ============================================================================
// Inbound frames
// ============================================================================

/// Frame from a combined stream endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamFrame {
    /// Topic the payload belongs to (`btcusdt@kline_1m`).
    pub stream: String,
    pub data: serde_json::Value,
}

impl StreamFrame {
    pub fn topic(&self) -> Topic {
        Topic::new(self.stream.as_str())
    }

    /// Payload kind discriminator (`markPriceUpdate`, `kline`).
    pub fn event_type(&self) -> Option<&str> {
        self.data.get("e").and_then(|v| v.as_str())
    }
}

/// Acknowledgement of a control frame. `result` is `null` on success.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionAck {
    pub result: serde_json::Value,
    pub id: u64,
}

impl SubscriptionAck {
    pub fn is_success(&self) -> bool {
        self.result.is_null()
    }
}

/// Parsed inbound text frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WsMessage {
    Stream(StreamFrame),
    Ack(SubscriptionAck),
    /// Any other JSON document.
    Payload(serde_json::Value),
}

impl WsMessage {
    pub fn as_stream(&self) -> Option<&StreamFrame> {
        match self {
            Self::Stream(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_request_serialization() {
        let topics = [Topic::new("btcusdt@markPrice@1s"), Topic::new("ethusdt@markPrice@1s")];
        let req = WsRequest::subscribe(topics.iter(), 7);

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "method": "SUBSCRIBE",
                "params": ["btcusdt@markPrice@1s", "ethusdt@markPrice@1s"],
                "id": 7
            })
        );
    }

    #[test]
    fn test_unsubscribe_method_name() {
        let topics = [Topic::new("btcusdt@kline_1m")];
        let req = WsRequest::unsubscribe(topics.iter(), 1);
        let text = serde_json::to_string(&req).unwrap();
        assert!(text.contains("\"UNSUBSCRIBE\""));
    }

    #[test]
    fn test_parse_stream_frame() {
        let text = r#"{"stream":"btcusdt@markPrice@1s","data":{"e":"markPriceUpdate","E":1700000000000,"s":"BTCUSDT","p":"50000.10"}}"#;
        let msg: WsMessage = serde_json::from_str(text).unwrap();

        let frame = msg.as_stream().unwrap();
        assert_eq!(frame.topic(), Topic::new("btcusdt@markPrice@1s"));
        assert_eq!(frame.event_type(), Some("markPriceUpdate"));
    }

    #[test]
    fn test_parse_ack() {
        let msg: WsMessage = serde_json::from_str(r#"{"result":null,"id":3}"#).unwrap();
        match msg {
            WsMessage::Ack(ack) => {
                assert_eq!(ack.id, 3);
                assert!(ack.is_success());
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_other_payload() {
        let text = r#"{"_id":"abc","title":"Binance","body":"New listing","time":1700000000000}"#;
        let msg: WsMessage = serde_json::from_str(text).unwrap();
        assert!(matches!(msg, WsMessage::Payload(_)));
        assert!(!msg.is_ack());
    }

    #[test]
    fn test_non_json_is_error() {
        assert!(serde_json::from_str::<WsMessage>("pong").is_err());
    }
}
