//! Market and news feed processing for the tape terminal.
//!
//! - `PriceBoard`: latest mark price per symbol
//! - `MessageParser`: combined-stream frames into typed market events
//! - `dedup`: merge of several news sources into one ordered, duplicate-free
//!   sequence
//! - `NewsAggregator`: stateful re-merge with new-item detection
//! - `news_source`: per-feed normalization into `NewsMessage`

pub mod aggregator;
pub mod dedup;
pub mod error;
pub mod news_source;
pub mod notify;
pub mod parser;
pub mod price_board;

pub use aggregator::{AggregatorConfig, NewItem, NewItems, NewsAggregator};
pub use dedup::{assign_identities, merge, normalize_source, normalize_title, DedupKey, DEFAULT_CAP};
pub use error::{FeedError, FeedResult};
pub use news_source::{normalize_frame, normalize_value, NewsSourceKind, SourceUpdate};
pub use notify::{dispatch_notifications, LogSink, NotificationSink};
pub use parser::{MarketEvent, MessageParser};
pub use price_board::{PriceBoard, PriceEntry, Variation};
