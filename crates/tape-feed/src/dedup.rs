//! News merge and deduplication.
//!
//! `merge` combines per-source message lists into one sequence:
//! 1. Concatenate the lists in the caller's priority order
//! 2. Keep the first message for each `DedupKey`, dropping messages whose
//!    normalized title is empty
//! 3. Stable-sort by time, newest first
//! 4. Truncate to the cap
//!
//! Keys are computed once per message per pass.

use std::collections::{HashMap, HashSet};
use tape_core::{MessageIdentity, NewsMessage};

/// Maximum merged sequence length.
pub const DEFAULT_CAP: usize = 100;

const SHORT_LINK_PREFIX: &str = "https://t.co/";
const TWITTER_PREFIX: &str = "https://twitter.com/";
const STATUS_SEGMENT: &str = "/status/";
const ELLIPSIS: &str = "...";
const QUOTE_MARKERS: [&str; 2] = ["Quote [", "&gt;&gt;QUOTE"];

/// Normalized `(source, title)` used to detect the same event across feeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub source: String,
    pub title: String,
}

impl DedupKey {
    pub fn of(message: &NewsMessage) -> Self {
        Self {
            source: normalize_source(&message.source),
            title: normalize_title(&message.title),
        }
    }
}

/// Strip a trailing handle annotation: `"Name (@handle)"` -> `"Name"`.
pub fn normalize_source(source: &str) -> String {
    if !source.ends_with(')') {
        return source.to_string();
    }

    // Earliest "(@" whose tail to the closing paren stays on one line.
    let mut search_from = 0;
    while let Some(offset) = source[search_from..].find("(@") {
        let start = search_from + offset;
        if !source[start..].contains('\n') {
            return source[..start].trim_end().to_string();
        }
        search_from = start + 2;
    }
    source.to_string()
}

/// Normalize a title for comparison.
///
/// Tracking links and truncated tweet links are removed, anything from an
/// embedded quote marker on is cut, `&amp;` is decoded, zero-width
/// characters are dropped and whitespace runs collapse to one space.
pub fn normalize_title(title: &str) -> String {
    let text = remove_matches(title, tracking_link_end);
    let mut text = remove_matches(&text, truncated_link_end);

    for marker in QUOTE_MARKERS {
        if let Some(idx) = text.find(marker) {
            text.truncate(idx);
        }
    }

    let text = text.replace("&amp;", "&");
    collapse_whitespace(&text)
}

/// Merge per-source lists into one deduplicated, newest-first sequence.
pub fn merge<S>(sources: &[S], cap: usize) -> Vec<NewsMessage>
where
    S: AsRef<[NewsMessage]>,
{
    let mut seen: HashSet<DedupKey> = HashSet::new();
    let mut kept: Vec<&NewsMessage> = Vec::new();

    for message in sources.iter().flat_map(|s| s.as_ref().iter()) {
        let key = DedupKey::of(message);
        if key.title.is_empty() {
            continue;
        }
        if seen.insert(key) {
            kept.push(message);
        }
    }

    // sort_by is stable: equal times keep concatenation order
    kept.sort_by(|a, b| b.time.cmp(&a.time));
    kept.truncate(cap);
    kept.into_iter().cloned().collect()
}

/// Identity of each merged message.
///
/// Upstream ids win. Id-less messages are keyed by `(source, time)` plus
/// their ordinal among id-less merged messages sharing that pair, counted
/// from the back. Snapshots are newest-first and new arrivals are
/// prepended, so the earliest arrival keeps ordinal 0 and an inserted
/// duplicate takes the next one.
pub fn assign_identities(merged: &[NewsMessage]) -> Vec<MessageIdentity> {
    let mut ordinals: HashMap<(&str, i64), usize> = HashMap::new();

    let mut identities: Vec<MessageIdentity> = merged
        .iter()
        .rev()
        .map(|message| match message.id.as_deref() {
            Some(id) if !id.is_empty() => MessageIdentity::Id(id.to_string()),
            _ => {
                let slot = ordinals
                    .entry((message.source.as_str(), message.time.timestamp_millis()))
                    .or_insert(0);
                let position = *slot;
                *slot += 1;
                MessageIdentity::Synthetic {
                    source: message.source.clone(),
                    time: message.time,
                    position,
                }
            }
        })
        .collect();
    identities.reverse();
    identities
}

/// Rebuild `text` without the spans reported by `match_end`.
///
/// `match_end(text, pos)` returns the end of a match starting at `pos`.
fn remove_matches(text: &str, match_end: fn(&str, usize) -> Option<usize>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied_to = 0;
    let mut pos = 0;

    while pos < text.len() {
        if let Some(end) = match_end(text, pos) {
            out.push_str(&text[copied_to..pos]);
            copied_to = end;
            pos = end;
            continue;
        }
        pos += text[pos..].chars().next().map_or(1, char::len_utf8);
    }
    out.push_str(&text[copied_to..]);
    out
}

/// `t.co` links and `twitter.com/<user>/status/<id>` links, with an
/// optional escaped newline right after.
fn tracking_link_end(text: &str, pos: usize) -> Option<usize> {
    let rest = &text[pos..];
    let after_prefix = if starts_with_ignore_case(rest, SHORT_LINK_PREFIX) {
        pos + SHORT_LINK_PREFIX.len()
    } else if starts_with_ignore_case(rest, TWITTER_PREFIX) {
        let run_start = pos + TWITTER_PREFIX.len();
        let run = non_whitespace_run(&text[run_start..]);
        let idx = rfind_ignore_case(run, STATUS_SEGMENT).filter(|&i| i > 0)?;
        run_start + idx + STATUS_SEGMENT.len()
    } else {
        return None;
    };

    let tail = &text[after_prefix..];
    let mut end = after_prefix
        + tail
            .find(|c: char| c.is_whitespace() || c == '\\')
            .unwrap_or(tail.len());
    if text[end..].starts_with("\\n") {
        end += 2;
    }
    Some(end)
}

/// Twitter links cut off with `...`.
fn truncated_link_end(text: &str, pos: usize) -> Option<usize> {
    if !starts_with_ignore_case(&text[pos..], TWITTER_PREFIX) {
        return None;
    }
    let run_start = pos + TWITTER_PREFIX.len();
    let run = non_whitespace_run(&text[run_start..]);
    let idx = run.rfind(ELLIPSIS).filter(|&i| i > 0)?;
    Some(run_start + idx + ELLIPSIS.len())
}

fn non_whitespace_run(text: &str) -> &str {
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    &text[..end]
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len() && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn rfind_ignore_case(text: &str, needle: &str) -> Option<usize> {
    let (hay, pat) = (text.as_bytes(), needle.as_bytes());
    if hay.len() < pat.len() {
        return None;
    }
    (0..=hay.len() - pat.len())
        .rev()
        .find(|&i| hay[i..i + pat.len()].eq_ignore_ascii_case(pat))
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars().filter(|c| !is_zero_width(*c)) {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn msg(source: &str, title: &str, secs: i64) -> NewsMessage {
        NewsMessage::new(source, title, at(secs))
    }

    #[test]
    fn test_normalize_source() {
        assert_eq!(normalize_source("Binance (@binance)"), "Binance");
        assert_eq!(normalize_source("Tree News(@News_Of_Alpha)"), "Tree News");
        assert_eq!(normalize_source("Binance"), "Binance");
        assert_eq!(normalize_source("Name (@a) (@b)"), "Name");
        assert_eq!(normalize_source("Name (note)"), "Name (note)");
        assert_eq!(normalize_source(""), "");
    }

    #[test]
    fn test_normalize_title_strips_tracking_links() {
        assert_eq!(
            normalize_title("Big news https://t.co/AbC123 today"),
            "Big news today"
        );
        assert_eq!(
            normalize_title("Listing HTTPS://TWITTER.COM/binance/status/1234567890\\nmore"),
            "Listing more"
        );
        assert_eq!(
            normalize_title("See https://twitter.com/someone/abc..."),
            "See"
        );
        assert_eq!(
            normalize_title("Keep https://example.com/page as is"),
            "Keep https://example.com/page as is"
        );
    }

    #[test]
    fn test_normalize_title_cuts_quotes() {
        assert_eq!(normalize_title("Main text\nQuote [@other] quoted"), "Main text");
        assert_eq!(normalize_title("Main &gt;&gt;QUOTE other"), "Main");
    }

    #[test]
    fn test_normalize_title_entities_and_whitespace() {
        assert_eq!(normalize_title("  A &amp; B \n\t C  "), "A & B C");
        assert_eq!(normalize_title("Hello\u{200B}   world\u{FEFF}"), "Hello world");
        assert_eq!(normalize_title("\u{200B} \n"), "");
    }

    #[test]
    fn test_handle_and_spacing_variants_merge() {
        let a = vec![msg("X (@handle)", "Hello world", 10)];
        let b = vec![msg("X", "Hello   world", 10)];

        let merged = merge(&[a, b], DEFAULT_CAP);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, "X (@handle)");
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let source: Vec<NewsMessage> = (0..150).map(|i| msg("S", &format!("title {i}"), i)).collect();

        let merged = merge(&[source], DEFAULT_CAP);
        assert_eq!(merged.len(), 100);
        assert_eq!(merged[0].time, at(149));
        assert_eq!(merged[99].time, at(50));
        assert!(merged.windows(2).all(|w| w[0].time > w[1].time));
    }

    #[test]
    fn test_equal_times_keep_input_order() {
        let a = vec![msg("A", "first", 5), msg("A", "older", 1)];
        let b = vec![msg("B", "second", 5), msg("B", "newest", 9)];

        let merged = merge(&[a, b], DEFAULT_CAP);
        let titles: Vec<&str> = merged.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["newest", "first", "second", "older"]);
    }

    #[test]
    fn test_first_seen_wins_on_identical_key_and_time() {
        let a = vec![msg("S", "same", 5).with_id("from-a")];
        let b = vec![msg("S", "same", 5).with_id("from-b")];

        let merged = merge(&[a, b], DEFAULT_CAP);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id.as_deref(), Some("from-a"));
    }

    #[test]
    fn test_duplicate_keeps_earlier_priority_even_if_older() {
        let a = vec![msg("S", "same", 1)];
        let b = vec![msg("S", "same", 9)];

        let merged = merge(&[a, b], DEFAULT_CAP);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].time, at(1));
    }

    #[test]
    fn test_undisplayable_messages_excluded() {
        let parsed: NewsMessage = serde_json::from_str(r#"{"source": "S", "time": 3}"#).unwrap();
        let source = vec![
            parsed,
            msg("S", "   ", 2),
            msg("S", "https://t.co/xyz", 1),
            msg("", "kept without source", 0),
        ];

        let merged = merge(&[source], DEFAULT_CAP);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "kept without source");
    }

    #[test]
    fn test_empty_sources() {
        let none: Vec<Vec<NewsMessage>> = Vec::new();
        assert!(merge(&none, DEFAULT_CAP).is_empty());
        assert!(merge(&[Vec::<NewsMessage>::new(), Vec::new()], DEFAULT_CAP).is_empty());
    }

    #[test]
    fn test_identities_prefer_id_then_position() {
        let merged = vec![
            msg("S", "a", 5).with_id("id-1"),
            msg("S", "b", 5),
            msg("S", "c", 5),
            msg("T", "d", 5),
        ];

        let ids = assign_identities(&merged);
        assert_eq!(ids[0], MessageIdentity::Id("id-1".to_string()));
        assert_eq!(
            ids[1],
            MessageIdentity::Synthetic { source: "S".to_string(), time: at(5), position: 1 }
        );
        assert_eq!(
            ids[2],
            MessageIdentity::Synthetic { source: "S".to_string(), time: at(5), position: 0 }
        );
        assert_eq!(
            ids[3],
            MessageIdentity::Synthetic { source: "T".to_string(), time: at(5), position: 0 }
        );
    }

    #[test]
    fn test_prepended_twin_keeps_existing_identity() {
        let before = vec![msg("S", "older", 5)];
        let after = vec![msg("S", "newer", 5), msg("S", "older", 5)];

        let old_ids = assign_identities(&before);
        let new_ids = assign_identities(&after);
        assert_eq!(new_ids[1], old_ids[0]);
        assert!(!old_ids.contains(&new_ids[0]));
    }
}
