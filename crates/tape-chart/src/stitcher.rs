//! Historical/live series stitching.
//!
//! Per selection the stitcher moves Uninitialized -> Loaded -> Live:
//! - `select` discards all state, cancels the in-flight fetch and hands out a
//!   `FetchTicket` for the new one
//! - `resolve_fetch` installs the history if the ticket is still current
//! - `apply_delta` replaces the last bucket or appends a later one
//!
//! The owner mutates the stitcher from one task; fetches run elsewhere and
//! report back through `resolve_fetch`.

use crate::error::ChartResult;
use tape_core::{Candle, Interval, PriceFormat, Symbol, Topic, Venue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Chart instrument selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    pub symbol: Symbol,
    pub interval: Interval,
    /// Venue serving both history and live deltas.
    pub venue: Venue,
}

impl Selection {
    pub fn new(symbol: Symbol, interval: Interval, venue: Venue) -> Self {
        Self {
            symbol,
            interval,
            venue,
        }
    }

    /// Live kline topic for this selection.
    pub fn topic(&self) -> Topic {
        Topic::kline(&self.symbol, self.interval)
    }
}

/// Handle for one history fetch.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub generation: u64,
    pub selection: Selection,
    /// Cancelled when the selection is superseded.
    pub token: CancellationToken,
    /// Selection whose live topic should be detached, if any.
    pub replaced: Option<Selection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesPhase {
    /// Waiting for history.
    Uninitialized,
    /// History installed, no live delta yet.
    Loaded,
    /// At least one live delta applied.
    Live,
}

/// Result of applying one live delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Same bucket as the last candle; it was overwritten.
    Replaced,
    /// Later bucket; appended.
    Appended,
    /// Older than the last candle.
    Rejected,
    /// No history loaded yet, or the delta belongs to another selection.
    Ignored,
}

impl DeltaOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replaced => "replaced",
            Self::Appended => "appended",
            Self::Rejected => "rejected",
            Self::Ignored => "ignored",
        }
    }
}

/// Candle series for the current selection.
#[derive(Debug)]
pub struct SeriesStitcher {
    selection: Option<Selection>,
    generation: u64,
    inflight: Option<CancellationToken>,
    phase: SeriesPhase,
    candles: Vec<Candle>,
    format: Option<PriceFormat>,
}

impl Default for SeriesStitcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesStitcher {
    pub fn new() -> Self {
        Self {
            selection: None,
            generation: 0,
            inflight: None,
            phase: SeriesPhase::Uninitialized,
            candles: Vec::new(),
            format: None,
        }
    }

    /// Switch to a new selection.
    ///
    /// Discards the series and its price format and cancels any pending
    /// fetch. The caller runs the returned ticket's fetch.
    pub fn select(&mut self, selection: Selection) -> FetchTicket {
        self.cancel_inflight();

        let replaced = self.selection.replace(selection.clone());
        self.candles.clear();
        self.format = None;
        self.phase = SeriesPhase::Uninitialized;

        info!(
            symbol = %selection.symbol,
            interval = %selection.interval,
            venue = %selection.venue,
            "Chart selection changed"
        );
        self.issue_ticket(selection, replaced)
    }

    /// Re-fetch history for the current selection without discarding the
    /// series. Returns `None` when nothing is selected.
    pub fn refresh(&mut self) -> Option<FetchTicket> {
        let selection = self.selection.clone()?;
        self.cancel_inflight();
        Some(self.issue_ticket(selection, None))
    }

    /// Resolve a fetch.
    ///
    /// - `Ok(true)`: history installed
    /// - `Ok(false)`: the ticket was superseded; the result is discarded
    /// - `Err(_)`: the current fetch failed; the series keeps its prior state
    pub fn resolve_fetch(&mut self, generation: u64, result: ChartResult<Vec<Candle>>) -> ChartResult<bool> {
        if !self.is_current(generation) {
            debug!(generation, current = self.generation, "Discarding superseded history");
            return Ok(false);
        }
        self.inflight = None;

        match result {
            Ok(candles) => {
                self.install_history(candles);
                Ok(true)
            }
            Err(e) => {
                warn!(generation, %e, "History fetch failed");
                Err(e)
            }
        }
    }

    /// Apply a live kline for (symbol, interval).
    pub fn apply_delta(&mut self, symbol: &Symbol, interval: Interval, candle: Candle) -> DeltaOutcome {
        let Some(selection) = &self.selection else {
            return DeltaOutcome::Ignored;
        };
        if &selection.symbol != symbol || selection.interval != interval {
            return DeltaOutcome::Ignored;
        }
        if self.phase == SeriesPhase::Uninitialized {
            debug!(time = candle.time, "Delta before history, ignored");
            return DeltaOutcome::Ignored;
        }

        let outcome = match self.candles.last_mut() {
            Some(last) if candle.time == last.time => {
                *last = candle;
                DeltaOutcome::Replaced
            }
            Some(last) if candle.time < last.time => {
                debug!(time = candle.time, last = last.time, "Out-of-order delta rejected");
                return DeltaOutcome::Rejected;
            }
            _ => {
                if self.format.is_none() {
                    self.format = Some(PriceFormat::from_reference(candle.open));
                }
                self.candles.push(candle);
                DeltaOutcome::Appended
            }
        };

        self.phase = SeriesPhase::Live;
        outcome
    }

    /// Cancel the pending fetch, if any.
    pub fn cancel_inflight(&mut self) {
        if let Some(token) = self.inflight.take() {
            token.cancel();
        }
    }

    pub fn series(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Display format, fixed for the selection once history is loaded.
    pub fn price_format(&self) -> Option<PriceFormat> {
        self.format
    }

    pub fn phase(&self) -> SeriesPhase {
        self.phase
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_fetching(&self) -> bool {
        self.inflight.is_some()
    }

    fn issue_ticket(&mut self, selection: Selection, replaced: Option<Selection>) -> FetchTicket {
        self.generation += 1;
        let token = CancellationToken::new();
        self.inflight = Some(token.clone());

        FetchTicket {
            generation: self.generation,
            selection,
            token,
            replaced,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
            && self
                .inflight
                .as_ref()
                .is_some_and(|token| !token.is_cancelled())
    }

    fn install_history(&mut self, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.time);
        candles.dedup_by_key(|c| c.time);

        if self.format.is_none() {
            self.format = candles.first().map(|c| PriceFormat::from_reference(c.open));
        }

        info!(count = candles.len(), format = ?self.format, "History loaded");
        self.candles = candles;
        self.phase = SeriesPhase::Loaded;
    }
}
