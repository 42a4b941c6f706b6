//! Cancellable history fetch.

use crate::error::ChartResult;
use crate::stitcher::FetchTicket;
use std::future::Future;
use tape_core::{Candle, Interval, Symbol, Venue};
use tracing::debug;

/// One-shot source of historical candles, oldest first.
pub trait HistorySource: Send + Sync {
    fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        venue: Venue,
    ) -> impl Future<Output = ChartResult<Vec<Candle>>> + Send;
}

/// Run the fetch described by `ticket` until it completes or the ticket is
/// cancelled. Cancellation yields `None` and is not an error.
pub async fn fetch_history<H: HistorySource>(
    source: &H,
    ticket: &FetchTicket,
) -> Option<ChartResult<Vec<Candle>>> {
    let selection = &ticket.selection;

    tokio::select! {
        biased;

        () = ticket.token.cancelled() => {
            debug!(generation = ticket.generation, symbol = %selection.symbol, "History fetch cancelled");
            None
        }
        result = source.fetch(&selection.symbol, selection.interval, selection.venue) => Some(result),
    }
}
