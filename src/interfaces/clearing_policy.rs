// ============================================================================
// Clearing Policy Interface
// Defines the contract for pluggable round-clearing mechanisms
// ============================================================================

use crate::domain::{ClearingResult, OrderBook};
use crate::error::MarketResult;
use rust_decimal::Decimal;

/// Strategy pattern interface for clearing a book round.
/// Implementations: PairwiseMatcher (split settlement), UniformPriceClearing.
pub trait ClearingPolicy: Send + Sync {
    /// Clear the open orders of `book` as round `round`.
    ///
    /// The policy reads one sorted snapshot of the book at the start of the
    /// pass and applies fills and status transitions to those orders only.
    /// Callers must not run two passes on the same book concurrently.
    fn clear(&self, book: &OrderBook, round: u64) -> MarketResult<ClearingResult>;

    /// Get the policy name for logging and results
    fn name(&self) -> &str;

    /// Check whether a bid and an ask price cross.
    /// `None` on the bid side is quantity-only demand, which crosses any ask.
    fn prices_cross(&self, bid_price: Option<Decimal>, ask_price: Decimal) -> bool {
        match bid_price {
            Some(bid) => bid >= ask_price,
            None => true,
        }
    }
}
