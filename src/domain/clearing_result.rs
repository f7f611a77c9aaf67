// ============================================================================
// Clearing Result
// Outcome of one clearing pass plus its human-readable trace
// ============================================================================

use rust_decimal::Decimal;
use std::fmt;

use super::{Fill, OrderId, OrderView};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Clearing Trace
// ============================================================================

/// Step-by-step explanation of a clearing decision.
///
/// Contains no timestamps or random ids: identical inputs render an
/// identical trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClearingTrace {
    lines: Vec<String>,
}

impl ClearingTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn extend(&mut self, other: ClearingTrace) {
        self.lines.extend(other.lines);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for ClearingTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Render a decimal without trailing zeros so traces read the same
/// regardless of intermediate scale.
pub fn fmt_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

// ============================================================================
// Clearing Result
// ============================================================================

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClearingResult {
    pub round: u64,

    /// Name of the policy that produced this result
    pub mechanism: String,

    /// Uniform marginal price P0; `None` when nothing cleared or when the
    /// mechanism settles pair by pair
    pub clearing_price: Option<Decimal>,

    /// Cleared quantity Q0
    pub cleared_quantity: Decimal,

    /// Fills in the order they were produced
    pub fills: Vec<Fill>,

    /// Orders matched during this pass
    pub matched: Vec<OrderId>,

    /// Orders left with remaining quantity after this pass
    pub unmatched: Vec<OrderView>,

    /// Ask volume eligible at the clearing price
    pub ask_volume: Decimal,

    /// Bid volume eligible at the clearing price
    pub bid_volume: Decimal,

    pub trace: ClearingTrace,
}

impl ClearingResult {
    pub fn new(round: u64, mechanism: impl Into<String>) -> Self {
        Self {
            round,
            mechanism: mechanism.into(),
            clearing_price: None,
            cleared_quantity: Decimal::ZERO,
            fills: Vec::new(),
            matched: Vec::new(),
            unmatched: Vec::new(),
            ask_volume: Decimal::ZERO,
            bid_volume: Decimal::ZERO,
            trace: ClearingTrace::new(),
        }
    }

    pub fn has_trade(&self) -> bool {
        self.cleared_quantity > Decimal::ZERO
    }

    pub fn total_fill_quantity(&self) -> Decimal {
        self.fills.iter().map(|f| f.matched_quantity).sum()
    }

    pub fn fills_for(&self, order_id: OrderId) -> impl Iterator<Item = &Fill> {
        self.fills.iter().filter(move |f| f.involves(order_id))
    }

    pub fn is_matched(&self, order_id: OrderId) -> bool {
        self.matched.contains(&order_id)
    }

    pub fn is_unmatched(&self, order_id: OrderId) -> bool {
        self.unmatched.iter().any(|o| o.id == order_id)
    }
}
