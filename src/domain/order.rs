// ============================================================================
// Order Domain Model
// ============================================================================

use crate::error::{MarketError, MarketResult};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use state::{OrderStatus, StatusTransition};

// ============================================================================
// Value Objects
// ============================================================================

/// Book-local order identifier, assigned sequentially on submission.
///
/// Sequential ids double as the FIFO tie-break and keep clearing traces
/// reproducible across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderId(u64);

impl OrderId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    /// Buy order
    Bid,
    /// Sell order
    Ask,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// Priced order or price-inelastic demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderKind {
    /// Limit price per unit of energy
    Priced { price: Decimal },
    /// Quantity-only demand: buys the quantity at whatever price clears.
    /// Only valid on the bid side.
    QuantityOnly,
}

impl OrderKind {
    pub fn price(&self) -> Option<Decimal> {
        match self {
            OrderKind::Priced { price } => Some(*price),
            OrderKind::QuantityOnly => None,
        }
    }
}

// ============================================================================
// Order Status State Machine
// ============================================================================

pub mod state {
    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(u8)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum OrderStatus {
        Pending = 0,
        PartiallyMatched = 1,
        Matched = 2,
        Unmatched = 3,
        Expired = 4,
        Cancelled = 5,
    }

    impl OrderStatus {
        pub fn from_u8(val: u8) -> Self {
            match val {
                0 => OrderStatus::Pending,
                1 => OrderStatus::PartiallyMatched,
                2 => OrderStatus::Matched,
                3 => OrderStatus::Unmatched,
                4 => OrderStatus::Expired,
                _ => OrderStatus::Cancelled,
            }
        }

        /// Terminal orders are never mutated again.
        pub fn is_terminal(&self) -> bool {
            matches!(
                self,
                OrderStatus::Matched | OrderStatus::Expired | OrderStatus::Cancelled
            )
        }

        /// Open orders still hold quantity that can trade.
        pub fn is_open(&self) -> bool {
            !self.is_terminal()
        }

        pub fn as_str(&self) -> &'static str {
            match self {
                OrderStatus::Pending => "pending",
                OrderStatus::PartiallyMatched => "partially_matched",
                OrderStatus::Matched => "matched",
                OrderStatus::Unmatched => "unmatched",
                OrderStatus::Expired => "expired",
                OrderStatus::Cancelled => "cancelled",
            }
        }
    }

    /// Valid status transitions
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StatusTransition {
        PartialMatch,
        Match,
        NoMatch,
        Expire,
        Cancel,
    }

    impl OrderStatus {
        pub fn transition(&self, transition: StatusTransition) -> Option<OrderStatus> {
            use StatusTransition::*;

            match (self, transition) {
                (s, _) if s.is_terminal() => None,

                (_, PartialMatch) => Some(OrderStatus::PartiallyMatched),
                (_, Match) => Some(OrderStatus::Matched),
                (_, Expire) => Some(OrderStatus::Expired),
                (_, Cancel) => Some(OrderStatus::Cancelled),

                // A partially matched order keeps its status when a pass stops
                (OrderStatus::Pending | OrderStatus::Unmatched, NoMatch) => {
                    Some(OrderStatus::Unmatched)
                },
                (OrderStatus::PartiallyMatched, NoMatch) => None,

                _ => None,
            }
        }
    }
}

// ============================================================================
// Order Request
// ============================================================================

/// Order as handed in by a collaborator, before the book assigns an id.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub participant: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Decimal,
    /// Defaults to the submission wall-clock time
    pub submitted_at: Option<DateTime<Utc>>,
    /// Time-to-live; `None` keeps the order until matched or cancelled
    pub duration: Option<Duration>,
}

impl OrderRequest {
    pub fn ask(participant: impl Into<String>, price: Decimal, quantity: Decimal) -> Self {
        Self::new(participant, Side::Ask, OrderKind::Priced { price }, quantity)
    }

    pub fn bid(participant: impl Into<String>, price: Decimal, quantity: Decimal) -> Self {
        Self::new(participant, Side::Bid, OrderKind::Priced { price }, quantity)
    }

    /// Price-inelastic demand bid
    pub fn demand(participant: impl Into<String>, quantity: Decimal) -> Self {
        Self::new(participant, Side::Bid, OrderKind::QuantityOnly, quantity)
    }

    pub fn new(
        participant: impl Into<String>,
        side: Side,
        kind: OrderKind,
        quantity: Decimal,
    ) -> Self {
        Self {
            participant: participant.into(),
            side,
            kind,
            quantity,
            submitted_at: None,
            duration: None,
        }
    }

    /// Builder method: Set submission time
    pub fn at(mut self, submitted_at: DateTime<Utc>) -> Self {
        self.submitted_at = Some(submitted_at);
        self
    }

    /// Builder method: Set time-to-live
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Builder method: Set time-to-live in whole seconds
    pub fn with_ttl_seconds(self, seconds: i64) -> Self {
        self.with_duration(Duration::seconds(seconds))
    }

    pub fn validate(&self) -> MarketResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(MarketError::invalid(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }

        match (self.side, self.kind) {
            (_, OrderKind::Priced { price }) if price <= Decimal::ZERO => {
                return Err(MarketError::invalid(format!(
                    "price must be positive, got {}",
                    price
                )));
            },
            (Side::Ask, OrderKind::QuantityOnly) => {
                return Err(MarketError::invalid("asks must carry a price"));
            },
            _ => {},
        }

        if let Some(duration) = self.duration {
            if duration <= Duration::zero() {
                return Err(MarketError::invalid("order duration must be positive"));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Order Entity
// ============================================================================

/// Submitted order shared between the book and the active matching policy.
///
/// Status is an atomic updated only by compare-and-set, so expiry sweeps and
/// cancellations racing a fill can never resurrect or double-terminate an
/// order. The remaining quantity is guarded by a lock held across the fill's
/// status CAS.
#[derive(Debug)]
pub struct Order {
    pub id: OrderId,
    pub participant: Arc<String>,
    pub side: Side,
    pub kind: OrderKind,
    /// Original quantity
    pub quantity: Decimal,
    pub submitted_at: DateTime<Utc>,
    pub duration: Option<Duration>,

    remaining: Mutex<Decimal>,
    status: AtomicU8,
}

impl Order {
    /// Builds the order without validating; books validate on submission.
    pub(crate) fn from_request(id: OrderId, request: OrderRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            participant: Arc::new(request.participant),
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            submitted_at: request.submitted_at.unwrap_or(now),
            duration: request.duration,
            remaining: Mutex::new(request.quantity),
            status: AtomicU8::new(OrderStatus::Pending as u8),
        }
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn price(&self) -> Option<Decimal> {
        self.kind.price()
    }

    pub fn remaining_quantity(&self) -> Decimal {
        *self.remaining.lock()
    }

    pub fn filled_quantity(&self) -> Decimal {
        self.quantity - self.remaining_quantity()
    }

    pub fn status(&self) -> OrderStatus {
        OrderStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.status().is_open()
    }

    /// True once `now - submitted_at` reaches the order's duration.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.duration {
            Some(duration) => now - self.submitted_at >= duration,
            None => false,
        }
    }

    /// Open and still inside its time-to-live.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && !self.is_overdue(now)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.duration.map(|d| self.submitted_at + d)
    }

    pub fn view(&self) -> OrderView {
        OrderView {
            id: self.id,
            participant: (*self.participant).clone(),
            side: self.side,
            price: self.price(),
            quantity: self.quantity,
            remaining: self.remaining_quantity(),
            status: self.status(),
            submitted_at: self.submitted_at,
        }
    }

    // ========================================================================
    // Atomic Operations
    // ========================================================================

    /// Fill `quantity` of this order.
    ///
    /// Fails without mutating anything if the order is terminal (including a
    /// concurrent expiry or cancellation that won the status CAS) or if
    /// `quantity` is not within `(0, remaining]`.
    pub fn try_fill(&self, quantity: Decimal) -> MarketResult<OrderStatus> {
        let mut remaining = self.remaining.lock();

        if quantity <= Decimal::ZERO || quantity > *remaining {
            let status = self.status();
            if status.is_terminal() {
                return Err(self.terminal_error(status));
            }
            return Err(MarketError::invalid(format!(
                "fill of {} exceeds remaining {} on order {}",
                quantity, *remaining, self.id
            )));
        }

        let new_remaining = *remaining - quantity;
        let transition = if new_remaining.is_zero() {
            StatusTransition::Match
        } else {
            StatusTransition::PartialMatch
        };

        let new_status = self
            .try_transition(transition)
            .map_err(|status| self.terminal_error(status))?;

        *remaining = new_remaining;
        Ok(new_status)
    }

    /// Fill whatever quantity remains.
    pub fn try_fill_remaining(&self) -> MarketResult<Decimal> {
        let remaining = self.remaining_quantity();
        self.try_fill(remaining).map(|_| remaining)
    }

    /// Pending/unmatched -> unmatched. Partially matched orders keep their
    /// status; returns false for them and for terminal orders.
    pub fn try_mark_unmatched(&self) -> bool {
        self.try_transition(StatusTransition::NoMatch).is_ok()
    }

    /// Open -> cancelled.
    pub fn try_cancel(&self) -> MarketResult<()> {
        self.try_transition(StatusTransition::Cancel)
            .map(|_| ())
            .map_err(|status| self.terminal_error(status))
    }

    /// Open -> expired. Returns false if the order was already terminal.
    pub fn try_expire(&self) -> bool {
        self.try_transition(StatusTransition::Expire).is_ok()
    }

    /// CAS loop over the status byte. On rejection returns the status that
    /// refused the transition.
    fn try_transition(&self, transition: StatusTransition) -> Result<OrderStatus, OrderStatus> {
        let mut current = self.status.load(Ordering::Acquire);

        loop {
            let from = OrderStatus::from_u8(current);
            let to = from.transition(transition).ok_or(from)?;

            match self.status.compare_exchange(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(to),
                Err(actual) => current = actual,
            }
        }
    }

    fn terminal_error(&self, status: OrderStatus) -> MarketError {
        MarketError::OrderAlreadyTerminal {
            id: self.id,
            status,
        }
    }
}

// ============================================================================
// Order View
// ============================================================================

/// Immutable copy of an order's state for snapshots and results
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderView {
    pub id: OrderId,
    pub participant: String,
    pub side: Side,
    /// `None` for quantity-only demand
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub remaining: Decimal,
    pub status: OrderStatus,
    pub submitted_at: DateTime<Utc>,
}
