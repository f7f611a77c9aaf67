// ============================================================================
// Event Handler Interface
// Defines the contract for handling order status and clearing events
// ============================================================================

use crate::domain::{Fill, OrderId, OrderStatus, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Events emitted by the auction books and clearers
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MarketEvent {
    /// Order validated and added to the book
    OrderSubmitted {
        order_id: OrderId,
        side: Side,
        price: Option<Decimal>,
        quantity: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Submission rejected with reason; nothing was stored
    OrderRejected {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Fill produced by a clearing pass or an acceptance
    OrderFilled {
        fill: Fill,
        timestamp: DateTime<Utc>,
    },

    /// Per-order status update after a pass or acceptance
    StatusChanged {
        order_id: OrderId,
        status: OrderStatus,
        remaining: Decimal,
        timestamp: DateTime<Utc>,
    },

    OrderCancelled {
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },

    /// Order reached the end of its time-to-live
    OrderExpired {
        order_id: OrderId,
        timestamp: DateTime<Utc>,
    },

    /// Clearing pass completed
    RoundCleared {
        round: u64,
        clearing_price: Option<Decimal>,
        cleared_quantity: Decimal,
        timestamp: DateTime<Utc>,
    },
}

/// Event handler trait for processing market events
/// Implementations can handle logging, UI notifications, recording, etc.
pub trait EventHandler: Send + Sync {
    /// Handle a market event
    fn on_event(&self, event: MarketEvent);

    /// Batch event handler (optional optimization)
    fn on_events(&self, events: Vec<MarketEvent>) {
        for event in events {
            self.on_event(event);
        }
    }
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn on_event(&self, _event: MarketEvent) {}
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: MarketEvent) {
        tracing::debug!("Market event: {:?}", event);
    }
}
