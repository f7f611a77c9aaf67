// ============================================================================
// Continuous Auction Book
// Resting quotes with time-to-live, accepted by counterparties at any time
// ============================================================================

use crate::domain::{
    Account, Fill, Ledger, MarketConfig, Order, OrderBook, OrderBookSnapshot, OrderId, OrderKind,
    OrderRequest, Side,
};
use crate::error::{MarketError, MarketResult};
use crate::interfaces::{EventHandler, MarketEvent};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Continuous double auction over posted quotes.
///
/// Makers post priced orders that escrow their side in the [`Ledger`]
/// (inventory for an ask, `price x quantity` of funds for a bid). A
/// counterparty accepts any active quote, fully or partially, and settles
/// at the maker's price. Quotes expire once `now - submitted_at` reaches
/// their duration; fills made before that stay valid.
///
/// The ledger lock is taken before any order's remaining-quantity lock, so
/// an acceptance settles balances and the order decrement as one step.
pub struct ContinuousAuctionBook {
    book: OrderBook,

    ledger: Mutex<Ledger>,

    /// Applied to posted orders that carry no duration
    default_ttl: Option<Duration>,

    fills: Mutex<Vec<Fill>>,

    fill_sequence: AtomicU64,

    event_handler: Arc<dyn EventHandler>,
}

impl ContinuousAuctionBook {
    pub fn new(
        instrument: impl Into<String>,
        default_ttl: Option<Duration>,
        event_handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            book: OrderBook::new(instrument),
            ledger: Mutex::new(Ledger::new()),
            default_ttl,
            fills: Mutex::new(Vec::new()),
            fill_sequence: AtomicU64::new(1),
            event_handler,
        }
    }

    /// # Errors
    /// `InvalidParameter` if the configuration does not validate.
    pub fn from_config(
        config: &MarketConfig,
        event_handler: Arc<dyn EventHandler>,
    ) -> MarketResult<Self> {
        config.validate()?;
        Ok(Self::new(
            config.instrument.clone(),
            config.order_ttl(),
            event_handler,
        ))
    }

    /// Credit a participant's available balance and inventory
    pub fn deposit(&self, participant: &str, balance: Decimal, inventory: Decimal) {
        self.ledger.lock().deposit(participant, balance, inventory);
    }

    // ========================================================================
    // Makers
    // ========================================================================

    /// Post a resting quote at `now` and escrow the maker's side.
    ///
    /// # Errors
    /// - `InvalidParameter` for a non-positive price, quantity or duration,
    ///   or for a quantity-only order
    /// - `InsufficientInventory` / `InsufficientFunds` if the maker cannot
    ///   cover the escrow
    pub fn post(&self, mut request: OrderRequest, now: DateTime<Utc>) -> MarketResult<Arc<Order>> {
        let price = match request.kind {
            OrderKind::Priced { price } => price,
            OrderKind::QuantityOnly => {
                return self.reject(MarketError::invalid("quotes must carry a price"))
            },
        };
        if let Err(err) = request.validate() {
            return self.reject(err);
        }

        if request.duration.is_none() {
            request.duration = self.default_ttl;
        }
        if request.submitted_at.is_none() {
            request.submitted_at = Some(now);
        }

        let participant = request.participant.clone();
        let (side, quantity) = (request.side, request.quantity);
        let value = match notional(price, quantity) {
            Ok(value) => value,
            Err(err) => return self.reject(err),
        };

        let mut ledger = self.ledger.lock();
        let escrow = match side {
            Side::Ask => ledger.reserve_inventory(&participant, quantity),
            Side::Bid => ledger.reserve_funds(&participant, value),
        };
        if let Err(err) = escrow {
            drop(ledger);
            return self.reject(err);
        }

        let order = match self.book.submit(request) {
            Ok(order) => order,
            Err(err) => {
                match side {
                    Side::Ask => ledger.release_inventory(&participant, quantity),
                    Side::Bid => ledger.release_funds(&participant, value),
                }
                drop(ledger);
                return self.reject(err);
            },
        };
        drop(ledger);

        self.event_handler.on_event(MarketEvent::OrderSubmitted {
            order_id: order.id,
            side: order.side,
            price: order.price(),
            quantity: order.quantity,
            timestamp: now,
        });
        Ok(order)
    }

    /// Cancel an open quote and release its unfilled escrow.
    pub fn cancel(&self, order_id: OrderId) -> MarketResult<Arc<Order>> {
        let mut ledger = self.ledger.lock();
        let order = self.book.cancel(order_id)?;
        Self::release_escrow(&mut ledger, &order);
        drop(ledger);

        self.event_handler.on_event(MarketEvent::OrderCancelled {
            order_id,
            timestamp: Utc::now(),
        });
        Ok(order)
    }

    // ========================================================================
    // Takers
    // ========================================================================

    /// Accept up to `requested_quantity` of a resting quote.
    ///
    /// Trades `min(requested_quantity, remaining)` at the quote's price. The
    /// counterparty must cover the full request: `price x requested` funds
    /// against an ask, `requested` inventory against a bid.
    ///
    /// # Errors
    /// - `InvalidParameter` for a non-positive quantity, a self-accept, or a
    ///   request whose value overflows
    /// - `OrderNotFound` for an unknown id
    /// - `OrderAlreadyTerminal` if the quote is matched, cancelled, or
    ///   past its time-to-live (it is expired first)
    /// - `InsufficientFunds` / `InsufficientInventory`
    pub fn accept(
        &self,
        order_id: OrderId,
        requested_quantity: Decimal,
        counterparty: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<Fill> {
        if requested_quantity <= Decimal::ZERO {
            return Err(MarketError::invalid(format!(
                "accepted quantity must be positive, got {}",
                requested_quantity
            )));
        }

        let maker = self
            .book
            .get(order_id)
            .ok_or(MarketError::OrderNotFound(order_id))?;

        if maker.is_overdue(now) {
            self.expire(&maker, now);
            return Err(MarketError::OrderAlreadyTerminal {
                id: order_id,
                status: maker.status(),
            });
        }

        let status = maker.status();
        if status.is_terminal() {
            return Err(MarketError::OrderAlreadyTerminal {
                id: order_id,
                status,
            });
        }
        if maker.participant.as_str() == counterparty {
            return Err(MarketError::invalid(format!(
                "{} cannot accept their own order {}",
                counterparty, order_id
            )));
        }
        let price = maker
            .price()
            .ok_or_else(|| MarketError::invalid(format!("order {} has no price", order_id)))?;

        let mut ledger = self.ledger.lock();
        match maker.side {
            Side::Ask => ledger.check_funds(counterparty, notional(price, requested_quantity)?)?,
            Side::Bid => ledger.check_inventory(counterparty, requested_quantity)?,
        }

        let matched = requested_quantity.min(maker.remaining_quantity());
        let taker_request =
            OrderRequest::new(counterparty, maker.side.opposite(), maker.kind, matched).at(now);
        taker_request.validate()?;

        maker.try_fill(matched)?;
        let taker = self.book.submit(taker_request)?;
        taker.try_fill(matched)?;

        let fill = match maker.side {
            Side::Ask => {
                ledger.settle_resting_ask(&maker.participant, counterparty, matched, price);
                Fill::uniform(self.next_sequence(), 0, maker.id, taker.id, matched, price)
            },
            Side::Bid => {
                ledger.settle_resting_bid(&maker.participant, counterparty, matched, price);
                Fill::uniform(self.next_sequence(), 0, taker.id, maker.id, matched, price)
            },
        };
        self.fills.lock().push(fill.clone());
        drop(ledger);

        tracing::debug!(
            instrument = %self.book.instrument(),
            maker = %maker.id,
            taker = %taker.id,
            %counterparty,
            quantity = %matched,
            %price,
            "quote accepted"
        );

        self.event_handler.on_events(vec![
            MarketEvent::OrderFilled {
                fill: fill.clone(),
                timestamp: now,
            },
            MarketEvent::StatusChanged {
                order_id: maker.id,
                status: maker.status(),
                remaining: maker.remaining_quantity(),
                timestamp: now,
            },
        ]);

        Ok(fill)
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    /// Expire every overdue quote and release its escrow.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<Arc<Order>> {
        let expired = self.book.expire_due(now);
        if expired.is_empty() {
            return expired;
        }

        let mut ledger = self.ledger.lock();
        for order in &expired {
            Self::release_escrow(&mut ledger, order);
        }
        drop(ledger);

        tracing::info!(
            instrument = %self.book.instrument(),
            count = expired.len(),
            "expired quotes swept"
        );
        self.event_handler.on_events(
            expired
                .iter()
                .map(|o| MarketEvent::OrderExpired {
                    order_id: o.id,
                    timestamp: now,
                })
                .collect(),
        );

        expired
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Open quotes still inside their time-to-live, asks ascending then bids
    /// descending
    pub fn active_orders(&self, now: DateTime<Utc>) -> Vec<Arc<Order>> {
        let mut active = self.active_asks(now);
        active.extend(self.active_bids(now));
        active
    }

    pub fn active_asks(&self, now: DateTime<Utc>) -> Vec<Arc<Order>> {
        self.book
            .sorted_asks()
            .into_iter()
            .filter(|o| o.is_active_at(now))
            .collect()
    }

    pub fn active_bids(&self, now: DateTime<Utc>) -> Vec<Arc<Order>> {
        self.book
            .sorted_bids()
            .into_iter()
            .filter(|o| o.is_active_at(now))
            .collect()
    }

    pub fn account(&self, participant: &str) -> Account {
        self.ledger.lock().account(participant)
    }

    /// Ledger-wide (balance + reserved, inventory + reserved)
    pub fn ledger_totals(&self) -> (Decimal, Decimal) {
        self.ledger.lock().totals()
    }

    pub fn fills(&self) -> Vec<Fill> {
        self.fills.lock().clone()
    }

    pub fn snapshot(&self) -> OrderBookSnapshot {
        self.book.snapshot()
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    fn next_sequence(&self) -> u64 {
        self.fill_sequence.fetch_add(1, Ordering::AcqRel)
    }

    fn expire(&self, order: &Arc<Order>, now: DateTime<Utc>) {
        if !order.try_expire() {
            return;
        }

        Self::release_escrow(&mut self.ledger.lock(), order);
        self.event_handler.on_event(MarketEvent::OrderExpired {
            order_id: order.id,
            timestamp: now,
        });
    }

    /// Return the unfilled part of a maker's escrow. The order must already
    /// be terminal so its remaining quantity is final.
    fn release_escrow(ledger: &mut Ledger, order: &Order) {
        let remaining = order.remaining_quantity();
        match (order.side, order.price()) {
            (Side::Ask, _) => ledger.release_inventory(&order.participant, remaining),
            (Side::Bid, Some(price)) => {
                // Never exceeds the value escrowed at post time
                if let Some(value) = price.checked_mul(remaining) {
                    ledger.release_funds(&order.participant, value);
                }
            },
            (Side::Bid, None) => {},
        }
    }

    fn reject<T>(&self, err: MarketError) -> MarketResult<T> {
        tracing::warn!(instrument = %self.book.instrument(), %err, "quote rejected");
        self.event_handler.on_event(MarketEvent::OrderRejected {
            reason: err.to_string(),
            timestamp: Utc::now(),
        });
        Err(err)
    }
}

/// `price x quantity`, refusing values the decimal range cannot hold
fn notional(price: Decimal, quantity: Decimal) -> MarketResult<Decimal> {
    price.checked_mul(quantity).ok_or_else(|| {
        MarketError::invalid(format!("value of {} at {} overflows", quantity, price))
    })
}
