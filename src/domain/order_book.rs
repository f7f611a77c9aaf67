// ============================================================================
// Order Book Domain Model
// ============================================================================

use crate::error::{MarketError, MarketResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::{Order, OrderId, OrderRequest, OrderView, Side};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Book
// ============================================================================

#[derive(Debug, Default)]
struct BookEntries {
    /// Submission order
    orders: Vec<Arc<Order>>,
    index: HashMap<OrderId, Arc<Order>>,
}

/// Orders submitted into one trading round or session.
///
/// A book is an explicit value owned by whichever clearer drives it; orders
/// submitted here are only ever mutated by that clearer's policy.
#[derive(Debug)]
pub struct OrderBook {
    session_id: Uuid,
    instrument: Arc<String>,
    entries: RwLock<BookEntries>,
    next_id: AtomicU64,
}

impl OrderBook {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            instrument: Arc::new(instrument.into()),
            entries: RwLock::new(BookEntries::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Validate and append an order as pending.
    pub fn submit(&self, request: OrderRequest) -> MarketResult<Arc<Order>> {
        if let Err(err) = request.validate() {
            tracing::debug!(instrument = %self.instrument, %err, "order rejected");
            return Err(err);
        }

        let mut entries = self.entries.write();
        let id = OrderId::new(self.next_id.fetch_add(1, Ordering::AcqRel));
        let order = Arc::new(Order::from_request(id, request, Utc::now()));

        entries.orders.push(Arc::clone(&order));
        entries.index.insert(id, Arc::clone(&order));

        tracing::debug!(
            instrument = %self.instrument,
            order_id = %id,
            side = %order.side,
            price = ?order.price(),
            quantity = %order.quantity,
            "order submitted"
        );

        Ok(order)
    }

    /// Cancel an open order.
    pub fn cancel(&self, order_id: OrderId) -> MarketResult<Arc<Order>> {
        let order = self.get(order_id).ok_or(MarketError::OrderNotFound(order_id))?;
        order.try_cancel()?;

        tracing::debug!(instrument = %self.instrument, %order_id, "order cancelled");
        Ok(order)
    }

    pub fn get(&self, order_id: OrderId) -> Option<Arc<Order>> {
        self.entries.read().index.get(&order_id).cloned()
    }

    /// Every order, in submission order
    pub fn orders(&self) -> Vec<Arc<Order>> {
        self.entries.read().orders.clone()
    }

    pub fn open_orders(&self) -> Vec<Arc<Order>> {
        self.entries
            .read()
            .orders
            .iter()
            .filter(|o| o.is_open())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open asks, ascending by price, FIFO within a price.
    pub fn sorted_asks(&self) -> Vec<Arc<Order>> {
        let mut asks = self.open_side(Side::Ask);
        asks.sort_by(|a, b| a.price().cmp(&b.price()).then(a.id.cmp(&b.id)));
        asks
    }

    /// Open bids, descending by price, FIFO within a price. Quantity-only
    /// demand sorts ahead of every priced bid.
    pub fn sorted_bids(&self) -> Vec<Arc<Order>> {
        let mut bids = self.open_side(Side::Bid);
        bids.sort_by(|a, b| bid_priority(a, b).then(a.id.cmp(&b.id)));
        bids
    }

    /// Expire every open order whose time-to-live has elapsed at `now`.
    ///
    /// Returns only the orders this call transitioned; an order expired or
    /// filled concurrently is left alone.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Vec<Arc<Order>> {
        let expired: Vec<Arc<Order>> = self
            .open_orders()
            .into_iter()
            .filter(|o| o.is_overdue(now) && o.try_expire())
            .collect();

        if !expired.is_empty() {
            tracing::debug!(
                instrument = %self.instrument,
                count = expired.len(),
                "expired overdue orders"
            );
        }

        expired
    }

    /// Total remaining quantity of open orders on one side
    pub fn open_quantity(&self, side: Side) -> Decimal {
        self.open_side(side)
            .iter()
            .map(|o| o.remaining_quantity())
            .sum()
    }

    pub fn snapshot(&self) -> OrderBookSnapshot {
        let orders: Vec<OrderView> = self.orders().iter().map(|o| o.view()).collect();

        OrderBookSnapshot::with_levels(
            self.session_id,
            (*self.instrument).clone(),
            aggregate_levels(&self.sorted_bids()),
            aggregate_levels(&self.sorted_asks()),
            orders,
        )
    }

    fn open_side(&self, side: Side) -> Vec<Arc<Order>> {
        self.entries
            .read()
            .orders
            .iter()
            .filter(|o| o.side == side && o.is_open())
            .cloned()
            .collect()
    }
}

/// Descending price; `None` (quantity-only) ranks above any price.
fn bid_priority(a: &Order, b: &Order) -> CmpOrdering {
    match (a.price(), b.price()) {
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(pa), Some(pb)) => pb.cmp(&pa),
    }
}

/// Collapse sorted priced orders into (price, total remaining) levels.
fn aggregate_levels(sorted: &[Arc<Order>]) -> Vec<(Decimal, Decimal)> {
    let mut levels: Vec<(Decimal, Decimal)> = Vec::new();

    for order in sorted {
        let Some(price) = order.price() else {
            continue;
        };
        let remaining = order.remaining_quantity();

        match levels.last_mut() {
            Some((level_price, quantity)) if *level_price == price => *quantity += remaining,
            _ => levels.push((price, remaining)),
        }
    }

    levels
}

// ============================================================================
// Order Book Snapshot
// ============================================================================

/// Immutable snapshot of the book state
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookSnapshot {
    pub session_id: Uuid,
    pub instrument: String,
    /// Open bid levels (price, quantity), best first
    pub bids: Vec<(Decimal, Decimal)>,
    /// Open ask levels (price, quantity), best first
    pub asks: Vec<(Decimal, Decimal)>,
    /// Current spread (ask - bid)
    pub spread: Option<Decimal>,
    pub mid_price: Option<Decimal>,
    /// Every order in submission order, terminal ones included
    pub orders: Vec<OrderView>,
}

impl OrderBookSnapshot {
    pub fn with_levels(
        session_id: Uuid,
        instrument: String,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
        orders: Vec<OrderView>,
    ) -> Self {
        let (spread, mid_price) = match (bids.first(), asks.first()) {
            (Some((bid, _)), Some((ask, _))) => {
                (Some(ask - bid), Some((bid + ask) / Decimal::TWO))
            },
            _ => (None, None),
        };

        Self {
            session_id,
            instrument,
            bids,
            asks,
            spread,
            mid_price,
            orders,
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|(price, _)| *price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|(price, _)| *price)
    }

    pub fn total_bid_quantity(&self) -> Decimal {
        self.bids.iter().map(|(_, qty)| qty).sum()
    }

    pub fn total_ask_quantity(&self) -> Decimal {
        self.asks.iter().map(|(_, qty)| qty).sum()
    }

    pub fn order(&self, id: OrderId) -> Option<&OrderView> {
        self.orders.iter().find(|o| o.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderStatus;
    use chrono::{Duration, TimeZone};

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_submit_assigns_sequential_ids() {
        let book = OrderBook::new("NL-DAY-AHEAD");
        let a = book.submit(OrderRequest::ask("s1", d("0.30"), d("200"))).unwrap();
        let b = book.submit(OrderRequest::bid("b1", d("0.38"), d("180"))).unwrap();

        assert_eq!(a.id, OrderId::new(1));
        assert_eq!(b.id, OrderId::new(2));
        assert_eq!(book.len(), 2);
        assert_eq!(a.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_rejected_submission_leaves_book_untouched() {
        let book = OrderBook::new("NL-DAY-AHEAD");

        assert!(matches!(
            book.submit(OrderRequest::ask("s1", d("-0.10"), d("10"))),
            Err(MarketError::InvalidParameter(_))
        ));
        assert!(matches!(
            book.submit(OrderRequest::bid("b1", d("0.10"), d("0"))),
            Err(MarketError::InvalidParameter(_))
        ));
        assert!(book.is_empty());

        let next = book.submit(OrderRequest::ask("s1", d("0.10"), d("10"))).unwrap();
        assert_eq!(next.id, OrderId::new(1));
    }

    #[test]
    fn test_sorted_views_use_fifo_tie_break() {
        let book = OrderBook::new("NL-DAY-AHEAD");
        let a1 = book.submit(OrderRequest::ask("s1", d("0.33"), d("150"))).unwrap();
        let a2 = book.submit(OrderRequest::ask("s2", d("0.30"), d("200"))).unwrap();
        let a3 = book.submit(OrderRequest::ask("s3", d("0.33"), d("50"))).unwrap();

        let b1 = book.submit(OrderRequest::bid("b1", d("0.35"), d("200"))).unwrap();
        let b2 = book.submit(OrderRequest::bid("b2", d("0.38"), d("180"))).unwrap();
        let b3 = book.submit(OrderRequest::demand("b3", d("100"))).unwrap();
        let b4 = book.submit(OrderRequest::bid("b4", d("0.35"), d("20"))).unwrap();

        let asks: Vec<OrderId> = book.sorted_asks().iter().map(|o| o.id).collect();
        assert_eq!(asks, vec![a2.id, a1.id, a3.id]);

        let bids: Vec<OrderId> = book.sorted_bids().iter().map(|o| o.id).collect();
        assert_eq!(bids, vec![b3.id, b2.id, b1.id, b4.id]);
    }

    #[test]
    fn test_cancel() {
        let book = OrderBook::new("NL-DAY-AHEAD");
        let order = book.submit(OrderRequest::bid("b1", d("0.38"), d("180"))).unwrap();

        book.cancel(order.id).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(book.sorted_bids().is_empty());

        assert!(matches!(
            book.cancel(order.id),
            Err(MarketError::OrderAlreadyTerminal { .. })
        ));
        assert!(matches!(
            book.cancel(OrderId::new(99)),
            Err(MarketError::OrderNotFound(id)) if id == OrderId::new(99)
        ));
    }

    #[test]
    fn test_expire_due() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let book = OrderBook::new("NL-INTRADAY");
        let short = book
            .submit(OrderRequest::ask("s1", d("0.30"), d("10")).at(t0).with_ttl_seconds(30))
            .unwrap();
        let long = book
            .submit(OrderRequest::ask("s2", d("0.31"), d("10")).at(t0).with_ttl_seconds(90))
            .unwrap();

        assert!(book.expire_due(t0 + Duration::seconds(29)).is_empty());

        let expired = book.expire_due(t0 + Duration::seconds(31));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, short.id);
        assert_eq!(short.status(), OrderStatus::Expired);
        assert_eq!(long.status(), OrderStatus::Pending);

        // Already expired: not reported twice
        assert!(book.expire_due(t0 + Duration::seconds(45)).is_empty());
    }

    #[test]
    fn test_order_book_snapshot() {
        let book = OrderBook::new("NL-DAY-AHEAD");
        book.submit(OrderRequest::ask("s1", d("0.36"), d("100"))).unwrap();
        book.submit(OrderRequest::ask("s2", d("0.36"), d("50"))).unwrap();
        book.submit(OrderRequest::bid("b1", d("0.32"), d("120"))).unwrap();
        book.submit(OrderRequest::demand("b2", d("40"))).unwrap();

        let snapshot = book.snapshot();
        assert_eq!(snapshot.best_ask(), Some(d("0.36")));
        assert_eq!(snapshot.best_bid(), Some(d("0.32")));
        assert_eq!(snapshot.asks, vec![(d("0.36"), d("150"))]);
        assert_eq!(snapshot.spread, Some(d("0.04")));
        assert_eq!(snapshot.mid_price, Some(d("0.34")));
        assert_eq!(snapshot.orders.len(), 4);
        assert_eq!(book.open_quantity(Side::Bid), d("160"));
    }
}
