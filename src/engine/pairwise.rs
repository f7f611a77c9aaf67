// ============================================================================
// Pairwise Split Matching
// Pay-as-bid style cursor matching with a configurable spread split
// ============================================================================

use crate::domain::config::validate_spread_split;
use crate::domain::{
    fmt_decimal, ClearingResult, Fill, Order, OrderBook, OrderStatus, DEFAULT_SPREAD_SPLIT,
};
use crate::error::MarketResult;
use crate::interfaces::ClearingPolicy;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Pairwise bid/ask matching with spread-split coefficient `k`.
///
/// Asks are walked ascending and bids descending. Each crossing pair trades
/// `min(ask.remaining, bid.remaining)` and settles at
///
/// ```text
/// bid pays  = bid - k * (bid - ask)
/// ask gets  = ask + (1 - k) * (bid - ask)
/// ```
///
/// so `k = 0.5` shares the spread evenly, `k = 0` hands it all to the ask
/// side and `k = 1` all to the bid side. The walk stops at the first pair
/// whose bid is below its ask.
///
/// # Example
/// ```text
/// asks: 0.30 x 200, 0.33 x 150      bids: 0.38 x 180, 0.35 x 200
///
/// fill 1: ask 0.30 / bid 0.38, q 180, both settle 0.34
/// fill 2: ask 0.30 / bid 0.35, q  20, both settle 0.325
/// fill 3: ask 0.33 / bid 0.35, q 150, both settle 0.34
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PairwiseMatcher {
    k: Decimal,
}

impl PairwiseMatcher {
    /// # Errors
    /// `InvalidParameter` if `k` is outside `[0, 1]`.
    pub fn new(k: Decimal) -> MarketResult<Self> {
        validate_spread_split(k)?;
        Ok(Self { k })
    }

    /// Matcher with `k = 0.5`
    pub fn even_split() -> Self {
        Self {
            k: DEFAULT_SPREAD_SPLIT,
        }
    }

    pub fn k(&self) -> Decimal {
        self.k
    }

    /// Returns `(settlement price for ask, settlement price for bid)`.
    pub fn settlement_prices(&self, bid_price: Decimal, ask_price: Decimal) -> (Decimal, Decimal) {
        let spread = bid_price - ask_price;
        let for_bid = bid_price - self.k * spread;
        let for_ask = ask_price + (Decimal::ONE - self.k) * spread;
        (for_ask.normalize(), for_bid.normalize())
    }
}

impl ClearingPolicy for PairwiseMatcher {
    fn clear(&self, book: &OrderBook, round: u64) -> MarketResult<ClearingResult> {
        let asks = book.sorted_asks();
        let (bids, quantity_only): (Vec<Arc<Order>>, Vec<Arc<Order>>) = book
            .sorted_bids()
            .into_iter()
            .partition(|o| o.price().is_some());

        let mut result = ClearingResult::new(round, self.name());
        result.trace.push(format!(
            "round {}: pairwise split k = {}, {} asks, {} bids",
            round,
            fmt_decimal(self.k),
            asks.len(),
            bids.len()
        ));
        for order in &quantity_only {
            result.trace.push(format!(
                "bid {} is quantity-only: no price to split, skipped",
                order.id
            ));
        }

        let (mut i, mut j) = (0usize, 0usize);

        while i < asks.len() && j < bids.len() {
            let ask = &asks[i];
            let bid = &bids[j];
            let (Some(ask_price), Some(bid_price)) = (ask.price(), bid.price()) else {
                break;
            };

            if !self.prices_cross(Some(bid_price), ask_price) {
                result.trace.push(format!(
                    "bid {} at {} < ask {} at {}: stop",
                    bid.id,
                    fmt_decimal(bid_price),
                    ask.id,
                    fmt_decimal(ask_price)
                ));
                break;
            }

            let matched = ask.remaining_quantity().min(bid.remaining_quantity());
            let (for_ask, for_bid) = self.settlement_prices(bid_price, ask_price);

            ask.try_fill(matched)?;
            bid.try_fill(matched)?;

            let fill = Fill::new(
                result.fills.len() as u64 + 1,
                round,
                ask.id,
                bid.id,
                matched,
                for_ask,
                for_bid,
            );
            result.trace.push(format!(
                "fill {}: ask {} at {} x bid {} at {}, q {}, ask gets {}, bid pays {}",
                fill.sequence,
                ask.id,
                fmt_decimal(ask_price),
                bid.id,
                fmt_decimal(bid_price),
                fmt_decimal(matched),
                fmt_decimal(for_ask),
                fmt_decimal(for_bid)
            ));
            tracing::debug!(
                round,
                ask = %ask.id,
                bid = %bid.id,
                quantity = %matched,
                ask_price = %for_ask,
                bid_price = %for_bid,
                "pairwise fill"
            );
            result.fills.push(fill);

            if ask.remaining_quantity().is_zero() {
                i += 1;
            }
            if bid.remaining_quantity().is_zero() {
                j += 1;
            }
        }

        let leftovers = asks[i..]
            .iter()
            .chain(bids[j..].iter())
            .chain(quantity_only.iter());
        for order in leftovers {
            order.try_mark_unmatched();
        }

        for order in asks.iter().chain(bids.iter()).chain(quantity_only.iter()) {
            if order.status() == OrderStatus::Matched {
                result.matched.push(order.id);
            } else if order.is_open() {
                result.unmatched.push(order.view());
            }
        }

        result.cleared_quantity = result.total_fill_quantity();
        result.ask_volume = result.cleared_quantity;
        result.bid_volume = result.cleared_quantity;
        result.trace.push(format!(
            "round {} total: {} fills, q {}",
            round,
            result.fills.len(),
            fmt_decimal(result.cleared_quantity)
        ));

        Ok(result)
    }

    fn name(&self) -> &str {
        "PairwiseSplit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, OrderRequest};
    use crate::error::MarketError;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn reference_book() -> OrderBook {
        let book = OrderBook::new("P2P");
        for (price, qty) in [("0.30", "200"), ("0.33", "150"), ("0.36", "100")] {
            book.submit(OrderRequest::ask("seller", d(price), d(qty))).unwrap();
        }
        for (price, qty) in [("0.38", "180"), ("0.35", "200"), ("0.32", "120")] {
            book.submit(OrderRequest::bid("buyer", d(price), d(qty))).unwrap();
        }
        book
    }

    #[test]
    fn test_k_outside_unit_interval_is_rejected() {
        assert!(matches!(
            PairwiseMatcher::new(d("1.01")),
            Err(MarketError::InvalidParameter(_))
        ));
        assert!(PairwiseMatcher::new(d("-0.1")).is_err());
        assert!(PairwiseMatcher::new(Decimal::ZERO).is_ok());
        assert!(PairwiseMatcher::new(Decimal::ONE).is_ok());
    }

    #[test]
    fn test_settlement_split() {
        let bid = d("0.38");
        let ask = d("0.30");

        let even = PairwiseMatcher::even_split();
        assert_eq!(even.settlement_prices(bid, ask), (d("0.34"), d("0.34")));

        // Whole spread to the ask side
        let k0 = PairwiseMatcher::new(Decimal::ZERO).unwrap();
        assert_eq!(k0.settlement_prices(bid, ask), (bid, bid));

        // Whole spread to the bid side
        let k1 = PairwiseMatcher::new(Decimal::ONE).unwrap();
        assert_eq!(k1.settlement_prices(bid, ask), (ask, ask));
    }

    #[test]
    fn test_reference_round() {
        let book = reference_book();
        let result = PairwiseMatcher::even_split().clear(&book, 1).unwrap();

        assert_eq!(result.fills.len(), 3);

        let first = &result.fills[0];
        assert_eq!(first.ask_order_id, OrderId::new(1));
        assert_eq!(first.bid_order_id, OrderId::new(4));
        assert_eq!(first.matched_quantity, d("180"));
        assert_eq!(first.settlement_price_for_ask, d("0.34"));
        assert_eq!(first.settlement_price_for_bid, d("0.34"));

        let second = &result.fills[1];
        assert_eq!(second.ask_order_id, OrderId::new(1));
        assert_eq!(second.bid_order_id, OrderId::new(5));
        assert_eq!(second.matched_quantity, d("20"));
        assert_eq!(second.settlement_price_for_bid, d("0.325"));

        let third = &result.fills[2];
        assert_eq!(third.ask_order_id, OrderId::new(2));
        assert_eq!(third.matched_quantity, d("150"));

        assert_eq!(result.cleared_quantity, d("350"));
        assert_eq!(result.clearing_price, None);
        assert_eq!(
            result.matched,
            vec![OrderId::new(1), OrderId::new(2), OrderId::new(4)]
        );

        let status = |id: u64| book.get(OrderId::new(id)).unwrap().status();
        assert_eq!(status(3), OrderStatus::Unmatched);
        assert_eq!(status(5), OrderStatus::PartiallyMatched);
        assert_eq!(status(6), OrderStatus::Unmatched);
        assert_eq!(
            book.get(OrderId::new(5)).unwrap().remaining_quantity(),
            d("30")
        );
        assert!(result.is_unmatched(OrderId::new(5)));
    }

    #[test]
    fn test_non_crossing_book_produces_no_fills() {
        let book = OrderBook::new("P2P");
        book.submit(OrderRequest::ask("s1", d("0.40"), d("100"))).unwrap();
        book.submit(OrderRequest::ask("s2", d("0.42"), d("100"))).unwrap();
        book.submit(OrderRequest::bid("b1", d("0.30"), d("100"))).unwrap();
        book.submit(OrderRequest::bid("b2", d("0.28"), d("100"))).unwrap();

        let result = PairwiseMatcher::even_split().clear(&book, 1).unwrap();

        assert!(result.fills.is_empty());
        assert_eq!(result.cleared_quantity, Decimal::ZERO);
        assert_eq!(result.unmatched.len(), 4);
        assert!(book
            .orders()
            .iter()
            .all(|o| o.status() == OrderStatus::Unmatched));
    }

    #[test]
    fn test_quantity_only_demand_is_skipped() {
        let book = OrderBook::new("P2P");
        book.submit(OrderRequest::ask("s1", d("0.30"), d("100"))).unwrap();
        let demand = book.submit(OrderRequest::demand("grid", d("50"))).unwrap();

        let result = PairwiseMatcher::even_split().clear(&book, 1).unwrap();

        assert!(result.fills.is_empty());
        assert_eq!(demand.status(), OrderStatus::Unmatched);
        assert!(result.trace.lines()[1].contains("quantity-only"));
    }

    #[test]
    fn test_rolled_over_orders_match_next_round() {
        let book = OrderBook::new("P2P");
        let ask = book.submit(OrderRequest::ask("s1", d("0.30"), d("100"))).unwrap();

        PairwiseMatcher::even_split().clear(&book, 1).unwrap();
        assert_eq!(ask.status(), OrderStatus::Unmatched);

        book.submit(OrderRequest::bid("b1", d("0.40"), d("100"))).unwrap();
        let result = PairwiseMatcher::even_split().clear(&book, 2).unwrap();

        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].round, 2);
        assert_eq!(ask.status(), OrderStatus::Matched);
    }

    proptest! {
        #[test]
        fn prop_fills_respect_remaining_and_conservation(
            asks in prop::collection::vec((1u32..100, 1u32..500), 0..10),
            bids in prop::collection::vec((1u32..100, 1u32..500), 0..10),
            k in 0u32..=100,
        ) {
            let book = OrderBook::new("PROP");
            for (price, qty) in &asks {
                book.submit(OrderRequest::ask("s", Decimal::new(*price as i64, 2), Decimal::from(*qty))).unwrap();
            }
            for (price, qty) in &bids {
                book.submit(OrderRequest::bid("b", Decimal::new(*price as i64, 2), Decimal::from(*qty))).unwrap();
            }
            let total_ask: Decimal = asks.iter().map(|(_, q)| Decimal::from(*q)).sum();
            let total_bid: Decimal = bids.iter().map(|(_, q)| Decimal::from(*q)).sum();

            let matcher = PairwiseMatcher::new(Decimal::new(k as i64, 2)).unwrap();
            let result = matcher.clear(&book, 1).unwrap();

            prop_assert!(result.total_fill_quantity() <= total_ask.min(total_bid));

            for order in book.orders() {
                let filled: Decimal = result
                    .fills_for(order.id)
                    .map(|f| f.matched_quantity)
                    .sum();
                prop_assert!(order.remaining_quantity() >= Decimal::ZERO);
                prop_assert_eq!(order.quantity - order.remaining_quantity(), filled);
                prop_assert_eq!(order.status() == OrderStatus::Matched, order.remaining_quantity().is_zero());
                if order.status() == OrderStatus::PartiallyMatched {
                    prop_assert!(order.remaining_quantity() < order.quantity);
                }
            }

            for fill in &result.fills {
                let ask = book.get(fill.ask_order_id).unwrap();
                let bid = book.get(fill.bid_order_id).unwrap();
                let (ask_price, bid_price) = (ask.price().unwrap(), bid.price().unwrap());
                prop_assert!(ask_price <= fill.settlement_price_for_ask);
                prop_assert!(fill.settlement_price_for_bid <= bid_price);
                if k == 50 {
                    prop_assert!(fill.is_uniform());
                }
            }
        }
    }
}
