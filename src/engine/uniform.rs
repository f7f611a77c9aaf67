// ============================================================================
// Uniform Price Clearing
// Curve intersection applied to a book: one marginal price for every fill
// ============================================================================

use crate::domain::{fmt_decimal, ClearingResult, Fill, Order, OrderBook, OrderStatus};
use crate::engine::curve_clearing::CurveClearingEngine;
use crate::error::MarketResult;
use crate::interfaces::ClearingPolicy;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Uniform-price batch clearing.
///
/// Runs [`CurveClearingEngine`] over the open orders, then:
/// - every ask priced at or below P0 and every bid priced at or above P0 is
///   matched in full
/// - quantity-only demand takes what the eligible asks supply, in book
///   order; a shortfall leaves it partially matched and the rest rolls over
/// - fills pair eligible asks (ascending) with eligible bids (descending),
///   all settled at P0
/// - every other open order becomes unmatched and rolls over
///
/// Eligible volumes on the two sides may differ; the result reports both.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformPriceClearing {
    engine: CurveClearingEngine,
}

impl UniformPriceClearing {
    pub fn new() -> Self {
        Self {
            engine: CurveClearingEngine::new(),
        }
    }

    /// Pair eligible orders at `price` without touching their state.
    fn pair_fills(
        asks: &[Arc<Order>],
        bids: &[Arc<Order>],
        price: Decimal,
        round: u64,
    ) -> Vec<Fill> {
        let mut fills = Vec::new();
        let mut ask_left: Vec<Decimal> = asks.iter().map(|o| o.remaining_quantity()).collect();
        let mut bid_left: Vec<Decimal> = bids.iter().map(|o| o.remaining_quantity()).collect();
        let (mut i, mut j) = (0usize, 0usize);

        while i < asks.len() && j < bids.len() {
            let quantity = ask_left[i].min(bid_left[j]);
            if quantity > Decimal::ZERO {
                fills.push(Fill::uniform(
                    fills.len() as u64 + 1,
                    round,
                    asks[i].id,
                    bids[j].id,
                    quantity,
                    price,
                ));
            }
            ask_left[i] -= quantity;
            bid_left[j] -= quantity;

            if ask_left[i].is_zero() {
                i += 1;
            }
            if bid_left[j].is_zero() {
                j += 1;
            }
        }

        fills
    }
}

impl ClearingPolicy for UniformPriceClearing {
    fn clear(&self, book: &OrderBook, round: u64) -> MarketResult<ClearingResult> {
        let asks = book.sorted_asks();
        let bids = book.sorted_bids();
        let intersection = self.engine.clear(&asks, &bids);

        let mut result = ClearingResult::new(round, self.name());
        result.trace.push(format!(
            "round {}: uniform price, {} asks, {} bids",
            round,
            asks.len(),
            bids.len()
        ));
        result.trace.extend(intersection.trace.clone());

        let price = match intersection.price {
            Some(price) if intersection.has_trade() => price,
            _ => {
                for order in asks.iter().chain(bids.iter()) {
                    order.try_mark_unmatched();
                    if order.is_open() {
                        result.unmatched.push(order.view());
                    }
                }
                return Ok(result);
            },
        };

        let (eligible_asks, resting_asks): (Vec<Arc<Order>>, Vec<Arc<Order>>) = asks
            .into_iter()
            .partition(|o| o.price().is_some_and(|p| p <= price));
        let (eligible_bids, resting_bids): (Vec<Arc<Order>>, Vec<Arc<Order>>) = bids
            .into_iter()
            .partition(|o| self.prices_cross(o.price(), price));

        result.clearing_price = Some(price);
        result.cleared_quantity = intersection.quantity;
        result.ask_volume = eligible_asks.iter().map(|o| o.remaining_quantity()).sum();
        result.bid_volume = eligible_bids.iter().map(|o| o.remaining_quantity()).sum();
        result.fills = Self::pair_fills(&eligible_asks, &eligible_bids, price, round);

        for order in &eligible_asks {
            order.try_fill_remaining()?;
            result.matched.push(order.id);
        }

        let mut supply_left = result.ask_volume;
        for order in &eligible_bids {
            if order.price().is_some() {
                order.try_fill_remaining()?;
                result.matched.push(order.id);
                continue;
            }

            let quantity = order.remaining_quantity().min(supply_left);
            if quantity.is_zero() {
                order.try_mark_unmatched();
            } else {
                supply_left -= quantity;
                order.try_fill(quantity)?;
            }

            if order.status() == OrderStatus::Matched {
                result.matched.push(order.id);
            } else if order.is_open() {
                result.trace.push(format!(
                    "demand {} short by {}",
                    order.id,
                    fmt_decimal(order.remaining_quantity())
                ));
                result.unmatched.push(order.view());
            }
        }

        for order in resting_asks.iter().chain(resting_bids.iter()) {
            order.try_mark_unmatched();
            if order.is_open() {
                result.unmatched.push(order.view());
            }
        }

        result.trace.push(format!(
            "matched at {}: ask volume {}, bid volume {}, {} fills",
            fmt_decimal(price),
            fmt_decimal(result.ask_volume),
            fmt_decimal(result.bid_volume),
            result.fills.len()
        ));
        if result.ask_volume != result.bid_volume {
            tracing::debug!(
                round,
                ask_volume = %result.ask_volume,
                bid_volume = %result.bid_volume,
                "eligible volumes differ at clearing price"
            );
        }

        debug_assert!(result
            .matched
            .iter()
            .filter_map(|id| book.get(*id))
            .all(|o| o.status() == OrderStatus::Matched));

        Ok(result)
    }

    fn name(&self) -> &str {
        "UniformPrice"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, OrderRequest};
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
    fn test_reference_round_marks_whole_orders() {
        let book = reference_book();
        let result = UniformPriceClearing::new().clear(&book, 1).unwrap();

        assert_eq!(result.clearing_price, Some(d("0.34")));
        assert_eq!(result.cleared_quantity, d("350"));
        assert_eq!(result.ask_volume, d("350"));
        assert_eq!(result.bid_volume, d("380"));
        assert_eq!(
            result.matched,
            vec![
                OrderId::new(1),
                OrderId::new(2),
                OrderId::new(4),
                OrderId::new(5)
            ]
        );

        let status = |id: u64| book.get(OrderId::new(id)).unwrap().status();
        assert_eq!(status(3), OrderStatus::Unmatched);
        assert_eq!(status(5), OrderStatus::Matched);
        assert_eq!(status(6), OrderStatus::Unmatched);
        assert_eq!(result.unmatched.len(), 2);

        assert!(result.fills.iter().all(|f| f.is_uniform()));
        assert!(result
            .fills
            .iter()
            .all(|f| f.settlement_price_for_bid == d("0.34")));
        assert_eq!(result.total_fill_quantity(), d("350"));
    }

    #[test]
    fn test_trace_explains_intersection() {
        let book = reference_book();
        let result = UniformPriceClearing::new().clear(&book, 7).unwrap();
        let text = result.trace.to_string();

        assert!(text.starts_with("round 7: uniform price"));
        assert!(text.contains("result: P0 = 0.34, Q0 = 350"));
    }

    #[test]
    fn test_no_crossing_rolls_everything_over() {
        let book = OrderBook::new("P2P");
        book.submit(OrderRequest::ask("s", d("0.50"), d("10"))).unwrap();
        book.submit(OrderRequest::bid("b", d("0.40"), d("10"))).unwrap();

        let result = UniformPriceClearing::new().clear(&book, 1).unwrap();

        assert_eq!(result.clearing_price, None);
        assert!(!result.has_trade());
        assert!(result.fills.is_empty());
        assert_eq!(result.unmatched.len(), 2);
        assert!(book
            .orders()
            .iter()
            .all(|o| o.status() == OrderStatus::Unmatched));
    }

    #[test]
    fn test_inelastic_demand_takes_cheapest_supply() {
        let book = OrderBook::new("GRID");
        book.submit(OrderRequest::ask("s1", d("0.30"), d("200"))).unwrap();
        book.submit(OrderRequest::ask("s2", d("0.33"), d("150"))).unwrap();
        book.submit(OrderRequest::ask("s3", d("0.36"), d("100"))).unwrap();
        let demand = book.submit(OrderRequest::demand("grid", d("250"))).unwrap();

        let result = UniformPriceClearing::new().clear(&book, 1).unwrap();

        assert_eq!(result.clearing_price, Some(d("0.33")));
        assert_eq!(result.cleared_quantity, d("250"));
        assert_eq!(demand.status(), OrderStatus::Matched);
        assert_eq!(
            book.get(OrderId::new(3)).unwrap().status(),
            OrderStatus::Unmatched
        );
    }

    #[test]
    fn test_demand_beyond_supply_fills_only_what_is_offered() {
        let book = OrderBook::new("GRID");
        book.submit(OrderRequest::ask("s1", d("0.30"), d("200"))).unwrap();
        book.submit(OrderRequest::ask("s2", d("0.33"), d("150"))).unwrap();
        book.submit(OrderRequest::ask("s3", d("0.36"), d("100"))).unwrap();
        let demand = book.submit(OrderRequest::demand("grid", d("500"))).unwrap();

        let result = UniformPriceClearing::new().clear(&book, 1).unwrap();

        assert_eq!(result.clearing_price, Some(d("0.36")));
        assert_eq!(result.cleared_quantity, d("450"));
        assert_eq!(result.total_fill_quantity(), d("450"));

        assert_eq!(demand.status(), OrderStatus::PartiallyMatched);
        assert_eq!(demand.remaining_quantity(), d("50"));
        assert!(!result.matched.contains(&demand.id));
        assert!(result.is_unmatched(demand.id));
        assert!(result.trace.to_string().contains("short by 50"));
    }

    #[test]
    fn test_empty_ask_side_marks_bids_unmatched() {
        let book = OrderBook::new("P2P");
        let bid = book.submit(OrderRequest::bid("b", d("0.40"), d("10"))).unwrap();

        let result = UniformPriceClearing::new().clear(&book, 1).unwrap();

        assert!(!result.has_trade());
        assert_eq!(bid.status(), OrderStatus::Unmatched);
    }

    proptest! {
        #[test]
        fn prop_uniform_fills_are_bounded_by_eligible_volume(
            asks in prop::collection::vec((1u32..100, 1u32..500), 1..10),
            bids in prop::collection::vec((1u32..100, 1u32..500), 1..10),
        ) {
            let book = OrderBook::new("PROP");
            for (price, qty) in &asks {
                book.submit(OrderRequest::ask("s", Decimal::new(*price as i64, 2), Decimal::from(*qty))).unwrap();
            }
            for (price, qty) in &bids {
                book.submit(OrderRequest::bid("b", Decimal::new(*price as i64, 2), Decimal::from(*qty))).unwrap();
            }

            let result = UniformPriceClearing::new().clear(&book, 1).unwrap();

            prop_assert!(result.total_fill_quantity() <= result.ask_volume.min(result.bid_volume));
            if let Some(price) = result.clearing_price {
                for fill in &result.fills {
                    prop_assert_eq!(fill.settlement_price_for_ask, price);
                    prop_assert_eq!(fill.settlement_price_for_bid, price);
                }
            }
            for order in book.orders() {
                prop_assert!(matches!(order.status(), OrderStatus::Matched | OrderStatus::Unmatched));
            }
        }
    }
}
