// ============================================================================
// Curve Clearing Engine
// Marginal-price discovery from cumulative supply and demand curves
// ============================================================================

use crate::domain::{fmt_decimal, ClearingTrace, Order, OrderBook, OrderKind};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Fixed split used only when every bid is above every ask:
/// `P0 = minBid - K * (minBid - maxAsk)`.
///
/// Unrelated to the configurable pairwise coefficient `k`.
pub const NON_CROSSING_FALLBACK_K: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

// ============================================================================
// Curves
// ============================================================================

/// One price level of a cumulative curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveStep {
    pub price: Decimal,
    /// Quantity offered or demanded at exactly this price
    pub quantity: Decimal,
    /// Running total including this level
    pub cumulative: Decimal,
}

/// Build cumulative steps from (price, quantity) pairs already in curve order,
/// merging equal prices into one level.
fn cumulate(levels: impl IntoIterator<Item = (Decimal, Decimal)>) -> Vec<CurveStep> {
    let mut steps: Vec<CurveStep> = Vec::new();
    let mut cumulative = Decimal::ZERO;

    for (price, quantity) in levels {
        cumulative += quantity;
        match steps.last_mut() {
            Some(step) if step.price == price => {
                step.quantity += quantity;
                step.cumulative = cumulative;
            },
            _ => steps.push(CurveStep {
                price,
                quantity,
                cumulative,
            }),
        }
    }

    steps
}

fn render_steps(steps: &[CurveStep]) -> String {
    steps
        .iter()
        .map(|s| format!("{} -> {}", fmt_decimal(s.price), fmt_decimal(s.cumulative)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ask curve: cumulative quantity offered at or below each price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyCurve {
    steps: Vec<CurveStep>,
}

impl SupplyCurve {
    pub fn from_asks(asks: &[Arc<Order>]) -> Self {
        let mut levels: Vec<(Decimal, Decimal)> = asks
            .iter()
            .filter_map(|order| match order.kind {
                OrderKind::Priced { price } => Some((price, order.remaining_quantity())),
                // Rejected at submission; nothing to put on the curve
                OrderKind::QuantityOnly => None,
            })
            .collect();
        levels.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            steps: cumulate(levels),
        }
    }

    pub fn steps(&self) -> &[CurveStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_quantity(&self) -> Decimal {
        self.steps.last().map(|s| s.cumulative).unwrap_or(Decimal::ZERO)
    }

    pub fn min_price(&self) -> Option<Decimal> {
        self.steps.first().map(|s| s.price)
    }

    pub fn max_price(&self) -> Option<Decimal> {
        self.steps.last().map(|s| s.price)
    }

    /// Price of the cheapest level whose cumulative quantity reaches `quantity`,
    /// i.e. the highest-priced ask needed to supply it.
    pub fn price_at(&self, quantity: Decimal) -> Option<Decimal> {
        self.steps
            .iter()
            .find(|s| s.cumulative >= quantity)
            .or(self.steps.last())
            .map(|s| s.price)
    }
}

/// Bid curve in one of its two modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemandCurve {
    /// Cumulative quantity bid at or above each price, descending price
    Priced(Vec<CurveStep>),

    /// Vertical line at total quantity-only demand, spanning every price.
    /// Any priced bids follow it, descending.
    Inelastic {
        demand: Decimal,
        priced: Vec<CurveStep>,
    },
}

impl DemandCurve {
    pub fn from_bids(bids: &[Arc<Order>]) -> Self {
        let mut demand = Decimal::ZERO;
        let mut levels: Vec<(Decimal, Decimal)> = Vec::with_capacity(bids.len());

        for order in bids {
            match order.kind {
                OrderKind::Priced { price } => levels.push((price, order.remaining_quantity())),
                OrderKind::QuantityOnly => demand += order.remaining_quantity(),
            }
        }
        levels.sort_by(|a, b| b.0.cmp(&a.0));

        if demand > Decimal::ZERO {
            DemandCurve::Inelastic {
                demand,
                priced: cumulate(levels),
            }
        } else {
            DemandCurve::Priced(cumulate(levels))
        }
    }

    pub fn priced_steps(&self) -> &[CurveStep] {
        match self {
            DemandCurve::Priced(steps) => steps,
            DemandCurve::Inelastic { priced, .. } => priced,
        }
    }

    pub fn inelastic_demand(&self) -> Decimal {
        match self {
            DemandCurve::Priced(_) => Decimal::ZERO,
            DemandCurve::Inelastic { demand, .. } => *demand,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inelastic_demand().is_zero() && self.priced_steps().is_empty()
    }

    pub fn total_quantity(&self) -> Decimal {
        self.inelastic_demand()
            + self
                .priced_steps()
                .last()
                .map(|s| s.cumulative)
                .unwrap_or(Decimal::ZERO)
    }

    /// Highest priced bid
    pub fn max_price(&self) -> Option<Decimal> {
        self.priced_steps().first().map(|s| s.price)
    }

    /// Lowest priced bid
    pub fn min_price(&self) -> Option<Decimal> {
        self.priced_steps().last().map(|s| s.price)
    }

    /// Segments in curve order; `None` is the inelastic block.
    fn segments(&self) -> Vec<(Option<Decimal>, Decimal)> {
        let inelastic = self.inelastic_demand();
        let mut segments = Vec::with_capacity(self.priced_steps().len() + 1);
        if inelastic > Decimal::ZERO {
            segments.push((None, inelastic));
        }
        segments.extend(self.priced_steps().iter().map(|s| (Some(s.price), s.quantity)));
        segments
    }

    fn render(&self) -> String {
        match self {
            DemandCurve::Priced(steps) => render_steps(steps),
            DemandCurve::Inelastic { demand, priced } if priced.is_empty() => {
                format!("inelastic {}", fmt_decimal(*demand))
            },
            DemandCurve::Inelastic { demand, priced } => {
                format!("inelastic {}, then {}", fmt_decimal(*demand), render_steps(priced))
            },
        }
    }
}

// ============================================================================
// Intersection
// ============================================================================

/// Which rule produced the clearing point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectionKind {
    /// One side of the book is empty
    NoOrders,
    /// Highest bid below lowest ask
    NoCrossing,
    /// Lowest bid above highest ask: fallback split price
    FullyCrossed,
    /// Only quantity-only demand: priced off the ask curve
    InelasticDemand,
    /// Discrete sign change found by walking the merged breakpoints
    Intersection,
}

#[derive(Debug, Clone)]
pub struct CurveIntersection {
    pub kind: IntersectionKind,
    /// Marginal price P0; `None` when nothing clears
    pub price: Option<Decimal>,
    /// Cleared quantity Q0
    pub quantity: Decimal,
    pub supply: SupplyCurve,
    pub demand: DemandCurve,
    pub trace: ClearingTrace,
}

impl CurveIntersection {
    pub fn has_trade(&self) -> bool {
        self.price.is_some() && self.quantity > Decimal::ZERO
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Uniform marginal clearing from cumulative curves.
///
/// Pure: the same set of orders always yields the same (P0, Q0) and trace.
///
/// # Example
/// ```text
/// asks: 0.30 x 200, 0.33 x 150, 0.36 x 100
/// bids: 0.38 x 180, 0.35 x 200, 0.32 x 120
///
/// q   0..180  bid 0.38 / ask 0.30
/// q 180..200  bid 0.35 / ask 0.30
/// q 200..350  bid 0.35 / ask 0.33
/// q 350       bid 0.35 < ask 0.36  -> P0 = (0.35 + 0.33) / 2 = 0.34, Q0 = 350
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CurveClearingEngine;

impl CurveClearingEngine {
    pub fn new() -> Self {
        Self
    }

    /// Clear the open orders of a book
    pub fn clear_book(&self, book: &OrderBook) -> CurveIntersection {
        self.clear(&book.sorted_asks(), &book.sorted_bids())
    }

    pub fn clear(&self, asks: &[Arc<Order>], bids: &[Arc<Order>]) -> CurveIntersection {
        let supply = SupplyCurve::from_asks(asks);
        let demand = DemandCurve::from_bids(bids);

        let mut trace = ClearingTrace::new();
        trace.push(format!("supply curve: {}", render_steps(supply.steps())));
        trace.push(format!("demand curve: {}", demand.render()));

        let (kind, price, quantity) = Self::intersect(&supply, &demand, &mut trace);

        match price {
            Some(p0) => trace.push(format!(
                "result: P0 = {}, Q0 = {}",
                fmt_decimal(p0),
                fmt_decimal(quantity)
            )),
            None => trace.push("result: no trade, Q0 = 0"),
        }

        CurveIntersection {
            kind,
            price,
            quantity,
            supply,
            demand,
            trace,
        }
    }

    fn intersect(
        supply: &SupplyCurve,
        demand: &DemandCurve,
        trace: &mut ClearingTrace,
    ) -> (IntersectionKind, Option<Decimal>, Decimal) {
        let (Some(min_ask), Some(max_ask)) = (supply.min_price(), supply.max_price()) else {
            trace.push("no asks: nothing to clear");
            return (IntersectionKind::NoOrders, None, Decimal::ZERO);
        };
        if demand.is_empty() {
            trace.push("no bids: nothing to clear");
            return (IntersectionKind::NoOrders, None, Decimal::ZERO);
        }

        let total_ask = supply.total_quantity();
        let total_bid = demand.total_quantity();

        match demand {
            DemandCurve::Priced(_) => {
                let (Some(max_bid), Some(min_bid)) = (demand.max_price(), demand.min_price())
                else {
                    return (IntersectionKind::NoOrders, None, Decimal::ZERO);
                };

                if max_bid < min_ask {
                    trace.push(format!(
                        "max bid {} < min ask {}: curves never cross",
                        fmt_decimal(max_bid),
                        fmt_decimal(min_ask)
                    ));
                    return (IntersectionKind::NoCrossing, None, Decimal::ZERO);
                }

                if min_bid > max_ask {
                    let p0 = min_bid - NON_CROSSING_FALLBACK_K * (min_bid - max_ask);
                    let q0 = total_ask.min(total_bid);
                    trace.push(format!(
                        "min bid {} > max ask {}: every order crosses",
                        fmt_decimal(min_bid),
                        fmt_decimal(max_ask)
                    ));
                    trace.push(format!(
                        "P0 = {} - {} x ({} - {}) = {}, Q0 = min({}, {}) = {}",
                        fmt_decimal(min_bid),
                        fmt_decimal(NON_CROSSING_FALLBACK_K),
                        fmt_decimal(min_bid),
                        fmt_decimal(max_ask),
                        fmt_decimal(p0),
                        fmt_decimal(total_ask),
                        fmt_decimal(total_bid),
                        fmt_decimal(q0)
                    ));
                    return (IntersectionKind::FullyCrossed, Some(p0.normalize()), q0);
                }
            },
            DemandCurve::Inelastic { demand: qd, priced } if priced.is_empty() => {
                let q0 = (*qd).min(total_ask);
                let p0 = supply.price_at(q0);
                if *qd > total_ask {
                    trace.push(format!(
                        "inelastic demand {} exceeds total asks {}: Q0 capped at {}",
                        fmt_decimal(*qd),
                        fmt_decimal(total_ask),
                        fmt_decimal(q0)
                    ));
                } else {
                    trace.push(format!(
                        "inelastic demand {} met from the ask curve",
                        fmt_decimal(*qd)
                    ));
                }
                if let Some(p0) = p0 {
                    trace.push(format!(
                        "highest ask needed for {} is priced {}",
                        fmt_decimal(q0),
                        fmt_decimal(p0)
                    ));
                }
                return (IntersectionKind::InelasticDemand, p0, q0);
            },
            DemandCurve::Inelastic { .. } => {},
        }

        Self::walk(supply, demand, trace)
    }

    /// Merge breakpoints in increasing quantity and stop at the first
    /// segment where bid < ask. P0 averages the two prices of the last
    /// crossing segment; Q0 is the breakpoint ending it.
    fn walk(
        supply: &SupplyCurve,
        demand: &DemandCurve,
        trace: &mut ClearingTrace,
    ) -> (IntersectionKind, Option<Decimal>, Decimal) {
        let asks = supply.steps();
        let bids = demand.segments();

        let (mut i, mut j) = (0usize, 0usize);
        let mut ask_left = asks[0].quantity;
        let mut bid_left = bids[0].1;
        let mut q = Decimal::ZERO;
        let mut last: Option<(Decimal, Option<Decimal>)> = None;

        while i < asks.len() && j < bids.len() {
            let ask_price = asks[i].price;
            let bid_price = bids[j].0;

            let crosses = match bid_price {
                Some(bid) => bid >= ask_price,
                None => true,
            };
            if !crosses {
                trace.push(format!(
                    "q {}: bid {} < ask {}, sign flips",
                    fmt_decimal(q),
                    render_bid(bid_price),
                    fmt_decimal(ask_price)
                ));
                break;
            }

            let step = ask_left.min(bid_left);
            trace.push(format!(
                "q {} -> {}: bid {} >= ask {}",
                fmt_decimal(q),
                fmt_decimal(q + step),
                render_bid(bid_price),
                fmt_decimal(ask_price)
            ));
            q += step;
            last = Some((ask_price, bid_price));

            ask_left -= step;
            bid_left -= step;
            if ask_left.is_zero() {
                i += 1;
                if let Some(next) = asks.get(i) {
                    ask_left = next.quantity;
                }
            }
            if bid_left.is_zero() {
                j += 1;
                if let Some(next) = bids.get(j) {
                    bid_left = next.1;
                }
            }
        }

        if i >= asks.len() || j >= bids.len() {
            trace.push(format!(
                "{} side exhausted at q {}",
                if i >= asks.len() { "ask" } else { "bid" },
                fmt_decimal(q)
            ));
        }

        let Some((ask_price, bid_price)) = last else {
            return (IntersectionKind::NoCrossing, None, Decimal::ZERO);
        };

        let p0 = match bid_price {
            Some(bid) => {
                let p0 = (bid + ask_price) / Decimal::TWO;
                trace.push(format!(
                    "P0 = ({} + {}) / 2 = {}",
                    fmt_decimal(bid),
                    fmt_decimal(ask_price),
                    fmt_decimal(p0)
                ));
                p0
            },
            None => {
                trace.push(format!(
                    "marginal units serve inelastic demand: P0 = ask {}",
                    fmt_decimal(ask_price)
                ));
                ask_price
            },
        };

        (IntersectionKind::Intersection, Some(p0.normalize()), q)
    }
}

fn render_bid(price: Option<Decimal>) -> String {
    match price {
        Some(p) => fmt_decimal(p),
        None => "inelastic".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderRequest;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn book_with(asks: &[(&str, &str)], bids: &[(&str, &str)]) -> OrderBook {
        let book = OrderBook::new("NL-DAY-AHEAD");
        for (i, (price, qty)) in asks.iter().enumerate() {
            book.submit(OrderRequest::ask(format!("s{}", i), d(price), d(qty)))
                .unwrap();
        }
        for (i, (price, qty)) in bids.iter().enumerate() {
            book.submit(OrderRequest::bid(format!("b{}", i), d(price), d(qty)))
                .unwrap();
        }
        book
    }

    fn reference_book() -> OrderBook {
        book_with(
            &[("0.30", "200"), ("0.33", "150"), ("0.36", "100")],
            &[("0.38", "180"), ("0.35", "200"), ("0.32", "120")],
        )
    }

    #[test]
    fn test_supply_curve_is_cumulative() {
        let book = book_with(&[("0.33", "150"), ("0.30", "200"), ("0.33", "50")], &[]);
        let supply = SupplyCurve::from_asks(&book.sorted_asks());

        assert_eq!(supply.steps().len(), 2);
        assert_eq!(supply.steps()[0].cumulative, d("200"));
        assert_eq!(supply.steps()[1].quantity, d("200"));
        assert_eq!(supply.total_quantity(), d("400"));
        assert_eq!(supply.price_at(d("201")), Some(d("0.33")));
        assert_eq!(supply.price_at(d("200")), Some(d("0.30")));
    }

    #[test]
    fn test_reference_intersection() {
        let result = CurveClearingEngine::new().clear_book(&reference_book());

        assert_eq!(result.kind, IntersectionKind::Intersection);
        assert_eq!(result.price, Some(d("0.34")));
        assert_eq!(result.quantity, d("350"));
        assert!(result.has_trade());
        assert_eq!(
            result.trace.lines().last().map(String::as_str),
            Some("result: P0 = 0.34, Q0 = 350")
        );
    }

    #[test]
    fn test_touching_curves_clear_at_common_price() {
        let book = book_with(&[("0.30", "100"), ("0.40", "50")], &[("0.30", "80")]);
        let result = CurveClearingEngine::new().clear_book(&book);

        assert_eq!(result.kind, IntersectionKind::Intersection);
        assert_eq!(result.price, Some(d("0.30")));
        assert_eq!(result.quantity, d("80"));
    }

    #[test]
    fn test_no_crossing() {
        let book = book_with(
            &[("0.40", "100"), ("0.45", "100")],
            &[("0.30", "100"), ("0.25", "100")],
        );
        let result = CurveClearingEngine::new().clear_book(&book);

        assert_eq!(result.kind, IntersectionKind::NoCrossing);
        assert_eq!(result.price, None);
        assert_eq!(result.quantity, Decimal::ZERO);
        assert!(!result.has_trade());
    }

    #[test]
    fn test_fully_crossed_uses_fallback_split() {
        let book = book_with(
            &[("0.10", "100"), ("0.12", "100")],
            &[("0.30", "500"), ("0.15", "10")],
        );
        let result = CurveClearingEngine::new().clear_book(&book);

        assert_eq!(result.kind, IntersectionKind::FullyCrossed);
        // 0.15 - 0.5 x (0.15 - 0.12)
        assert_eq!(result.price, Some(d("0.135")));
        assert_eq!(result.quantity, d("200"));
    }

    #[test]
    fn test_inelastic_demand_exceeding_supply() {
        let book = book_with(&[("0.30", "200"), ("0.33", "150"), ("0.36", "100")], &[]);
        book.submit(OrderRequest::demand("grid", d("500"))).unwrap();

        let result = CurveClearingEngine::new().clear_book(&book);

        assert_eq!(result.kind, IntersectionKind::InelasticDemand);
        assert_eq!(result.quantity, d("450"));
        assert_eq!(result.price, Some(d("0.36")));
    }

    #[test]
    fn test_inelastic_demand_within_supply() {
        let book = book_with(&[("0.30", "200"), ("0.33", "150"), ("0.36", "100")], &[]);
        book.submit(OrderRequest::demand("grid", d("250"))).unwrap();

        let result = CurveClearingEngine::new().clear_book(&book);

        assert_eq!(result.quantity, d("250"));
        assert_eq!(result.price, Some(d("0.33")));
    }

    #[test]
    fn test_inelastic_demand_with_priced_bids() {
        let book = book_with(
            &[("0.30", "200"), ("0.33", "150"), ("0.36", "100")],
            &[("0.34", "100"), ("0.20", "50")],
        );
        book.submit(OrderRequest::demand("grid", d("150"))).unwrap();

        let result = CurveClearingEngine::new().clear_book(&book);

        // inelastic 150 @ 0.30, then bid 0.34 takes 50 @ 0.30 and 50 @ 0.33,
        // then bid 0.20 < ask 0.33
        assert_eq!(result.kind, IntersectionKind::Intersection);
        assert_eq!(result.quantity, d("250"));
        assert_eq!(result.price, Some(d("0.335")));
    }

    #[test]
    fn test_empty_sides() {
        let engine = CurveClearingEngine::new();

        let no_bids = book_with(&[("0.30", "10")], &[]);
        assert_eq!(engine.clear_book(&no_bids).kind, IntersectionKind::NoOrders);

        let no_asks = book_with(&[], &[("0.30", "10")]);
        assert_eq!(engine.clear_book(&no_asks).kind, IntersectionKind::NoOrders);
    }

    #[test]
    fn test_trace_is_reproducible() {
        let first = CurveClearingEngine::new().clear_book(&reference_book());
        let second = CurveClearingEngine::new().clear_book(&reference_book());

        assert_eq!(first.trace, second.trace);
        assert_eq!(first.trace.lines()[0], "supply curve: 0.3 -> 200, 0.33 -> 350, 0.36 -> 450");
    }

    proptest! {
        #[test]
        fn prop_clearing_is_idempotent_and_bounded(
            asks in prop::collection::vec((1u32..100, 1u32..500), 1..12),
            bids in prop::collection::vec((1u32..100, 1u32..500), 1..12),
        ) {
            let book = OrderBook::new("PROP");
            for (price, qty) in &asks {
                book.submit(OrderRequest::ask("s", Decimal::new(*price as i64, 2), Decimal::from(*qty))).unwrap();
            }
            for (price, qty) in &bids {
                book.submit(OrderRequest::bid("b", Decimal::new(*price as i64, 2), Decimal::from(*qty))).unwrap();
            }

            let engine = CurveClearingEngine::new();
            let first = engine.clear_book(&book);
            let second = engine.clear_book(&book);

            prop_assert_eq!(first.price, second.price);
            prop_assert_eq!(first.quantity, second.quantity);
            prop_assert_eq!(&first.trace, &second.trace);

            let total_ask = first.supply.total_quantity();
            let total_bid = first.demand.total_quantity();
            prop_assert!(first.quantity <= total_ask.min(total_bid));

            if let Some(p0) = first.price {
                prop_assert!(p0 > Decimal::ZERO);
            }
        }
    }
}
