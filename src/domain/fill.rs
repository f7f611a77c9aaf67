// ============================================================================
// Fill Domain Model
// ============================================================================

use rust_decimal::Decimal;

use super::OrderId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A matched quantity between one ask and one bid.
///
/// Under uniform clearing both settlement prices equal the marginal price;
/// under pairwise split they may differ by the unallocated spread.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fill {
    /// 1-based position of this fill within its pass; continuous books
    /// number acceptances over the book's lifetime
    pub sequence: u64,

    /// Round (clearing pass) the fill belongs to; 0 for continuous acceptances
    pub round: u64,

    pub ask_order_id: OrderId,
    pub bid_order_id: OrderId,

    pub matched_quantity: Decimal,

    /// Price per unit received by the seller
    pub settlement_price_for_ask: Decimal,

    /// Price per unit paid by the buyer
    pub settlement_price_for_bid: Decimal,
}

impl Fill {
    pub fn new(
        sequence: u64,
        round: u64,
        ask_order_id: OrderId,
        bid_order_id: OrderId,
        matched_quantity: Decimal,
        settlement_price_for_ask: Decimal,
        settlement_price_for_bid: Decimal,
    ) -> Self {
        Self {
            sequence,
            round,
            ask_order_id,
            bid_order_id,
            matched_quantity,
            settlement_price_for_ask: settlement_price_for_ask.normalize(),
            settlement_price_for_bid: settlement_price_for_bid.normalize(),
        }
    }

    /// Fill where both sides settle at one price
    pub fn uniform(
        sequence: u64,
        round: u64,
        ask_order_id: OrderId,
        bid_order_id: OrderId,
        matched_quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self::new(
            sequence,
            round,
            ask_order_id,
            bid_order_id,
            matched_quantity,
            price,
            price,
        )
    }

    /// Amount credited to the seller
    pub fn ask_proceeds(&self) -> Decimal {
        self.settlement_price_for_ask * self.matched_quantity
    }

    /// Amount debited from the buyer
    pub fn bid_cost(&self) -> Decimal {
        self.settlement_price_for_bid * self.matched_quantity
    }

    pub fn is_uniform(&self) -> bool {
        self.settlement_price_for_ask == self.settlement_price_for_bid
    }

    pub fn involves(&self, order_id: OrderId) -> bool {
        self.ask_order_id == order_id || self.bid_order_id == order_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_creation() {
        let fill = Fill::new(
            1,
            1,
            OrderId::new(1),
            OrderId::new(4),
            Decimal::from(180),
            Decimal::new(340, 3),
            Decimal::new(34, 2),
        );

        assert!(fill.is_uniform());
        assert!(fill.involves(OrderId::new(4)));
        assert!(!fill.involves(OrderId::new(2)));
        // normalized for stable rendering
        assert_eq!(fill.settlement_price_for_ask.to_string(), "0.34");
    }

    #[test]
    fn test_split_settlement_amounts() {
        let fill = Fill::new(
            2,
            1,
            OrderId::new(1),
            OrderId::new(5),
            Decimal::from(20),
            Decimal::new(35, 2),
            Decimal::new(30, 2),
        );

        assert!(!fill.is_uniform());
        assert_eq!(fill.ask_proceeds(), Decimal::from(7));
        assert_eq!(fill.bid_cost(), Decimal::from(6));
    }
}
