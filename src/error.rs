// ============================================================================
// Market Errors
// Error kinds raised synchronously by book, matcher and auction operations
// ============================================================================

use crate::domain::{OrderId, OrderStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors returned by market operations.
///
/// Every variant is raised at the violating call before any state is
/// mutated. "No crossing orders" is not an error: it is a clearing result
/// with zero cleared quantity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    /// Non-positive price or quantity, `k` outside `[0, 1]`, bad configuration
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Counterparty balance cannot cover `price x quantity`
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Counterparty holds less energy than requested
    #[error("insufficient inventory: required {required}, available {available}")]
    InsufficientInventory {
        required: Decimal,
        available: Decimal,
    },

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// Order already reached matched, expired or cancelled
    #[error("order {id} is already terminal ({status:?})")]
    OrderAlreadyTerminal { id: OrderId, status: OrderStatus },
}

impl MarketError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        MarketError::InvalidParameter(reason.into())
    }
}

/// Result type alias for market operations
pub type MarketResult<T> = Result<T, MarketError>;
