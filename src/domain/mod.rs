// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod clearing_result;
pub mod config;
pub mod fill;
pub mod ledger;
pub mod order;
pub mod order_book;

pub use clearing_result::{fmt_decimal, ClearingResult, ClearingTrace};
pub use config::{ClearingMechanism, MarketConfig, DEFAULT_SPREAD_SPLIT};
pub use fill::Fill;
pub use ledger::{Account, Ledger};
pub use order::{Order, OrderId, OrderKind, OrderRequest, OrderView, Side};
pub use order_book::{OrderBook, OrderBookSnapshot};

// Re-export state machine
pub use order::state::{OrderStatus, StatusTransition};
