// ============================================================================
// Market Clearing Library
// Order books and clearing mechanisms for simulated electricity markets
// ============================================================================

//! # Market Clearing
//!
//! Clearing core for peer-to-peer and wholesale electricity market
//! simulations.
//!
//! ## Features
//!
//! - **Pairwise matching** with a configurable spread split `k`
//! - **Uniform-price clearing** from cumulative supply/demand curves, with
//!   a reproducible textual trace of every decision
//! - **Continuous double auction** with expiring quotes and escrowed
//!   balances and inventory
//! - **Periodic batch clearing** on a fixed interval grid driven by an
//!   explicit clock, a background worker, or a tokio timer (`async`)
//!
//! ## Example
//!
//! ```rust
//! use market_clearing::prelude::*;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! let clearer = MarketBuilder::new("NL-DAY-AHEAD")
//!     .uniform_price()
//!     .interval_seconds(900)
//!     .build(Arc::new(NoOpEventHandler))
//!     .unwrap();
//!
//! let now = chrono::Utc::now();
//! clearer
//!     .submit(OrderRequest::ask("solar-1", Decimal::new(30, 2), Decimal::from(200)), now)
//!     .unwrap();
//! clearer
//!     .submit(OrderRequest::bid("house-7", Decimal::new(38, 2), Decimal::from(180)), now)
//!     .unwrap();
//!
//! let result = clearer.trigger_clear_now().unwrap();
//! println!("P0 = {:?}, Q0 = {}", result.clearing_price, result.cleared_quantity);
//! println!("{}", result.trace);
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod utils;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::{
        Account, ClearingMechanism, ClearingResult, ClearingTrace, Fill, Ledger, MarketConfig,
        Order, OrderBook, OrderBookSnapshot, OrderId, OrderKind, OrderRequest, OrderStatus,
        OrderView, Side, DEFAULT_SPREAD_SPLIT,
    };
    pub use crate::engine::{
        create_from_config, ClearingScheduler, ClearingWorker, ContinuousAuctionBook,
        CurveClearingEngine, MarketBuilder, PairwiseMatcher, PeriodicBatchClearer,
        UniformPriceClearing,
    };
    pub use crate::error::{MarketError, MarketResult};
    pub use crate::interfaces::{
        ClearingPolicy, EventHandler, LoggingEventHandler, MarketEvent, NoOpEventHandler,
    };
}
