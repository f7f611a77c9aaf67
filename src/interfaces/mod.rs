// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod clearing_policy;
mod event_handler;

pub use clearing_policy::ClearingPolicy;
pub use event_handler::{EventHandler, LoggingEventHandler, MarketEvent, NoOpEventHandler};
