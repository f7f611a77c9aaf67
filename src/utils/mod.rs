// ============================================================================
// Utilities Module
// Logging setup for binaries and demos embedding the crate
// ============================================================================

#[cfg(feature = "logging")]
mod logging;

#[cfg(feature = "logging")]
pub use logging::{init_logging, init_logging_with, DEFAULT_LOG_DIRECTIVES};
