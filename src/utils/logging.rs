// ============================================================================
// Logging
// tracing-subscriber setup with an environment-driven filter
// ============================================================================

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_DIRECTIVES: &str = "market_clearing=info";

/// Install a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_LOG_DIRECTIVES`].
///
/// Returns false if a global subscriber was already installed.
pub fn init_logging() -> bool {
    init_logging_with(DEFAULT_LOG_DIRECTIVES)
}

/// Same as [`init_logging`] with a custom fallback filter
pub fn init_logging_with(default_directives: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
