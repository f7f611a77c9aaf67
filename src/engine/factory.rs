// ============================================================================
// Market Factory
// Creates clearers and continuous books with proper configuration
// ============================================================================

use crate::domain::config::{ClearingMechanism, MarketConfig};
use crate::engine::{
    ContinuousAuctionBook, PairwiseMatcher, PeriodicBatchClearer, UniformPriceClearing,
};
use crate::error::MarketResult;
use crate::interfaces::{ClearingPolicy, EventHandler};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

// ============================================================================
// Factory Functions
// ============================================================================

/// Creates a batch clearer from configuration
///
/// # Arguments
/// * `config` - Market configuration
/// * `event_handler` - Receiver of order and clearing events
/// * `start` - Origin of the interval grid
///
/// # Example
/// ```
/// use market_clearing::prelude::*;
/// use market_clearing::engine::factory::create_from_config;
/// use std::sync::Arc;
///
/// let config = MarketConfig::uniform_price_auction("NL-DAY-AHEAD", 900);
/// let clearer = create_from_config(config, Arc::new(NoOpEventHandler), chrono::Utc::now()).unwrap();
/// assert_eq!(clearer.policy_name(), "UniformPrice");
/// ```
pub fn create_from_config(
    config: MarketConfig,
    event_handler: Arc<dyn EventHandler>,
    start: DateTime<Utc>,
) -> MarketResult<PeriodicBatchClearer> {
    config.validate()?;
    let policy = create_clearing_policy(&config)?;
    PeriodicBatchClearer::new(config, policy, event_handler, start)
}

/// Creates the clearing policy selected by the configuration
pub fn create_clearing_policy(config: &MarketConfig) -> MarketResult<Box<dyn ClearingPolicy>> {
    match config.mechanism {
        ClearingMechanism::Pairwise => Ok(Box::new(PairwiseMatcher::new(config.k)?)),
        ClearingMechanism::UniformPrice => Ok(Box::new(UniformPriceClearing::new())),
    }
}

// ============================================================================
// Builder Pattern
// ============================================================================

/// Builder for markets with a fluent API
///
/// # Example
/// ```
/// use market_clearing::prelude::*;
/// use market_clearing::engine::factory::MarketBuilder;
/// use rust_decimal::Decimal;
/// use std::sync::Arc;
///
/// let clearer = MarketBuilder::new("P2P")
///     .pairwise(Decimal::new(5, 1))
///     .interval_seconds(300)
///     .order_ttl_seconds(3600)
///     .build(Arc::new(NoOpEventHandler))
///     .unwrap();
///
/// assert_eq!(clearer.policy_name(), "PairwiseSplit");
/// ```
pub struct MarketBuilder {
    config: MarketConfig,
    start: Option<DateTime<Utc>>,
}

impl MarketBuilder {
    /// Uniform-price market with default interval
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            config: MarketConfig::new(instrument, ClearingMechanism::UniformPrice),
            start: None,
        }
    }

    pub fn from_config(config: MarketConfig) -> Self {
        Self {
            config,
            start: None,
        }
    }

    // ========================================================================
    // Mechanism
    // ========================================================================

    /// Pairwise matching with spread-split coefficient `k`
    pub fn pairwise(mut self, k: Decimal) -> Self {
        self.config.mechanism = ClearingMechanism::Pairwise;
        self.config.k = k;
        self
    }

    pub fn uniform_price(mut self) -> Self {
        self.config.mechanism = ClearingMechanism::UniformPrice;
        self
    }

    // ========================================================================
    // Timing
    // ========================================================================

    pub fn interval_seconds(mut self, seconds: u64) -> Self {
        self.config.interval_seconds = seconds;
        self
    }

    /// Default time-to-live for orders that carry none
    pub fn order_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.order_ttl_seconds = Some(seconds);
        self
    }

    /// Origin of the interval grid; defaults to the build time
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    pub fn build(self, event_handler: Arc<dyn EventHandler>) -> MarketResult<PeriodicBatchClearer> {
        let start = self.start.unwrap_or_else(Utc::now);
        create_from_config(self.config, event_handler, start)
    }

    /// Build a continuous book using the configured default TTL
    pub fn build_continuous(
        self,
        event_handler: Arc<dyn EventHandler>,
    ) -> MarketResult<ContinuousAuctionBook> {
        ContinuousAuctionBook::from_config(&self.config, event_handler)
    }

    /// Get the configuration without building (for inspection)
    pub fn get_config(&self) -> &MarketConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketError;
    use crate::interfaces::NoOpEventHandler;
    use chrono::TimeZone;

    #[test]
    fn test_create_uniform_clearer() {
        let config = MarketConfig::uniform_price_auction("NL-DAY-AHEAD", 900);
        let clearer = create_from_config(config, Arc::new(NoOpEventHandler), Utc::now()).unwrap();
        assert_eq!(clearer.policy_name(), "UniformPrice");
        assert_eq!(clearer.book().instrument(), "NL-DAY-AHEAD");
    }

    #[test]
    fn test_create_pairwise_clearer() {
        let config = MarketConfig::pay_as_bid("P2P", Decimal::new(25, 2));
        let clearer = create_from_config(config, Arc::new(NoOpEventHandler), Utc::now()).unwrap();
        assert_eq!(clearer.policy_name(), "PairwiseSplit");
    }

    #[test]
    fn test_invalid_k_is_rejected() {
        let config = MarketConfig::pay_as_bid("P2P", Decimal::new(15, 1));
        let result = create_from_config(config, Arc::new(NoOpEventHandler), Utc::now());
        assert!(matches!(result, Err(MarketError::InvalidParameter(_))));
    }

    #[test]
    fn test_builder_sets_grid_origin() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let clearer = MarketBuilder::new("GRID")
            .uniform_price()
            .interval_seconds(60)
            .starting_at(start)
            .build(Arc::new(NoOpEventHandler))
            .unwrap();

        assert_eq!(clearer.next_boundary(), start + chrono::Duration::seconds(60));
    }

    #[test]
    fn test_builder_continuous() {
        let builder = MarketBuilder::new("CDA").order_ttl_seconds(30);
        assert_eq!(builder.get_config().order_ttl_seconds, Some(30));

        let book = builder.build_continuous(Arc::new(NoOpEventHandler)).unwrap();
        assert_eq!(book.book().instrument(), "CDA");
    }

    #[test]
    fn test_preset_roundtrip_through_builder() {
        let builder = MarketBuilder::from_config(MarketConfig::continuous_double_auction("CDA", 30));
        assert_eq!(builder.get_config().order_ttl_seconds, Some(30));
        assert!(builder.build(Arc::new(NoOpEventHandler)).is_ok());
    }
}
