// ============================================================================
// Market Configuration
// Clearing mechanism, spread split and timing for one simulated market
// ============================================================================

use crate::error::{MarketError, MarketResult};
use chrono::Duration;
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default pairwise spread-split coefficient: the spread is shared evenly.
pub const DEFAULT_SPREAD_SPLIT: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Default batch interval (15-minute settlement period)
pub const DEFAULT_INTERVAL_SECONDS: u64 = 900;

// ============================================================================
// Clearing Mechanism
// ============================================================================

/// How a round of the batch clearer turns the book into fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ClearingMechanism {
    /// Pay-as-bid style: sorted bid/ask cursors, each pair settles around
    /// its own prices according to the spread-split coefficient `k`
    Pairwise,

    /// Uniform marginal price from the supply/demand curve intersection;
    /// every eligible order is matched in full at that price
    UniformPrice,
}

// ============================================================================
// Market Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarketConfig {
    /// Market or product name (e.g., "NL-DAY-AHEAD")
    pub instrument: String,

    pub mechanism: ClearingMechanism,

    /// Spread-split coefficient in `[0, 1]`: the fraction of the bid-ask
    /// gap allocated to the bid side in pairwise settlement
    pub k: Decimal,

    /// Batch clearing interval
    pub interval_seconds: u64,

    /// Default time-to-live applied to orders submitted without one.
    /// `None` keeps orders until matched or cancelled.
    pub order_ttl_seconds: Option<u64>,
}

impl MarketConfig {
    pub fn new(instrument: impl Into<String>, mechanism: ClearingMechanism) -> Self {
        Self {
            instrument: instrument.into(),
            mechanism,
            k: DEFAULT_SPREAD_SPLIT,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            order_ttl_seconds: None,
        }
    }

    /// Builder method: Set spread-split coefficient
    pub fn with_k(mut self, k: Decimal) -> Self {
        self.k = k;
        self
    }

    /// Builder method: Set batch interval
    pub fn with_interval_seconds(mut self, seconds: u64) -> Self {
        self.interval_seconds = seconds;
        self
    }

    /// Builder method: Set default order time-to-live
    pub fn with_order_ttl_seconds(mut self, seconds: u64) -> Self {
        self.order_ttl_seconds = Some(seconds);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::seconds(self.interval_seconds as i64)
    }

    pub fn order_ttl(&self) -> Option<Duration> {
        self.order_ttl_seconds.map(|s| Duration::seconds(s as i64))
    }

    pub fn validate(&self) -> MarketResult<()> {
        if self.instrument.is_empty() {
            return Err(MarketError::invalid("instrument cannot be empty"));
        }

        validate_spread_split(self.k)?;

        if self.interval_seconds == 0 || self.interval_seconds > i64::MAX as u64 {
            return Err(MarketError::invalid("interval_seconds must be positive"));
        }

        if let Some(ttl) = self.order_ttl_seconds {
            if ttl == 0 || ttl > i64::MAX as u64 {
                return Err(MarketError::invalid("order_ttl_seconds must be positive"));
            }
        }

        Ok(())
    }

    /// Parse and validate a JSON configuration document
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> MarketResult<Self> {
        let config: MarketConfig = serde_json::from_str(json)
            .map_err(|e| MarketError::invalid(format!("malformed market config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// `k` must lie within `[0, 1]`.
pub fn validate_spread_split(k: Decimal) -> MarketResult<()> {
    if k < Decimal::ZERO || k > Decimal::ONE {
        return Err(MarketError::invalid(format!(
            "spread-split coefficient k must be within [0, 1], got {}",
            k
        )));
    }
    Ok(())
}

// ============================================================================
// Preset Configurations (Factory Methods)
// ============================================================================

impl MarketConfig {
    /// Bilateral round matching, spread shared by `k`
    pub fn pay_as_bid(instrument: impl Into<String>, k: Decimal) -> Self {
        Self::new(instrument, ClearingMechanism::Pairwise).with_k(k)
    }

    /// Sealed-bid uniform-price auction cleared every `interval_seconds`
    pub fn uniform_price_auction(instrument: impl Into<String>, interval_seconds: u64) -> Self {
        Self::new(instrument, ClearingMechanism::UniformPrice)
            .with_interval_seconds(interval_seconds)
    }

    /// Continuous double auction with expiring quotes
    pub fn continuous_double_auction(instrument: impl Into<String>, ttl_seconds: u64) -> Self {
        Self::new(instrument, ClearingMechanism::Pairwise).with_order_ttl_seconds(ttl_seconds)
    }
}
