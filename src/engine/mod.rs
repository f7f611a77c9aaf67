// ============================================================================
// Engine Module
// Clearing policies, the batch clearer and the continuous auction book
// ============================================================================

mod batch;
mod continuous;
mod pairwise;
mod uniform;

pub mod curve_clearing;
pub mod factory;
pub mod scheduler;
pub mod worker;

#[cfg(feature = "async")]
pub mod driver;

pub use batch::PeriodicBatchClearer;
pub use continuous::ContinuousAuctionBook;
pub use curve_clearing::{
    CurveClearingEngine, CurveIntersection, CurveStep, DemandCurve, IntersectionKind, SupplyCurve,
    NON_CROSSING_FALLBACK_K,
};
pub use factory::{create_clearing_policy, create_from_config, MarketBuilder};
pub use pairwise::PairwiseMatcher;
pub use scheduler::{ClearTrigger, ClearingScheduler};
pub use uniform::UniformPriceClearing;
pub use worker::{ClearCommand, ClearingWorker};

#[cfg(feature = "async")]
pub use driver::IntervalDriver;
