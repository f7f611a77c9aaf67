// ============================================================================
// Clearing Scheduler
// Fixed-interval boundaries driven by an explicit clock
// ============================================================================

use crate::error::{MarketError, MarketResult};
use chrono::{DateTime, Duration, Utc};

/// Why a clearing pass is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearTrigger {
    /// Interval boundary reached; carries the latest boundary crossed
    Boundary(DateTime<Utc>),
    /// Manual "clear now" request
    Manual,
}

/// Interval scheduler with no timer of its own.
///
/// Boundaries lie on the grid `start + n * interval`. Callers feed it the
/// current time through [`tick`](Self::tick); boundaries skipped between two
/// ticks coalesce into one pass. A manual request never shifts the grid.
#[derive(Debug, Clone)]
pub struct ClearingScheduler {
    interval: Duration,
    next_boundary: DateTime<Utc>,
    manual_pending: bool,
}

impl ClearingScheduler {
    /// # Errors
    /// `InvalidParameter` if `interval` is not positive.
    pub fn new(interval: Duration, start: DateTime<Utc>) -> MarketResult<Self> {
        if interval <= Duration::zero() {
            return Err(MarketError::invalid("clearing interval must be positive"));
        }

        Ok(Self {
            interval,
            next_boundary: start + interval,
            manual_pending: false,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_boundary(&self) -> DateTime<Utc> {
        self.next_boundary
    }

    /// Time left until the next boundary, zero if already due
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.next_boundary - now).max(Duration::zero())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.manual_pending || now >= self.next_boundary
    }

    /// Queue a manual pass for the next tick
    pub fn force_clear(&mut self) {
        self.manual_pending = true;
    }

    /// Advance to `now` and report whether a pass is due.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<ClearTrigger> {
        let manual = std::mem::take(&mut self.manual_pending);

        if now < self.next_boundary {
            return manual.then_some(ClearTrigger::Manual);
        }

        let mut reached = self.next_boundary;
        let mut skipped = 0u32;
        while self.next_boundary <= now {
            reached = self.next_boundary;
            self.next_boundary += self.interval;
            skipped += 1;
        }

        if skipped > 1 {
            tracing::warn!(
                boundaries = skipped,
                boundary = %reached,
                "coalescing missed clearing boundaries into one pass"
            );
        }

        Some(ClearTrigger::Boundary(reached))
    }
}
