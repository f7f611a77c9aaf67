// ============================================================================
// Periodic Batch Clearer
// Interval-driven clearing rounds over one order book
// ============================================================================

use crate::domain::{
    ClearingResult, ClearingTrace, MarketConfig, Order, OrderBook, OrderBookSnapshot, OrderId,
    OrderRequest,
};
use crate::engine::scheduler::{ClearTrigger, ClearingScheduler};
use crate::error::MarketResult;
use crate::interfaces::{ClearingPolicy, EventHandler, MarketEvent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// State owned by whichever pass holds the lock
#[derive(Debug, Default)]
struct PassState {
    round: u64,
    history: Vec<ClearingResult>,
}

/// Batch clearer with a pluggable clearing policy.
///
/// Each pass, whether triggered by an interval boundary or manually:
/// 1. expires overdue orders
/// 2. runs the policy over the remaining open orders
/// 3. records the [`ClearingResult`] and announces it to the event handler
///
/// Unmatched orders roll over to the next pass. Passes and cancellations
/// serialize on one lock, so a trigger arriving mid-pass waits for it.
pub struct PeriodicBatchClearer {
    config: MarketConfig,

    book: OrderBook,

    /// Pluggable clearing policy
    policy: Box<dyn ClearingPolicy>,

    scheduler: Mutex<ClearingScheduler>,

    pass: Mutex<PassState>,

    event_handler: Arc<dyn EventHandler>,
}

impl PeriodicBatchClearer {
    /// Create a clearer whose first boundary is `start + interval`.
    ///
    /// # Errors
    /// `InvalidParameter` if the configuration does not validate.
    pub fn new(
        config: MarketConfig,
        policy: Box<dyn ClearingPolicy>,
        event_handler: Arc<dyn EventHandler>,
        start: DateTime<Utc>,
    ) -> MarketResult<Self> {
        config.validate()?;
        let scheduler = ClearingScheduler::new(config.interval(), start)?;

        tracing::info!(
            instrument = %config.instrument,
            policy = policy.name(),
            interval_seconds = config.interval_seconds,
            "batch clearer created"
        );

        Ok(Self {
            book: OrderBook::new(config.instrument.clone()),
            config,
            policy,
            scheduler: Mutex::new(scheduler),
            pass: Mutex::new(PassState::default()),
            event_handler,
        })
    }

    // ========================================================================
    // Order Entry
    // ========================================================================

    /// Submit an order at `now` for the next pass, applying the configured
    /// default time-to-live when the order carries none.
    ///
    /// `now` is on the same clock as [`tick`](Self::tick), so time-to-live is
    /// measured against the times passes run at. An explicit
    /// [`OrderRequest::at`] takes precedence.
    pub fn submit(
        &self,
        mut request: OrderRequest,
        now: DateTime<Utc>,
    ) -> MarketResult<Arc<Order>> {
        if request.duration.is_none() {
            request.duration = self.config.order_ttl();
        }
        if request.submitted_at.is_none() {
            request.submitted_at = Some(now);
        }

        match self.book.submit(request) {
            Ok(order) => {
                self.event_handler.on_event(MarketEvent::OrderSubmitted {
                    order_id: order.id,
                    side: order.side,
                    price: order.price(),
                    quantity: order.quantity,
                    timestamp: now,
                });
                Ok(order)
            },
            Err(err) => {
                tracing::warn!(instrument = %self.config.instrument, %err, "submission rejected");
                self.event_handler.on_event(MarketEvent::OrderRejected {
                    reason: err.to_string(),
                    timestamp: now,
                });
                Err(err)
            },
        }
    }

    /// Cancel an open order. Waits for any pass in progress.
    pub fn cancel(&self, order_id: OrderId) -> MarketResult<Arc<Order>> {
        let _pass = self.pass.lock();
        let order = self.book.cancel(order_id)?;

        self.event_handler.on_event(MarketEvent::OrderCancelled {
            order_id,
            timestamp: Utc::now(),
        });
        Ok(order)
    }

    // ========================================================================
    // Clearing Triggers
    // ========================================================================

    /// Advance the scheduler to `now` and run a pass if one is due.
    pub fn tick(&self, now: DateTime<Utc>) -> MarketResult<Option<ClearingResult>> {
        let trigger = self.scheduler.lock().tick(now);

        match trigger {
            Some(trigger) => self.run_pass(now, trigger).map(Some),
            None => Ok(None),
        }
    }

    /// Run a pass at `now` regardless of the interval grid.
    pub fn force_clear(&self, now: DateTime<Utc>) -> MarketResult<ClearingResult> {
        self.run_pass(now, ClearTrigger::Manual)
    }

    /// Manual "clear now" against the wall clock
    pub fn trigger_clear_now(&self) -> MarketResult<ClearingResult> {
        self.force_clear(Utc::now())
    }

    /// Queue a manual pass to run on the next [`tick`](Self::tick)
    pub fn request_clear(&self) {
        self.scheduler.lock().force_clear();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_snapshot(&self) -> OrderBookSnapshot {
        self.book.snapshot()
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    /// Number of completed passes
    pub fn round(&self) -> u64 {
        self.pass.lock().round
    }

    pub fn history(&self) -> Vec<ClearingResult> {
        self.pass.lock().history.clone()
    }

    pub fn last_result(&self) -> Option<ClearingResult> {
        self.pass.lock().history.last().cloned()
    }

    pub fn next_boundary(&self) -> DateTime<Utc> {
        self.scheduler.lock().next_boundary()
    }

    // ========================================================================
    // Private methods
    // ========================================================================

    fn run_pass(&self, now: DateTime<Utc>, trigger: ClearTrigger) -> MarketResult<ClearingResult> {
        let mut pass = self.pass.lock();
        let round = pass.round + 1;

        let expired = self.book.expire_due(now);
        let mut result = self.policy.clear(&self.book, round)?;
        pass.round = round;

        if !expired.is_empty() {
            let ids: Vec<String> = expired.iter().map(|o| o.id.to_string()).collect();
            let mut trace = ClearingTrace::new();
            trace.push(format!("expired before round {}: {}", round, ids.join(", ")));
            trace.extend(result.trace);
            result.trace = trace;
        }

        self.announce(&result, &expired);

        tracing::info!(
            instrument = %self.config.instrument,
            round,
            trigger = ?trigger,
            policy = self.policy.name(),
            clearing_price = ?result.clearing_price,
            cleared_quantity = %result.cleared_quantity,
            fills = result.fills.len(),
            rolled_over = result.unmatched.len(),
            "clearing pass complete"
        );

        pass.history.push(result.clone());
        Ok(result)
    }

    fn announce(&self, result: &ClearingResult, expired: &[Arc<Order>]) {
        let timestamp = Utc::now();
        let mut events = Vec::with_capacity(
            expired.len() + result.fills.len() + result.matched.len() + result.unmatched.len() + 1,
        );

        events.extend(expired.iter().map(|o| MarketEvent::OrderExpired {
            order_id: o.id,
            timestamp,
        }));
        events.extend(result.fills.iter().map(|fill| MarketEvent::OrderFilled {
            fill: fill.clone(),
            timestamp,
        }));
        events.extend(
            result
                .matched
                .iter()
                .filter_map(|id| self.book.get(*id))
                .map(|o| MarketEvent::StatusChanged {
                    order_id: o.id,
                    status: o.status(),
                    remaining: o.remaining_quantity(),
                    timestamp,
                }),
        );
        events.extend(result.unmatched.iter().map(|view| MarketEvent::StatusChanged {
            order_id: view.id,
            status: view.status,
            remaining: view.remaining,
            timestamp,
        }));
        events.push(MarketEvent::RoundCleared {
            round: result.round,
            clearing_price: result.clearing_price,
            cleared_quantity: result.cleared_quantity,
            timestamp,
        });

        self.event_handler.on_events(events);
    }
}
