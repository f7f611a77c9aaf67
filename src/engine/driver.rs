// ============================================================================
// Interval Driver
// Tokio timer feeding wall-clock ticks into a batch clearer
// ============================================================================

use crate::engine::batch::PeriodicBatchClearer;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Running driver. Boundaries stay on the clearer's own grid; the driver
/// only decides how often the grid is checked.
pub struct IntervalDriver {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl IntervalDriver {
    /// Spawn a task calling `clearer.tick(now)` every `check_every`.
    ///
    /// Passes run on the blocking pool so a long pass never stalls the
    /// runtime. Must be called from inside a tokio runtime.
    pub fn spawn(clearer: Arc<PeriodicBatchClearer>, check_every: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(check_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let clearer = Arc::clone(&clearer);
                        match tokio::task::spawn_blocking(move || clearer.tick(Utc::now())).await {
                            Ok(Ok(Some(result))) => tracing::debug!(
                                round = result.round,
                                cleared_quantity = %result.cleared_quantity,
                                "interval pass complete"
                            ),
                            Ok(Ok(None)) => {},
                            Ok(Err(err)) => tracing::error!(%err, "interval pass failed"),
                            Err(err) => tracing::error!(%err, "interval pass panicked"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("interval driver stopped");
        });

        Self { shutdown, handle }
    }

    /// Signal the task and wait for it to finish its current pass.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            tracing::error!(%err, "interval driver task failed");
        }
    }
}
