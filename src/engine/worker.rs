// ============================================================================
// Clearing Worker
// Single background thread serializing clearing triggers for one clearer
// ============================================================================

use crate::domain::ClearingResult;
use crate::engine::batch::PeriodicBatchClearer;
use crate::error::MarketResult;
use chrono::{DateTime, Utc};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Commands accepted by the worker queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearCommand {
    /// Timer tick: clear if an interval boundary was reached
    Tick(DateTime<Utc>),
    /// Manual "clear now"
    ClearNow(DateTime<Utc>),
    Shutdown,
}

/// Handle to the worker thread.
///
/// Triggers from any number of callers queue on one channel and run one at
/// a time in arrival order. Results of passes that ran come back on
/// [`results`](Self::results), which holds at most `capacity` undrained
/// results; once it is full newer results are dropped and the passes still
/// run. Dropping the handle shuts the worker down after the commands already
/// queued.
pub struct ClearingWorker {
    sender: Sender<ClearCommand>,
    results: Receiver<MarketResult<ClearingResult>>,
    handle: Option<JoinHandle<()>>,
}

impl ClearingWorker {
    /// Spawn the worker with command and result queues of `capacity`
    /// entries each.
    pub fn spawn(clearer: Arc<PeriodicBatchClearer>, capacity: usize) -> io::Result<Self> {
        let (sender, receiver) = bounded(capacity.max(1));
        let (result_sender, results) = bounded(capacity.max(1));
        let instrument = clearer.config().instrument.clone();

        let handle = thread::Builder::new()
            .name(format!("clearing-{}", instrument))
            .spawn(move || run(clearer, receiver, result_sender))?;

        tracing::info!(%instrument, capacity, "clearing worker started");

        Ok(Self {
            sender,
            results,
            handle: Some(handle),
        })
    }

    /// Queue a timer tick. Returns false once the worker has stopped.
    pub fn tick(&self, now: DateTime<Utc>) -> bool {
        self.send(ClearCommand::Tick(now))
    }

    /// Queue a manual pass. Returns false once the worker has stopped.
    pub fn clear_now(&self, now: DateTime<Utc>) -> bool {
        self.send(ClearCommand::ClearNow(now))
    }

    pub fn sender(&self) -> Sender<ClearCommand> {
        self.sender.clone()
    }

    pub fn results(&self) -> &Receiver<MarketResult<ClearingResult>> {
        &self.results
    }

    /// Number of triggers waiting to run
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// Stop after the queued commands and wait for the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, command: ClearCommand) -> bool {
        self.sender.send(command).is_ok()
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.send(ClearCommand::Shutdown);
            if handle.join().is_err() {
                tracing::error!("clearing worker panicked");
            }
        }
    }
}

impl Drop for ClearingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    clearer: Arc<PeriodicBatchClearer>,
    commands: Receiver<ClearCommand>,
    results: Sender<MarketResult<ClearingResult>>,
) {
    for command in commands.iter() {
        let outcome = match command {
            ClearCommand::Tick(now) => clearer.tick(now).transpose(),
            ClearCommand::ClearNow(now) => Some(clearer.force_clear(now)),
            ClearCommand::Shutdown => break,
        };

        if let Some(outcome) = outcome {
            if let Err(err) = &outcome {
                tracing::error!(%err, "clearing pass failed");
            }
            match results.try_send(outcome) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {},
                Err(TrySendError::Full(outcome)) => tracing::debug!(
                    round = ?outcome.as_ref().map(|r| r.round).ok(),
                    "result queue full, dropping result"
                ),
            }
        }
    }

    tracing::info!(instrument = %clearer.config().instrument, "clearing worker stopped");
}
