//! Single-worker scheduling: one cycle at a time, trailing triggers
//! coalesced through a latest-wins, single-slot mailbox.
//!
//! Triggers (startup, subscriptions, resweep cadence) call
//! [`CycleRequests::request`] from any task. One worker drains the slot and
//! runs cycles sequentially, so persisted state is only ever touched by a
//! single in-flight cycle and deferred requests can never pile up into a
//! queue.

use std::sync::Mutex;

use tokio::sync::watch;
use tokio::sync::Notify;

use crate::error::IndexError;
use crate::reconciler::{CycleMode, CycleRunner};

// ─── CycleRequests ───────────────────────────────────────────────────────────

/// Single-slot, latest-wins request register with a condition signal.
///
/// Requests arriving while the worker is busy overwrite the pending slot;
/// when the running cycle completes, exactly one deferred cycle starts, in
/// the mode of the last-arriving trigger.
#[derive(Default)]
pub struct CycleRequests {
    slot: Mutex<Option<CycleMode>>,
    notify: Notify,
}

impl CycleRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cycle request. Never blocks; safe from any task.
    pub fn request(&self, mode: CycleMode) {
        let previous = self.slot.lock().unwrap().replace(mode);
        if let Some(previous) = previous {
            tracing::debug!(%previous, %mode, "coalescing pending cycle request");
        }
        self.notify.notify_one();
    }

    /// Take the pending request, if any.
    fn take(&self) -> Option<CycleMode> {
        self.slot.lock().unwrap().take()
    }

    /// Wait for the next request.
    ///
    /// The slot is re-checked before every wait, so a request stored between
    /// the check and the wait is never lost (`Notify` retains one permit).
    pub async fn next(&self) -> CycleMode {
        loop {
            if let Some(mode) = self.take() {
                return mode;
            }
            self.notify.notified().await;
        }
    }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

/// The single logical worker: drains [`CycleRequests`] and runs cycles to
/// completion, one at a time.
pub struct Worker<R> {
    runner: R,
    requests: std::sync::Arc<CycleRequests>,
}

impl<R: CycleRunner> Worker<R> {
    pub fn new(runner: R, requests: std::sync::Arc<CycleRequests>) -> Self {
        Self { runner, requests }
    }

    /// Run until `shutdown` flips to `true` or a fatal error occurs.
    ///
    /// Shutdown is only observed between cycles: a cycle that has started
    /// always runs to completion. Transient cycle errors are logged and
    /// swallowed here — the next trigger retries; fatal errors propagate to
    /// the caller, which must exit non-zero after closing the store.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexError> {
        loop {
            if *shutdown.borrow() {
                tracing::info!("shutdown requested, worker stopping");
                return Ok(());
            }

            let mode = tokio::select! {
                mode = self.requests.next() => mode,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Shutdown sender dropped; treat as a stop request.
                        return Ok(());
                    }
                    continue;
                }
            };

            match self.runner.run_cycle(mode).await {
                Ok(outcome) => {
                    tracing::debug!(%mode, ?outcome, "cycle finished");
                }
                Err(err) if err.is_fatal() => {
                    tracing::error!(%mode, error = %err, "fatal cycle error");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(%mode, error = %err, "cycle aborted, awaiting next trigger");
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
