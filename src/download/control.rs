//! Per-run control signals
//!
//! Each time the processor dispatches an item it creates a fresh
//! `ItemControl`. Pause and cancel requests flip that run's signals, and the
//! run fires `done` when it exits. A request can therefore never leak into a
//! later run of the same id.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Signals shared between one item run and the control surface
#[derive(Debug, Default)]
pub struct ItemControl {
    cancel: CancellationToken,
    paused: AtomicBool,
    done: CancellationToken,
}

impl ItemControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    pub fn request_pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn clear_pause(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Resolves once cancel is requested
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Whether the run has exited
    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    pub fn mark_finished(&self) {
        self.done.cancel();
    }

    /// Wait for the run to exit; false if `timeout` elapsed first
    pub async fn wait_finished(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.done.cancelled())
            .await
            .is_ok()
    }

    /// Guard that marks the run finished when dropped
    pub fn finish_guard(self: &Arc<Self>) -> FinishGuard {
        FinishGuard(Arc::clone(self))
    }
}

/// Fires `done` on drop, so a panicking run still releases its waiters
pub struct FinishGuard(Arc<ItemControl>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.mark_finished();
    }
}

/// Controls of the runs currently in flight, keyed by item id
#[derive(Debug, Default)]
pub struct ControlRegistry {
    runs: Mutex<HashMap<String, Arc<ItemControl>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the registry lock while `f` runs
    ///
    /// Used where a queue mutation must be atomic with the set of live runs
    /// (claiming items, pausing). Lock order is registry, then queue.
    pub fn with_runs<R>(&self, f: impl FnOnce(&mut HashMap<String, Arc<ItemControl>>) -> R) -> R {
        f(&mut self.runs.lock())
    }

    pub fn get(&self, id: &str) -> Option<Arc<ItemControl>> {
        self.runs.lock().get(id).cloned()
    }

    /// Remove `id` only if it still maps to `control`
    pub fn release(&self, id: &str, control: &Arc<ItemControl>) {
        let mut runs = self.runs.lock();
        if runs.get(id).map_or(false, |current| Arc::ptr_eq(current, control)) {
            runs.remove(id);
        }
    }
}
