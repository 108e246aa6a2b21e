// Quran Audio Core - Offline recitation downloads for mobile
// Copyright (C) 2025 Quran Audio Core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Queue processor
//!
//! A single-flight loop that drains pending items in batches:
//!
//! 1. Stop flag set or nothing pending: exit
//! 2. Offline, or WiFi-only and not on WiFi: exit (the network monitor
//!    restarts the loop when connectivity improves)
//! 3. Claim up to `max_concurrent_downloads` pending items, FIFO
//! 4. Run each claimed item on its own task and wait for the whole batch
//! 5. Repeat
//!
//! `trigger` while a loop is active only records a rerun request; the
//! active loop checks it before exiting, so work enqueued at the tail of a
//! run is never stranded.

use crate::download::control::{ControlRegistry, ItemControl};
use crate::download::item::{DownloadItem, DownloadStatus};
use crate::download::network::NetworkPolicy;
use crate::download::progress::DownloadProgress;
use crate::download::worker::{run_item, DownloadContext, RunOutcome};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainExit {
    Idle,
    Gated,
    Stopped,
}

#[derive(Debug, Default)]
struct LoopState {
    running: bool,
    rerun: bool,
}

/// Drives queued items subject to network policy and concurrency limits
pub struct QueueProcessor {
    ctx: Arc<DownloadContext>,
    network: Arc<dyn NetworkPolicy>,
    controls: Arc<ControlRegistry>,
    state: Mutex<LoopState>,
    stop: AtomicBool,
    idle: watch::Sender<bool>,
}

impl QueueProcessor {
    pub fn new(
        ctx: Arc<DownloadContext>,
        network: Arc<dyn NetworkPolicy>,
        controls: Arc<ControlRegistry>,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            ctx,
            network,
            controls,
            state: Mutex::new(LoopState::default()),
            stop: AtomicBool::new(false),
            idle,
        }
    }

    /// Start the loop, or ask the running loop to go around again
    pub fn trigger(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.running {
                state.rerun = true;
                return;
            }
            state.running = true;
            state.rerun = false;
            self.idle.send_replace(false);
        }

        let processor = Arc::clone(self);
        tokio::spawn(async move {
            let mut guard = RunningGuard { processor: &processor, armed: true };
            processor.run().await;
            guard.armed = false;
        });
    }

    /// Ask the active loop to exit after its current batch
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    /// Resolves once no loop is running
    pub async fn wait_until_idle(&self) {
        let mut idle = self.idle.subscribe();
        // The sender lives in self, so this cannot fail while we are borrowed
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Restart the loop whenever connectivity improves
    ///
    /// The task holds only a weak reference and ends once the processor is
    /// dropped or the status channel closes.
    pub fn watch_network(self: &Arc<Self>) {
        let mut changes = self.network.status_changes();
        let processor = Arc::downgrade(self);
        let mut previous = *changes.borrow_and_update();

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let current = *changes.borrow_and_update();
                let Some(processor) = processor.upgrade() else {
                    break;
                };
                if current.improved_from(&previous) {
                    tracing::debug!(?current, "connectivity improved, resuming queue");
                    processor.trigger();
                }
                previous = current;
            }
        });
    }

    async fn run(&self) {
        loop {
            let exit = self.drain().await;
            if !self.finish_or_rerun(exit) {
                tracing::debug!(?exit, "queue processor idle");
                return;
            }
        }
    }

    /// Decide under the state lock whether to go around again
    fn finish_or_rerun(&self, exit: DrainExit) -> bool {
        let mut state = self.state.lock();
        // Gated loops are restarted by the network monitor instead
        if exit == DrainExit::Gated {
            state.rerun = false;
        }
        if state.rerun {
            state.rerun = false;
            return true;
        }
        state.running = false;
        self.idle.send_replace(true);
        false
    }

    async fn drain(&self) -> DrainExit {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return DrainExit::Stopped;
            }
            if !self.ctx.queue.has_pending() {
                return DrainExit::Idle;
            }
            if !self.network.is_online().await {
                tracing::debug!("offline, leaving items pending");
                return DrainExit::Gated;
            }
            let settings = self.network.settings().await;
            if settings.wifi_only_downloads && !self.network.is_wifi().await {
                tracing::debug!("waiting for WiFi, leaving items pending");
                return DrainExit::Gated;
            }

            let batch = self.claim(settings.concurrency()).await;
            if batch.is_empty() {
                return DrainExit::Idle;
            }
            self.run_batch(batch).await;
        }
    }

    /// Claim pending items and register their controls in one step
    async fn claim(&self, limit: usize) -> Vec<(DownloadItem, Arc<ItemControl>)> {
        let (batch, write) = self.controls.with_runs(|runs| {
            let (items, write) = self.ctx.queue.claim_pending_staged(limit);
            let batch: Vec<_> = items
                .into_iter()
                .map(|item| {
                    let control = Arc::new(ItemControl::new());
                    runs.insert(item.id.clone(), Arc::clone(&control));
                    (item, control)
                })
                .collect();
            (batch, write)
        });
        self.ctx.queue.commit(write).await;
        batch
    }

    async fn run_batch(&self, batch: Vec<(DownloadItem, Arc<ItemControl>)>) {
        tracing::debug!(items = batch.len(), "dispatching batch");

        let mut runs = Vec::with_capacity(batch.len());
        let mut handles = Vec::with_capacity(batch.len());
        for (item, control) in batch {
            runs.push((item.id.clone(), Arc::clone(&control)));
            let ctx = Arc::clone(&self.ctx);
            handles.push(tokio::spawn(async move {
                let _finished = control.finish_guard();
                run_item(&ctx, item, &control).await
            }));
        }

        let mut outcomes = Vec::with_capacity(runs.len());
        let results = join_all(handles).await;
        for ((id, control), result) in runs.into_iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(item_id = %id, error = %e, "download task aborted");
                    self.fail_aborted(&id, &control).await;
                    outcomes.push(RunOutcome::Failed(e.to_string()));
                }
            }
            self.controls.release(&id, &control);
        }

        let (completed, failed, stopped) = summarize(&outcomes);
        tracing::debug!(completed, failed, stopped, "batch settled");
    }

    async fn fail_aborted(&self, id: &str, control: &ItemControl) {
        if control.is_cancelled() {
            return;
        }
        let failed = self
            .ctx
            .queue
            .update(id, |item| {
                if item.status == DownloadStatus::Downloading {
                    item.mark_failed("Download task aborted unexpectedly".to_string());
                }
            })
            .await;
        if let Some(item) = failed.filter(|item| item.status == DownloadStatus::Failed) {
            self.ctx.events.error.emit(&DownloadProgress::from(&item));
        }
    }
}

/// Resets the loop state if `run` unwinds
struct RunningGuard<'a> {
    processor: &'a QueueProcessor,
    armed: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.processor.state.lock();
            state.running = false;
            state.rerun = false;
            self.processor.idle.send_replace(true);
        }
    }
}

/// Completed, failed, and paused or cancelled counts of a batch
fn summarize(outcomes: &[RunOutcome]) -> (usize, usize, usize) {
    let completed = outcomes.iter().filter(|o| **o == RunOutcome::Completed).count();
    let failed = outcomes.iter().filter(|o| matches!(o, RunOutcome::Failed(_))).count();
    (completed, failed, outcomes.len() - completed - failed)
}
