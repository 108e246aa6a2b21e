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


//! Download service for recitation audio
//!
//! The public face of the download core. Constructed once at app startup
//! with its collaborators and shared by cloning.
//!
//! # Download Queue Management
//! - FIFO queue, one item per (surah, reciter)
//! - Configurable concurrent download limit (default: 2)
//! - WiFi-only gating and offline pause via the network policy
//! - Per-item pause, resume and cancel; cancel-all per reciter
//! - Progress, completion and error subscriptions
//!
//! # Cancel and delete
//! Cancel waits for the item's run to signal that it has exited before any
//! file is touched, then removes every part file of the surah, any
//! in-progress temp file, and the reciter directory if it ended up empty.
//! Cleanup is best effort: failures are logged, never returned.

use crate::download::config::DownloadConfig;
use crate::download::control::ControlRegistry;
use crate::download::item::{item_id, parse_item_id, DownloadItem, DownloadStatus};
use crate::download::network::NetworkPolicy;
use crate::download::progress::{DownloadEvents, DownloadProgress, Subscription};
use crate::download::processor::QueueProcessor;
use crate::download::queue::{DownloadQueueStore, StagedWrite};
use crate::download::source::{EveryAyahSource, PartSource};
use crate::download::stream::{HttpPartFetcher, PartFetcher};
use crate::download::worker::DownloadContext;
use crate::error::{CoreError, Result};
use crate::file::paths::{partial_path, validate_variant};
use crate::file::{FileManager, FileStorage};
use crate::storage::KeyValueStore;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// External collaborators of the download service
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn KeyValueStore>,
    pub files: Arc<dyn FileStorage>,
    pub network: Arc<dyn NetworkPolicy>,
    pub fetcher: Arc<dyn PartFetcher>,
    pub source: Arc<dyn PartSource>,
}

impl Collaborators {
    /// Local filesystem, HTTP fetches and the everyayah.com layout
    pub fn local(
        config: &DownloadConfig,
        store: Arc<dyn KeyValueStore>,
        network: Arc<dyn NetworkPolicy>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            files: Arc::new(FileManager::new(config.audio_directory.clone())),
            network,
            fetcher: Arc::new(HttpPartFetcher::new()?),
            source: Arc::new(EveryAyahSource::new(&config.base_url, &config.audio_directory)?),
        })
    }
}

struct Inner {
    ctx: Arc<DownloadContext>,
    processor: Arc<QueueProcessor>,
    controls: Arc<ControlRegistry>,
    started: AtomicBool,
}

/// Offline audio download manager
#[derive(Clone)]
pub struct DownloadService {
    inner: Arc<Inner>,
}

impl DownloadService {
    pub fn new(config: DownloadConfig, collaborators: Collaborators) -> Self {
        let Collaborators { store, files, network, fetcher, source } = collaborators;

        let ctx = Arc::new(DownloadContext {
            queue: Arc::new(DownloadQueueStore::new(store)),
            files,
            source,
            fetcher,
            events: DownloadEvents::new(),
            config,
        });
        let controls = Arc::new(ControlRegistry::new());
        let processor = Arc::new(QueueProcessor::new(
            Arc::clone(&ctx),
            network,
            Arc::clone(&controls),
        ));

        Self {
            inner: Arc::new(Inner {
                ctx,
                processor,
                controls,
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Restore persisted state, start watching the network and resume
    /// pending work. Later calls are no-ops.
    pub async fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.queue().restore().await {
            self.inner.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.inner.processor.watch_network();
        self.inner.processor.trigger();
        Ok(())
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.inner.ctx.config
    }

    /// Queue one surah for one reciter; returns the item id
    ///
    /// Already queued or downloaded resources return their id unchanged.
    pub async fn enqueue_resource(&self, resource_id: u32, variant: &str) -> Result<String> {
        validate_variant(variant)?;
        let total_parts = self
            .source()
            .part_count(resource_id)
            .ok_or(CoreError::InvalidResource(resource_id))?;

        let id = self.queue().enqueue(resource_id, variant, total_parts).await;
        self.inner.processor.trigger();
        Ok(id)
    }

    /// Queue every surah not yet downloaded for `variant`; returns the new ids
    pub async fn enqueue_all(&self, variant: &str) -> Result<Vec<String>> {
        validate_variant(variant)?;
        let source = self.source();
        let resources: Vec<(u32, u32)> = source
            .resource_ids()
            .into_iter()
            .filter_map(|id| source.part_count(id).map(|parts| (id, parts)))
            .collect();

        let added = self.queue().enqueue_many(variant, &resources).await;
        tracing::info!(variant, added = added.len(), "enqueued reciter");
        self.inner.processor.trigger();
        Ok(added)
    }

    /// Pause an item
    ///
    /// A running item stops before its next part; a pending one is paused
    /// immediately. Paused and failed items are left as they are.
    pub async fn pause(&self, id: &str) -> Result<()> {
        let queue = self.queue();
        let (status, write) = self.inner.controls.with_runs(|runs| match runs.get(id) {
            Some(control) if !control.is_finished() => {
                control.request_pause();
                (Some(DownloadStatus::Downloading), StagedWrite::default())
            }
            _ => queue.pause_if_pending_staged(id),
        });
        queue.commit(write).await;

        match status {
            None => Err(CoreError::not_found(id)),
            Some(DownloadStatus::Paused) => {
                if let Some(item) = queue.get(id) {
                    self.emit_progress(&item);
                }
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    /// Resume a paused or failed item from its persisted cursor
    pub async fn resume(&self, id: &str) -> Result<()> {
        if let Some(control) = self.inner.controls.get(id) {
            control.clear_pause();
        }

        match self.queue().requeue_if_resumable(id).await {
            None => Err(CoreError::not_found(id)),
            Some(DownloadStatus::Pending) => {
                if let Some(item) = self.queue().get(id) {
                    self.emit_progress(&item);
                }
                self.inner.processor.trigger();
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    /// Cancel an item and delete everything it wrote
    pub async fn cancel(&self, id: &str) -> Result<()> {
        let queue = self.queue();
        let (target, control, write) = self.inner.controls.with_runs(|runs| match runs.get(id) {
            // A settled run's control lingers until its batch is released;
            // the item must leave the queue here or the processor may claim it
            Some(control) if !control.is_finished() => {
                control.request_cancel();
                // The run may already have promoted the item
                let target = queue
                    .get(id)
                    .map(|item| (item.resource_id, item.variant))
                    .or_else(|| parse_item_id(id));
                (target, Some(Arc::clone(control)), StagedWrite::default())
            }
            _ => {
                let (removed, write) = queue.remove_staged(id);
                (removed.map(|item| (item.resource_id, item.variant)), None, write)
            }
        });
        queue.commit(write).await;

        let Some((resource_id, variant)) = target else {
            return Err(CoreError::not_found(id));
        };

        if let Some(control) = control {
            let timeout = self.config().cancel_wait_timeout();
            if !control.wait_finished(timeout).await {
                tracing::warn!(item_id = id, ?timeout, "run did not stop in time, cleaning up anyway");
            }
            queue.remove(id).await;
        }

        let freed = self.remove_part_files(resource_id, &variant).await;
        // A completion that raced the cancel is undone as well
        queue.forget_downloaded(resource_id, &variant, freed).await;
        self.remove_directory_if_empty(&variant).await;

        tracing::info!(item_id = id, freed, "cancelled");
        Ok(())
    }

    /// Cancel every queued item of a reciter; returns how many were cancelled
    pub async fn cancel_all(&self, variant: &str) -> Result<usize> {
        self.inner.processor.request_stop();

        let ids: Vec<String> = self
            .queue()
            .items_for_variant(variant)
            .into_iter()
            .map(|item| item.id)
            .collect();
        let results = join_all(ids.iter().map(|id| self.cancel(id))).await;

        self.inner.processor.clear_stop();
        self.inner.processor.trigger();

        let mut cancelled = 0;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(()) => cancelled += 1,
                // Finished or cancelled concurrently
                Err(CoreError::RecordNotFound(_)) => {}
                Err(e) => tracing::warn!(item_id = %id, error = %e, "cancel failed"),
            }
        }
        Ok(cancelled)
    }

    /// Copy of the queue in enqueue order
    pub fn queue_snapshot(&self) -> Vec<DownloadItem> {
        self.queue().snapshot()
    }

    pub fn is_downloaded(&self, resource_id: u32, variant: &str) -> bool {
        self.queue().is_downloaded(resource_id, variant)
    }

    pub fn on_progress<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        self.inner.ctx.events.progress.subscribe(Arc::new(callback))
    }

    pub fn on_complete<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        self.inner.ctx.events.complete.subscribe(Arc::new(callback))
    }

    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        self.inner.ctx.events.error.subscribe(Arc::new(callback))
    }

    /// Remove a surah for a reciter, queued or downloaded
    pub async fn delete_resource(&self, resource_id: u32, variant: &str) -> Result<()> {
        validate_variant(variant)?;
        if self.source().part_count(resource_id).is_none() {
            return Err(CoreError::InvalidResource(resource_id));
        }

        let id = item_id(resource_id, variant);
        if self.queue().get(&id).is_some() {
            match self.cancel(&id).await {
                // Finished in the meantime; delete it as a download
                Err(CoreError::RecordNotFound(_)) => {}
                other => return other,
            }
        }

        let freed = self.remove_part_files(resource_id, variant).await;
        self.queue().forget_downloaded(resource_id, variant, freed).await;
        self.remove_directory_if_empty(variant).await;
        tracing::info!(resource_id, variant, freed, "deleted resource");
        Ok(())
    }

    /// Remove everything downloaded or queued for a reciter
    pub async fn delete_all_for_variant(&self, variant: &str) -> Result<()> {
        validate_variant(variant)?;
        self.cancel_all(variant).await?;

        let directory = self.source().variant_directory(variant);
        let files = self.files();
        match files.list_directory(&directory).await {
            Ok(names) => {
                for name in names {
                    if let Err(e) = files.delete(&directory.join(&name)).await {
                        tracing::warn!(file = %name, error = %e, "failed to delete file");
                    }
                }
            }
            Err(e) => tracing::warn!(variant, error = %e, "failed to list reciter directory"),
        }
        self.remove_directory_if_empty(variant).await;
        self.queue().forget_variant(variant).await;

        tracing::info!(variant, "deleted reciter");
        Ok(())
    }

    /// Downloaded surahs for a reciter, ascending
    pub fn downloaded_resources(&self, variant: &str) -> Vec<u32> {
        self.queue()
            .downloaded(variant)
            .map(|v| v.resource_ids.into_iter().collect())
            .unwrap_or_default()
    }

    /// Reciters with at least one downloaded surah
    pub fn downloaded_variants(&self) -> Vec<String> {
        self.queue().downloaded_variants()
    }

    /// Bytes recorded for a reciter's completed downloads
    pub fn storage_used(&self, variant: &str) -> u64 {
        self.queue().downloaded(variant).map_or(0, |v| v.total_bytes)
    }

    /// Drop downloaded entries whose files are gone; returns the dropped surahs
    ///
    /// The bytes of the checked surahs are replaced by what is on disk.
    /// Surahs completed while the check runs keep their recorded size.
    pub async fn verify_downloads(&self, variant: &str) -> Result<Vec<u32>> {
        validate_variant(variant)?;
        let Some(downloaded) = self.queue().downloaded(variant) else {
            return Ok(Vec::new());
        };
        let checked_bytes = downloaded.total_bytes;

        let mut missing = Vec::new();
        let mut measured = 0u64;
        for &resource_id in &downloaded.resource_ids {
            let mut resource_bytes = 0u64;
            let mut complete = true;
            let parts = self.source().part_count(resource_id).unwrap_or(0);
            for part in 1..=parts {
                let location = self.source().locate(variant, resource_id, part)?;
                let info = self.files().exists(&location.path).await?;
                if info.is_complete() {
                    resource_bytes += info.size.unwrap_or(0);
                } else {
                    complete = false;
                    break;
                }
            }
            if complete && parts > 0 {
                measured += resource_bytes;
            } else {
                missing.push(resource_id);
            }
        }

        self.queue().reconcile_variant(variant, &missing, checked_bytes, measured).await;
        if !missing.is_empty() {
            tracing::warn!(variant, missing = ?missing, "dropped incomplete downloads");
        }
        Ok(missing)
    }

    /// Re-run the queue after download settings changed
    ///
    /// Lifting WiFi-only or raising the concurrency limit can unblock
    /// pending items that no other event would start.
    pub fn settings_changed(&self) {
        self.inner.processor.trigger();
    }

    /// Resolves once the processor has nothing left it can do
    pub async fn wait_until_idle(&self) {
        self.inner.processor.wait_until_idle().await
    }

    fn queue(&self) -> &DownloadQueueStore {
        &self.inner.ctx.queue
    }

    fn files(&self) -> &dyn FileStorage {
        self.inner.ctx.files.as_ref()
    }

    fn source(&self) -> &dyn PartSource {
        self.inner.ctx.source.as_ref()
    }

    fn emit_progress(&self, item: &DownloadItem) {
        self.inner.ctx.events.progress.emit(&DownloadProgress::from(item));
    }

    /// Delete every part and temp file of a surah; returns bytes freed
    async fn remove_part_files(&self, resource_id: u32, variant: &str) -> u64 {
        let parts = self.source().part_count(resource_id).unwrap_or(0);
        let files = self.files();
        let mut freed = 0;

        for part in 1..=parts {
            let location = match self.source().locate(variant, resource_id, part) {
                Ok(location) => location,
                Err(e) => {
                    tracing::warn!(resource_id, part, error = %e, "cannot locate part");
                    continue;
                }
            };
            if let Ok(info) = files.exists(&location.path).await {
                freed += info.size.unwrap_or(0);
            }
            for path in [partial_path(&location.path), location.path] {
                if let Err(e) = files.delete(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "failed to delete part");
                }
            }
        }
        freed
    }

    async fn remove_directory_if_empty(&self, variant: &str) {
        let directory = self.source().variant_directory(variant);
        if let Err(e) = self.files().remove_directory(&directory).await {
            tracing::warn!(variant, error = %e, "failed to remove reciter directory");
        }
    }
}
