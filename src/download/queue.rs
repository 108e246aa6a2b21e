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


//! Download queue store
//!
//! Owns the ordered queue and the downloaded-resources metadata. This is the
//! source of truth for what is pending, active and done.
//!
//! # Mutation discipline
//! Every mutation runs as one synchronous critical section that also
//! serializes the touched documents and stamps them with a generation
//! number. The write to the key/value store happens afterwards under a
//! separate async lock, and a document older than the last one written is
//! dropped. Interleaved tasks can therefore never lose an update or persist
//! a stale queue over a newer one.
//!
//! # Persisted keys
//! - `downloads.queue` - JSON array of `DownloadItem`, enqueue order
//! - `downloads.completed` - JSON object `variant -> DownloadedVariant`
//!
//! Save failures are logged and do not undo the in-memory change; the next
//! mutation writes the whole document again.

use crate::download::item::{item_id, DownloadItem, DownloadStatus, DownloadedVariant};
use crate::error::Result;
use crate::storage::KeyValueStore;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Storage key of the serialized queue
pub const QUEUE_KEY: &str = "downloads.queue";

/// Storage key of the downloaded-resources metadata
pub const COMPLETED_KEY: &str = "downloads.completed";

/// Completed resources keyed by variant
pub type DownloadedMetadata = BTreeMap<String, DownloadedVariant>;

#[derive(Debug, Clone, Copy)]
struct Changes {
    queue: bool,
    completed: bool,
}

impl Changes {
    const NONE: Changes = Changes { queue: false, completed: false };
    const QUEUE: Changes = Changes { queue: true, completed: false };
    const COMPLETED: Changes = Changes { queue: false, completed: true };
    const BOTH: Changes = Changes { queue: true, completed: true };
}

/// Serialized documents captured inside a critical section
///
/// Returned by the `*_staged` operations so a caller can mutate the queue
/// while holding another lock and persist after releasing it.
#[derive(Debug, Default)]
#[must_use = "staged changes are only durable once committed"]
pub struct StagedWrite {
    queue: Option<(u64, String)>,
    completed: Option<(u64, String)>,
}

impl StagedWrite {
    fn is_empty(&self) -> bool {
        self.queue.is_none() && self.completed.is_none()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    items: Vec<DownloadItem>,
    downloaded: DownloadedMetadata,
    queue_generation: u64,
    completed_generation: u64,
}

impl QueueState {
    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    fn item_mut(&mut self, id: &str) -> Option<&mut DownloadItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    fn is_downloaded(&self, resource_id: u32, variant: &str) -> bool {
        self.downloaded
            .get(variant)
            .map_or(false, |v| v.contains(resource_id))
    }

    fn capture(&mut self, changes: Changes) -> StagedWrite {
        let mut write = StagedWrite::default();
        if changes.queue {
            self.queue_generation += 1;
            write.queue = serialize(QUEUE_KEY, &self.items).map(|json| (self.queue_generation, json));
        }
        if changes.completed {
            self.completed_generation += 1;
            write.completed =
                serialize(COMPLETED_KEY, &self.downloaded).map(|json| (self.completed_generation, json));
        }
        write
    }
}

#[derive(Debug, Default)]
struct Written {
    queue: u64,
    completed: u64,
}

/// In-memory queue and metadata with write-through persistence
pub struct DownloadQueueStore {
    state: Mutex<QueueState>,
    store: Arc<dyn KeyValueStore>,
    written: tokio::sync::Mutex<Written>,
}

impl DownloadQueueStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            store,
            written: tokio::sync::Mutex::new(Written::default()),
        }
    }

    /// Load persisted state, replacing whatever is in memory
    ///
    /// Items left `downloading` by a previous process are demoted to
    /// `pending`. Unreadable documents are logged and treated as empty.
    pub async fn restore(&self) -> Result<()> {
        let queue_json = self.store.load(QUEUE_KEY).await?;
        let completed_json = self.store.load(COMPLETED_KEY).await?;

        let items: Vec<DownloadItem> = parse_or_default(QUEUE_KEY, queue_json);
        let downloaded: DownloadedMetadata = parse_or_default(COMPLETED_KEY, completed_json);

        let (demoted, write) = self.mutate(|state| {
            let loaded = items.len();
            let mut seen = HashSet::new();
            state.items = items
                .into_iter()
                .filter(|item| seen.insert(item.id.clone()))
                .filter(|item| {
                    !downloaded
                        .get(&item.variant)
                        .map_or(false, |v| v.contains(item.resource_id))
                })
                .collect();
            state.downloaded = downloaded;

            let mut demoted = 0;
            for item in state.items.iter_mut() {
                if item.status == DownloadStatus::Downloading {
                    item.status = DownloadStatus::Pending;
                    demoted += 1;
                }
            }

            let changed = demoted > 0 || state.items.len() != loaded;
            (demoted, if changed { Changes::QUEUE } else { Changes::NONE })
        });
        self.commit(write).await;

        tracing::info!(
            queued = self.len(),
            demoted,
            "restored download queue"
        );
        Ok(())
    }

    /// Add a pending item unless it is already queued or downloaded
    ///
    /// Returns the item id either way.
    pub async fn enqueue(&self, resource_id: u32, variant: &str, total_parts: u32) -> String {
        let ((id, added), write) = self.mutate(|state| {
            let id = item_id(resource_id, variant);
            if state.position(&id).is_some() || state.is_downloaded(resource_id, variant) {
                return ((id, false), Changes::NONE);
            }
            state.items.push(DownloadItem::new(resource_id, variant, total_parts));
            ((id, true), Changes::QUEUE)
        });
        self.commit(write).await;

        if added {
            tracing::debug!(item_id = %id, "enqueued");
        }
        id
    }

    /// Enqueue a batch with a single persist; returns the ids actually added
    pub async fn enqueue_many(&self, variant: &str, resources: &[(u32, u32)]) -> Vec<String> {
        let (added, write) = self.mutate(|state| {
            let mut added = Vec::new();
            for &(resource_id, total_parts) in resources {
                let id = item_id(resource_id, variant);
                if state.position(&id).is_some() || state.is_downloaded(resource_id, variant) {
                    continue;
                }
                state.items.push(DownloadItem::new(resource_id, variant, total_parts));
                added.push(id);
            }
            let changes = if added.is_empty() { Changes::NONE } else { Changes::QUEUE };
            (added, changes)
        });
        self.commit(write).await;
        added
    }

    pub fn is_downloaded(&self, resource_id: u32, variant: &str) -> bool {
        self.state.lock().is_downloaded(resource_id, variant)
    }

    /// Drop an item from the queue
    pub async fn remove(&self, id: &str) -> Option<DownloadItem> {
        let (removed, write) = self.remove_staged(id);
        self.commit(write).await;
        removed
    }

    pub fn remove_staged(&self, id: &str) -> (Option<DownloadItem>, StagedWrite) {
        self.mutate(|state| match state.position(id) {
            Some(index) => (Some(state.items.remove(index)), Changes::QUEUE),
            None => (None, Changes::NONE),
        })
    }

    /// Move a finished item into the downloaded metadata
    ///
    /// Returns the item in its final `completed` form.
    pub async fn promote_to_completed(&self, id: &str, actual_bytes: u64) -> Option<DownloadItem> {
        let (completed, write) = self.mutate(|state| {
            let Some(index) = state.position(id) else {
                return (None, Changes::NONE);
            };
            let mut item = state.items.remove(index);
            item.status = DownloadStatus::Completed;
            item.parts_completed = item.total_parts;
            item.progress = 100;
            item.downloaded_bytes = actual_bytes;
            item.total_bytes = actual_bytes;
            item.error = None;
            item.completed_at = Some(Utc::now());

            let entry = state.downloaded.entry(item.variant.clone()).or_default();
            entry.resource_ids.insert(item.resource_id);
            entry.total_bytes += actual_bytes;

            (Some(item), Changes::BOTH)
        });
        self.commit(write).await;
        completed
    }

    /// Apply `f` to one item and persist; `None` if the item is gone
    pub async fn update<F>(&self, id: &str, f: F) -> Option<DownloadItem>
    where
        F: FnOnce(&mut DownloadItem),
    {
        let (updated, write) = self.mutate(|state| match state.item_mut(id) {
            Some(item) => {
                f(item);
                (Some(item.clone()), Changes::QUEUE)
            }
            None => (None, Changes::NONE),
        });
        self.commit(write).await;
        updated
    }

    /// Mark up to `limit` of the earliest pending items as downloading
    pub async fn claim_pending(&self, limit: usize) -> Vec<DownloadItem> {
        let (claimed, write) = self.claim_pending_staged(limit);
        self.commit(write).await;
        claimed
    }

    pub fn claim_pending_staged(&self, limit: usize) -> (Vec<DownloadItem>, StagedWrite) {
        self.mutate(|state| {
            let claimed: Vec<DownloadItem> = state
                .items
                .iter_mut()
                .filter(|item| item.status == DownloadStatus::Pending)
                .take(limit)
                .map(|item| {
                    item.status = DownloadStatus::Downloading;
                    item.error = None;
                    item.clone()
                })
                .collect();
            let changes = if claimed.is_empty() { Changes::NONE } else { Changes::QUEUE };
            (claimed, changes)
        })
    }

    /// Pause an item that no run is driving yet
    ///
    /// Returns the item's status afterwards, `None` if it is not queued.
    pub async fn pause_if_pending(&self, id: &str) -> Option<DownloadStatus> {
        let (status, write) = self.pause_if_pending_staged(id);
        self.commit(write).await;
        status
    }

    pub fn pause_if_pending_staged(&self, id: &str) -> (Option<DownloadStatus>, StagedWrite) {
        self.mutate(|state| match state.item_mut(id) {
            Some(item) if item.status == DownloadStatus::Pending => {
                item.mark_paused();
                (Some(item.status), Changes::QUEUE)
            }
            Some(item) => (Some(item.status), Changes::NONE),
            None => (None, Changes::NONE),
        })
    }

    /// Put a paused or failed item back in line, keeping its cursor
    ///
    /// Returns the item's status afterwards, `None` if it is not queued.
    pub async fn requeue_if_resumable(&self, id: &str) -> Option<DownloadStatus> {
        let (status, write) = self.mutate(|state| match state.item_mut(id) {
            Some(item) if item.is_resumable() => {
                item.requeue();
                (Some(item.status), Changes::QUEUE)
            }
            Some(item) => (Some(item.status), Changes::NONE),
            None => (None, Changes::NONE),
        });
        self.commit(write).await;
        status
    }

    /// Copy of the queue in enqueue order
    pub fn snapshot(&self) -> Vec<DownloadItem> {
        self.state.lock().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<DownloadItem> {
        let state = self.state.lock();
        state.position(id).map(|index| state.items[index].clone())
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_pending(&self) -> bool {
        self.state
            .lock()
            .items
            .iter()
            .any(|item| item.status == DownloadStatus::Pending)
    }

    pub fn items_for_variant(&self, variant: &str) -> Vec<DownloadItem> {
        self.state
            .lock()
            .items
            .iter()
            .filter(|item| item.variant == variant)
            .cloned()
            .collect()
    }

    pub fn downloaded(&self, variant: &str) -> Option<DownloadedVariant> {
        self.state.lock().downloaded.get(variant).cloned()
    }

    /// Every variant with at least one completed resource
    pub fn downloaded_variants(&self) -> Vec<String> {
        self.state.lock().downloaded.keys().cloned().collect()
    }

    /// Remove one resource from the metadata, subtracting its size
    pub async fn forget_downloaded(&self, resource_id: u32, variant: &str, bytes: u64) -> bool {
        let (removed, write) = self.mutate(|state| {
            let Some(entry) = state.downloaded.get_mut(variant) else {
                return (false, Changes::NONE);
            };
            if !entry.resource_ids.remove(&resource_id) {
                return (false, Changes::NONE);
            }
            entry.total_bytes = entry.total_bytes.saturating_sub(bytes);
            if entry.is_empty() {
                state.downloaded.remove(variant);
            }
            (true, Changes::COMPLETED)
        });
        self.commit(write).await;
        removed
    }

    /// Remove a variant's metadata entirely
    pub async fn forget_variant(&self, variant: &str) -> Option<DownloadedVariant> {
        let (removed, write) = self.mutate(|state| {
            let removed = state.downloaded.remove(variant);
            let changes = if removed.is_some() { Changes::COMPLETED } else { Changes::NONE };
            (removed, changes)
        });
        self.commit(write).await;
        removed
    }

    /// Drop `missing` resources and swap the bytes recorded for a checked
    /// snapshot (`checked_bytes`) for the bytes found on disk
    ///
    /// Applied as a delta so resources promoted after the snapshot keep
    /// their share of the total.
    pub async fn reconcile_variant(
        &self,
        variant: &str,
        missing: &[u32],
        checked_bytes: u64,
        measured_bytes: u64,
    ) {
        let write = self
            .mutate(|state| {
                let Some(entry) = state.downloaded.get_mut(variant) else {
                    return ((), Changes::NONE);
                };
                for resource_id in missing {
                    entry.resource_ids.remove(resource_id);
                }
                entry.total_bytes = entry.total_bytes.saturating_sub(checked_bytes) + measured_bytes;
                if entry.is_empty() {
                    state.downloaded.remove(variant);
                }
                ((), Changes::COMPLETED)
            })
            .1;
        self.commit(write).await;
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut QueueState) -> (R, Changes)) -> (R, StagedWrite) {
        let mut state = self.state.lock();
        let (value, changes) = f(&mut state);
        let write = state.capture(changes);
        (value, write)
    }

    /// Persist staged changes; save errors are logged
    pub async fn commit(&self, write: StagedWrite) {
        if let Err(e) = self.write(write).await {
            tracing::error!(error = %e, "failed to persist download state");
        }
    }

    async fn write(&self, write: StagedWrite) -> Result<()> {
        if write.is_empty() {
            return Ok(());
        }

        let mut written = self.written.lock().await;
        if let Some((generation, json)) = write.queue {
            if generation > written.queue {
                self.store.save(QUEUE_KEY, &json).await?;
                written.queue = generation;
            }
        }
        if let Some((generation, json)) = write.completed {
            if generation > written.completed {
                self.store.save(COMPLETED_KEY, &json).await?;
                written.completed = generation;
            }
        }
        Ok(())
    }
}

fn serialize<T: Serialize>(key: &str, value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(key, error = %e, "failed to serialize download state");
            None
        }
    }
}

fn parse_or_default<T: DeserializeOwned + Default>(key: &str, json: Option<String>) -> T {
    let Some(json) = json else {
        return T::default();
    };
    match serde_json::from_str(&json) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding unreadable download state");
            T::default()
        }
    }
}
