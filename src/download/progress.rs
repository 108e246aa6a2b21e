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


//! Download progress reporting
//!
//! # Progress Information
//! - Item id, surah and reciter for identification
//! - Ayahs completed / total ayahs
//! - Bytes downloaded / estimated total
//! - Percentage complete
//! - Download status and the last error
//!
//! Listeners are plain callbacks. They run on whichever task produced the
//! event, outside every internal lock, so a listener may call back into the
//! service (including unsubscribing itself).

use crate::download::item::{DownloadItem, DownloadStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Progress snapshot for a single download item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub id: String,
    pub resource_id: u32,
    pub variant: String,
    pub status: DownloadStatus,
    /// Percentage complete (0 - 100)
    pub progress: u8,
    pub parts_completed: u32,
    pub total_parts: u32,
    pub downloaded_bytes: u64,
    /// Estimated until the last part lands
    pub total_bytes: u64,
    pub error: Option<String>,
}

impl From<&DownloadItem> for DownloadProgress {
    fn from(item: &DownloadItem) -> Self {
        Self {
            id: item.id.clone(),
            resource_id: item.resource_id,
            variant: item.variant.clone(),
            status: item.status,
            progress: item.progress,
            parts_completed: item.parts_completed,
            total_parts: item.total_parts,
            downloaded_bytes: item.downloaded_bytes,
            total_bytes: item.total_bytes,
            error: item.error.clone(),
        }
    }
}

impl DownloadProgress {
    /// Format bytes as human-readable string (e.g., "4.2 MB")
    pub fn bytes_string(bytes: u64) -> String {
        let mb = bytes as f64 / 1_000_000.0;
        format!("{:.1} MB", mb)
    }

    /// Format progress as display string
    pub fn display_string(&self) -> String {
        let label = format!("Surah {} ({})", self.resource_id, self.variant);
        match self.status {
            DownloadStatus::Pending => format!("{}: Queued", label),
            DownloadStatus::Downloading => format!(
                "{}: {}% ({}/{} ayahs, {})",
                label,
                self.progress,
                self.parts_completed,
                self.total_parts,
                Self::bytes_string(self.downloaded_bytes)
            ),
            DownloadStatus::Paused => format!("{}: Paused at {}%", label, self.progress),
            DownloadStatus::Completed => format!(
                "{}: Completed ({})",
                label,
                Self::bytes_string(self.downloaded_bytes)
            ),
            DownloadStatus::Failed => format!(
                "{}: Failed - {}",
                label,
                self.error.as_deref().unwrap_or("Unknown error")
            ),
        }
    }
}

/// Callback type for download events
pub type ProgressCallback = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;

/// A set of callbacks for one event kind
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, ProgressCallback)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; keep the returned handle to unsubscribe later
    pub fn subscribe(self: &Arc<Self>, callback: ProgressCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().push((id, callback));
        Subscription {
            id,
            listeners: Arc::downgrade(self),
        }
    }

    /// Invoke every callback with the event
    pub fn emit(&self, progress: &DownloadProgress) {
        // Snapshot so callbacks run without the lock held
        let callbacks: Vec<ProgressCallback> =
            self.callbacks.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            callback(progress);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.callbacks.lock().retain(|(cb_id, _)| *cb_id != id);
    }
}

/// Handle returned by `on_progress`/`on_complete`/`on_error`
///
/// Dropping the handle keeps the callback registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

/// The three event streams the service publishes
#[derive(Default)]
pub struct DownloadEvents {
    pub progress: Arc<Listeners>,
    pub complete: Arc<Listeners>,
    pub error: Arc<Listeners>,
}

impl DownloadEvents {
    pub fn new() -> Self {
        Self::default()
    }
}
