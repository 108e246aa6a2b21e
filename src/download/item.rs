//! Download queue records
//!
//! A `DownloadItem` is one surah for one reciter, downloaded ayah by ayah.
//! `parts_completed` doubles as the resume cursor: parts `1..=parts_completed`
//! are on disk and are never fetched again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Resource kind prefix used in item ids
pub const RESOURCE_KIND: &str = "surah";

/// Rough mp3 size of one ayah, used until real sizes are known
pub const ESTIMATED_PART_BYTES: u64 = 120 * 1024;

/// Status of a download item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable id for a (resource, variant) pair
pub fn item_id(resource_id: u32, variant: &str) -> String {
    format!("{}-{}-{:03}", RESOURCE_KIND, variant, resource_id)
}

/// Inverse of `item_id`: `(resource_id, variant)`
pub fn parse_item_id(id: &str) -> Option<(u32, String)> {
    let rest = id.strip_prefix(RESOURCE_KIND)?.strip_prefix('-')?;
    let (variant, resource) = rest.rsplit_once('-')?;
    if variant.is_empty() {
        return None;
    }
    Some((resource.parse().ok()?, variant.to_string()))
}

/// One queued multi-part download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItem {
    pub id: String,
    pub resource_id: u32,
    pub variant: String,
    pub status: DownloadStatus,
    /// Percent complete, 0-100
    pub progress: u8,
    pub total_parts: u32,
    /// Resume cursor: last part known to be on disk
    pub parts_completed: u32,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    /// Last failure, only set while `status` is `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DownloadItem {
    /// New pending item
    pub fn new(resource_id: u32, variant: &str, total_parts: u32) -> Self {
        Self {
            id: item_id(resource_id, variant),
            resource_id,
            variant: variant.to_string(),
            status: DownloadStatus::Pending,
            progress: 0,
            total_parts,
            parts_completed: 0,
            total_bytes: u64::from(total_parts) * ESTIMATED_PART_BYTES,
            downloaded_bytes: 0,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Advance the cursor past one more part of `bytes` size
    pub fn record_part(&mut self, bytes: u64) {
        self.parts_completed = (self.parts_completed + 1).min(self.total_parts);
        self.downloaded_bytes += bytes;
        self.total_bytes = self.total_bytes.max(self.downloaded_bytes);
        self.progress = percent(self.parts_completed, self.total_parts);
    }

    /// Paused and failed items can be put back in line
    pub fn is_resumable(&self) -> bool {
        matches!(self.status, DownloadStatus::Paused | DownloadStatus::Failed)
    }

    /// Pending or downloading
    pub fn is_active(&self) -> bool {
        matches!(self.status, DownloadStatus::Pending | DownloadStatus::Downloading)
    }

    pub fn is_complete(&self) -> bool {
        self.total_parts > 0 && self.parts_completed >= self.total_parts
    }

    pub fn mark_failed(&mut self, message: String) {
        self.status = DownloadStatus::Failed;
        self.error = Some(message);
    }

    pub fn mark_paused(&mut self) {
        self.status = DownloadStatus::Paused;
        self.error = None;
    }

    /// Back to pending, keeping the cursor
    pub fn requeue(&mut self) {
        self.status = DownloadStatus::Pending;
        self.error = None;
    }
}

fn percent(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (f64::from(done) / f64::from(total) * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Completed resources for one variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedVariant {
    pub resource_ids: BTreeSet<u32>,
    /// Cumulative size of all completed resources
    pub total_bytes: u64,
}

impl DownloadedVariant {
    pub fn contains(&self, resource_id: u32) -> bool {
        self.resource_ids.contains(&resource_id)
    }

    pub fn is_empty(&self) -> bool {
        self.resource_ids.is_empty()
    }
}
