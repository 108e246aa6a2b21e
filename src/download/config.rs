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


//! Download configuration
//!
//! `DownloadConfig` is fixed for the lifetime of a service. `DownloadSettings`
//! are user preferences read from the network policy before every batch, so
//! changes apply without restarting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default recitation mirror (per-ayah mp3 files)
pub const DEFAULT_BASE_URL: &str = "https://everyayah.com/data/";

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root directory for downloaded audio
    pub audio_directory: PathBuf,

    /// Base URL of the recitation mirror
    pub base_url: String,

    /// Attempts per part before the item fails
    pub retry_attempts: u32,

    /// Fixed delay between attempts
    pub retry_delay_ms: u64,

    /// Time budget for a single part fetch
    pub fetch_timeout_secs: u64,

    /// How long `cancel` waits for an in-flight item to stop before cleaning up
    pub cancel_wait_timeout_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            audio_directory: PathBuf::from("./audio"),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry_attempts: 3,
            retry_delay_ms: 2_000,
            fetch_timeout_secs: 30,
            cancel_wait_timeout_ms: 10_000,
        }
    }
}

impl DownloadConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cancel_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_wait_timeout_ms)
    }

    /// At least one attempt is always made
    pub fn attempts(&self) -> u32 {
        self.retry_attempts.max(1)
    }
}

/// User download preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Maximum items downloading at once
    pub max_concurrent_downloads: usize,

    /// Only download while on WiFi
    pub wifi_only_downloads: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 2,
            wifi_only_downloads: false,
        }
    }
}

impl DownloadSettings {
    /// Concurrency limit, never below one
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_downloads.max(1)
    }
}
