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


//! Download management for recitation audio
//!
//! A surah is downloaded ayah by ayah from a per-ayah mp3 mirror.
//!
//! # Components
//! - `queue` - the queue and downloaded-resources metadata (source of truth)
//! - `processor` - single-flight loop applying network and concurrency policy
//! - `worker` - drives one item through its parts with retry and resume
//! - `control` - per-run pause/cancel signals
//! - `manager` - `DownloadService`, the surface the app talks to
//!
//! Collaborators are traits so the app (or a test) can swap them:
//! `NetworkPolicy`, `FileStorage`, `KeyValueStore`, `PartSource` and
//! `PartFetcher`.

pub mod catalog;
pub mod config;
pub mod control;
pub mod item;
pub mod manager;
pub mod network;
pub mod processor;
pub mod progress;
pub mod queue;
pub mod source;
pub mod stream;
pub mod worker;

// Re-export commonly used types
pub use config::{DownloadConfig, DownloadSettings};
pub use item::{DownloadItem, DownloadStatus, DownloadedVariant};
pub use manager::{Collaborators, DownloadService};
pub use network::{ConnectionType, NetworkPolicy, NetworkStatus, WatchedNetworkPolicy};
pub use progress::{DownloadProgress, Subscription};
pub use source::{EveryAyahSource, PartLocation, PartSource};
pub use stream::{HttpPartFetcher, PartFetcher};
