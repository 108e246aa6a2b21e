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


//! Where parts come from and where they go
//!
//! A `PartSource` maps `(variant, resource, part)` to a remote URL and a
//! local file path. The default source follows the everyayah.com layout:
//! `{base}/{variant}/{sss}{aaa}.mp3` on the server, mirrored under the audio
//! directory on device.

use crate::download::catalog;
use crate::error::{CoreError, Result};
use crate::file::paths::{part_file_name, validate_variant};
use std::path::PathBuf;
use url::Url;

/// Remote and local location of one part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartLocation {
    pub url: String,
    pub path: PathBuf,
}

/// Catalog and URL scheme for downloadable resources
pub trait PartSource: Send + Sync {
    /// Number of parts in a resource, `None` for unknown resources
    fn part_count(&self, resource_id: u32) -> Option<u32>;

    /// Every resource id, in catalog order
    fn resource_ids(&self) -> Vec<u32>;

    /// Directory holding all parts of a variant
    fn variant_directory(&self, variant: &str) -> PathBuf;

    fn locate(&self, variant: &str, resource_id: u32, part: u32) -> Result<PartLocation>;
}

/// everyayah.com style per-ayah mp3 source
#[derive(Debug, Clone)]
pub struct EveryAyahSource {
    base_url: Url,
    audio_directory: PathBuf,
}

impl EveryAyahSource {
    pub fn new(base_url: &str, audio_directory: impl Into<PathBuf>) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| CoreError::InvalidDownloadUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CoreError::InvalidDownloadUrl(base_url.to_string()));
        }
        // Url::join drops the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            audio_directory: audio_directory.into(),
        })
    }
}

impl PartSource for EveryAyahSource {
    fn part_count(&self, resource_id: u32) -> Option<u32> {
        catalog::ayah_count(resource_id)
    }

    fn resource_ids(&self) -> Vec<u32> {
        catalog::surah_numbers().collect()
    }

    fn variant_directory(&self, variant: &str) -> PathBuf {
        self.audio_directory.join(variant)
    }

    fn locate(&self, variant: &str, resource_id: u32, part: u32) -> Result<PartLocation> {
        validate_variant(variant)?;
        let total = self
            .part_count(resource_id)
            .ok_or(CoreError::InvalidResource(resource_id))?;
        if part == 0 || part > total {
            return Err(CoreError::invalid_input(format!(
                "Part {} out of range for resource {} ({} parts)",
                part, resource_id, total
            )));
        }

        let file_name = part_file_name(resource_id, part);
        let url = self
            .base_url
            .join(&format!("{}/", variant))?
            .join(&file_name)?;

        Ok(PartLocation {
            url: url.to_string(),
            path: self.variant_directory(variant).join(file_name),
        })
    }
}
