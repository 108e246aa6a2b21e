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


//! Path naming for recitation audio
//!
//! # Layout
//! - `{audio_dir}/{variant}/{sss}{aaa}.mp3` per ayah
//! - `sss` is the 3-digit surah number, `aaa` the 3-digit ayah number
//! - In-flight downloads write to `{file}.part` and are renamed when complete

use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};

/// Extension of the audio parts served by the recitation mirrors
pub const PART_EXTENSION: &str = "mp3";

/// Suffix appended to a part while it is being written
pub const PARTIAL_SUFFIX: &str = "part";

// Longest variant folder name we accept (bytes)
const MAX_VARIANT_LENGTH: usize = 128;

/// File name for one ayah of one surah, e.g. `002255.mp3`
pub fn part_file_name(resource_id: u32, part: u32) -> String {
    format!("{:03}{:03}.{}", resource_id, part, PART_EXTENSION)
}

/// Temp path a part is streamed into before being renamed into place
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

/// Check that a variant (reciter id) is usable as a single path component
///
/// Variants are folder names on the recitation mirrors (`Alafasy_128kbps`),
/// so anything that could escape the audio directory is rejected rather than
/// rewritten.
pub fn validate_variant(variant: &str) -> Result<()> {
    let invalid = variant.is_empty()
        || variant.len() > MAX_VARIANT_LENGTH
        || variant == "."
        || variant == ".."
        || variant.trim() != variant
        || variant
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0') || c.is_control());

    if invalid {
        return Err(CoreError::InvalidVariant(variant.to_string()));
    }
    Ok(())
}
