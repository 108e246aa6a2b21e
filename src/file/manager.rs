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


//! File operations used by the download manager
//!
//! # Key Operations
//! - Directory creation
//! - File existence and size checks
//! - Idempotent deletes (with retry)
//! - Directory listing and empty-directory removal

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;

/// Maximum retry attempts for file operations
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Result of an existence check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileInfo {
    pub exists: bool,
    /// Size in bytes, present when the path is a file
    pub size: Option<u64>,
}

impl FileInfo {
    pub fn missing() -> Self {
        Self { exists: false, size: None }
    }

    /// True for an existing file with content
    pub fn is_complete(&self) -> bool {
        self.exists && self.size.unwrap_or(0) > 0
    }
}

/// File storage the download manager writes into
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Create a directory and its parents
    async fn ensure_directory(&self, path: &Path) -> Result<()>;

    async fn exists(&self, path: &Path) -> Result<FileInfo>;

    /// Delete a file; missing files are not an error
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Entry names in a directory; empty if the directory is missing
    async fn list_directory(&self, path: &Path) -> Result<Vec<String>>;

    /// Remove a directory if it exists and is empty. Returns whether it was removed.
    async fn remove_directory(&self, path: &Path) -> Result<bool>;
}

/// Local filesystem storage backed by `tokio::fs`
#[derive(Debug, Clone)]
pub struct FileManager {
    /// Base audio directory
    root: PathBuf,
}

impl FileManager {
    /// Create a new file manager
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Safe delete operation with retry
    pub async fn safe_delete(&self, path: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match Self::safe_delete_once(path).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(CoreError::FileIoError(format!(
                        "Failed to delete file after {} attempts: {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        path.display(),
                        e
                    )));
                }
                Err(_) => {
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            }
        }
    }

    async fn safe_delete_once(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            // Not an error if file doesn't exist
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::FileIoError(format!(
                "Delete failed: {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Ensure directory exists, creating parent directories as needed
    pub async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if Self::file_exists(path).await {
            return Ok(());
        }

        fs::create_dir_all(path).await.map_err(|e| {
            CoreError::FileIoError(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Check if file exists
    pub async fn file_exists(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }
}

#[async_trait]
impl FileStorage for FileManager {
    async fn ensure_directory(&self, path: &Path) -> Result<()> {
        self.ensure_directory_exists(path).await
    }

    async fn exists(&self, path: &Path) -> Result<FileInfo> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(FileInfo {
                exists: true,
                size: metadata.is_file().then(|| metadata.len()),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileInfo::missing()),
            Err(e) => Err(CoreError::FileIoError(format!(
                "Failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.safe_delete(path).await
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CoreError::FileIoError(format!(
                    "Failed to read directory {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            CoreError::FileIoError(format!(
                "Failed to check directory entries {}: {}",
                path.display(),
                e
            ))
        })? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn remove_directory(&self, path: &Path) -> Result<bool> {
        // Never remove the storage root itself
        if path == self.root.as_path() {
            return Ok(false);
        }
        if !self.list_directory(path).await?.is_empty() || !Self::file_exists(path).await {
            return Ok(false);
        }

        fs::remove_dir(path).await.map_err(|e| {
            CoreError::FileIoError(format!(
                "Failed to remove empty directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(true)
    }
}
