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


//! HTTP fetch of a single part
//!
//! # Write path
//! 1. GET the part URL
//! 2. Stream the body into `{dest}.part` through a buffered writer
//! 3. Flush and rename over `dest`
//!
//! A file at `dest` therefore always holds a complete part. A failed or
//! abandoned fetch leaves at most a `.part` file behind, which is truncated
//! by the next attempt and removed by cancel.
//!
//! Parts are small (tens to hundreds of KB), so there is no byte-range
//! resume inside a part; resume happens at part granularity.

use crate::error::{CoreError, Result};
use crate::file::paths::partial_path;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

// Write buffer size
const DOWNLOAD_BUFF_SZ: usize = 64 * 1024;

// Connection establishment budget; the whole fetch is bounded by the caller
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Downloads one part to a local path
#[async_trait]
pub trait PartFetcher: Send + Sync {
    /// Fetch `url` into `destination`, returning the number of bytes written
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// reqwest-backed part fetcher
#[derive(Debug, Clone)]
pub struct HttpPartFetcher {
    client: Client,
}

impl HttpPartFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("quran-audio-core/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Use an existing client (shared connection pool)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn stream_to_file(&self, url: &str, temp_path: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await.map_err(|e| {
            CoreError::network_error(format!("Request to {} failed: {}", url, e), true)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::UnexpectedStatusCode {
                status_code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let file = File::create(temp_path).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFF_SZ, file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                CoreError::network_error(format!("Connection dropped for {}: {}", url, e), true)
            })?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        if written == 0 {
            return Err(CoreError::network_error(format!("Empty response body for {}", url), true));
        }

        Ok(written)
    }
}

#[async_trait]
impl PartFetcher for HttpPartFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        let temp_path = partial_path(destination);

        match self.stream_to_file(url, &temp_path).await {
            Ok(bytes) => {
                tokio::fs::rename(&temp_path, destination).await?;
                tracing::trace!(url, bytes, "part fetched");
                Ok(bytes)
            }
            Err(e) => {
                // Don't leave a truncated temp file around
                if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        tracing::debug!(path = %temp_path.display(), error = %cleanup, "temp file cleanup failed");
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unreachable_host_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("001001.mp3");
        let fetcher = HttpPartFetcher::new().unwrap();

        // Port 9 on localhost is the discard port and normally closed
        let result = fetcher.fetch("http://127.0.0.1:9/001001.mp3", &dest).await;

        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }
}
