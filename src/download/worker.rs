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


//! Item downloader
//!
//! Drives one queued surah from its resume cursor to completion, one ayah at
//! a time, in ascending order.
//!
//! # Per-part flow
//! 1. Check cancel, then pause
//! 2. Skip the fetch if a complete file is already on disk
//! 3. Otherwise fetch with a fixed number of attempts and a fixed delay,
//!    each attempt bounded by the fetch timeout
//! 4. Advance the cursor, persist, emit progress
//!
//! Signals are checked before and after every attempt and after every
//! delay. A cancel request also interrupts an in-flight fetch. A failure
//! observed while cancel or pause is requested takes the cancel or pause
//! path instead of failing the item.

use crate::download::config::DownloadConfig;
use crate::download::control::ItemControl;
use crate::download::item::{DownloadItem, DownloadStatus};
use crate::download::progress::{DownloadEvents, DownloadProgress};
use crate::download::queue::DownloadQueueStore;
use crate::download::source::{PartLocation, PartSource};
use crate::download::stream::PartFetcher;
use crate::error::{CoreError, Result};
use crate::file::FileStorage;
use std::sync::Arc;

/// How one run of an item ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Paused,
    Cancelled,
    Failed(String),
}

/// Collaborators shared by every run
pub struct DownloadContext {
    pub queue: Arc<DownloadQueueStore>,
    pub files: Arc<dyn FileStorage>,
    pub source: Arc<dyn PartSource>,
    pub fetcher: Arc<dyn PartFetcher>,
    pub events: DownloadEvents,
    pub config: DownloadConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Cancel,
    Pause,
}

fn signal(control: &ItemControl) -> Option<Signal> {
    if control.is_cancelled() {
        Some(Signal::Cancel)
    } else if control.is_paused() {
        Some(Signal::Pause)
    } else {
        None
    }
}

enum Fetch {
    Done(u64),
    Interrupted,
}

/// Run `item` until it completes, pauses, fails or is cancelled
pub async fn run_item(ctx: &DownloadContext, item: DownloadItem, control: &ItemControl) -> RunOutcome {
    let id = item.id.clone();
    tracing::debug!(item_id = %id, from_part = item.parts_completed + 1, "starting item");

    let outcome = match drive(ctx, &item, control).await {
        Ok(outcome) => outcome,
        Err(e) => match signal(control) {
            Some(Signal::Cancel) => RunOutcome::Cancelled,
            Some(Signal::Pause) => pause(ctx, &id, control).await,
            None => fail(ctx, &id, &e).await,
        },
    };

    match &outcome {
        RunOutcome::Completed => tracing::info!(item_id = %id, "download completed"),
        RunOutcome::Paused => tracing::info!(item_id = %id, "download paused"),
        RunOutcome::Cancelled => tracing::info!(item_id = %id, "download cancelled"),
        RunOutcome::Failed(message) => tracing::warn!(item_id = %id, error = %message, "download failed"),
    }
    outcome
}

async fn drive(ctx: &DownloadContext, item: &DownloadItem, control: &ItemControl) -> Result<RunOutcome> {
    let id = item.id.as_str();

    let Some(current) = ctx
        .queue
        .update(id, |i| {
            i.status = DownloadStatus::Downloading;
            i.error = None;
        })
        .await
    else {
        return Ok(RunOutcome::Cancelled);
    };
    ctx.events.progress.emit(&DownloadProgress::from(&current));

    ctx.files
        .ensure_directory(&ctx.source.variant_directory(&current.variant))
        .await?;

    let mut downloaded_bytes = current.downloaded_bytes;
    for part in current.parts_completed + 1..=current.total_parts {
        match signal(control) {
            Some(Signal::Cancel) => return Ok(RunOutcome::Cancelled),
            Some(Signal::Pause) => return Ok(pause(ctx, id, control).await),
            None => {}
        }

        let location = ctx.source.locate(&current.variant, current.resource_id, part)?;
        let on_disk = ctx.files.exists(&location.path).await?;
        let bytes = if on_disk.is_complete() {
            tracing::trace!(item_id = id, part, "part already on disk");
            on_disk.size.unwrap_or(0)
        } else {
            match fetch_with_retry(ctx, id, part, &location, control).await? {
                Fetch::Done(bytes) => bytes,
                Fetch::Interrupted => match signal(control) {
                    Some(Signal::Pause) => return Ok(pause(ctx, id, control).await),
                    _ => return Ok(RunOutcome::Cancelled),
                },
            }
        };

        if control.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let Some(updated) = ctx.queue.update(id, |i| i.record_part(bytes)).await else {
            return Ok(RunOutcome::Cancelled);
        };
        downloaded_bytes = updated.downloaded_bytes;
        ctx.events.progress.emit(&DownloadProgress::from(&updated));
    }

    if control.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }

    match ctx.queue.promote_to_completed(id, downloaded_bytes).await {
        Some(completed) => {
            ctx.events.complete.emit(&DownloadProgress::from(&completed));
            Ok(RunOutcome::Completed)
        }
        None => Ok(RunOutcome::Cancelled),
    }
}

async fn fetch_with_retry(
    ctx: &DownloadContext,
    id: &str,
    part: u32,
    location: &PartLocation,
    control: &ItemControl,
) -> Result<Fetch> {
    let attempts = ctx.config.attempts();
    let mut last_error = None;

    for attempt in 1..=attempts {
        if signal(control).is_some() {
            return Ok(Fetch::Interrupted);
        }

        let fetch = tokio::time::timeout(
            ctx.config.fetch_timeout(),
            ctx.fetcher.fetch(&location.url, &location.path),
        );
        let result = tokio::select! {
            biased;
            _ = control.cancelled() => return Ok(Fetch::Interrupted),
            result = fetch => result,
        };

        let error = match result {
            Ok(Ok(bytes)) => return Ok(Fetch::Done(bytes)),
            Ok(Err(e)) => e,
            Err(_) => CoreError::Timeout(ctx.config.fetch_timeout_secs),
        };
        tracing::warn!(
            item_id = id,
            part,
            attempt,
            retryable = error.is_retryable(),
            error = %error,
            "part fetch failed"
        );

        if signal(control).is_some() {
            return Ok(Fetch::Interrupted);
        }
        last_error = Some(error);

        if attempt < attempts {
            tokio::select! {
                biased;
                _ = control.cancelled() => return Ok(Fetch::Interrupted),
                _ = tokio::time::sleep(ctx.config.retry_delay()) => {}
            }
        }
    }

    Err(CoreError::RetriesExhausted {
        part,
        attempts,
        message: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

async fn pause(ctx: &DownloadContext, id: &str, control: &ItemControl) -> RunOutcome {
    // A resume may have cleared the flag since we saw it; requeue then
    let updated = ctx
        .queue
        .update(id, |i| {
            if control.is_paused() {
                i.mark_paused();
            } else {
                i.requeue();
            }
        })
        .await;
    match updated {
        Some(item) => {
            ctx.events.progress.emit(&DownloadProgress::from(&item));
            RunOutcome::Paused
        }
        None => RunOutcome::Cancelled,
    }
}

async fn fail(ctx: &DownloadContext, id: &str, error: &CoreError) -> RunOutcome {
    tracing::debug!(item_id = id, file_error = error.is_file_error(), error = %error, "failing item");
    // The item carries the message shown in the UI
    let message = error.user_message();
    match ctx.queue.update(id, |i| i.mark_failed(message.clone())).await {
        Some(failed) => {
            ctx.events.error.emit(&DownloadProgress::from(&failed));
            RunOutcome::Failed(message)
        }
        None => RunOutcome::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::source::EveryAyahSource;
    use crate::file::FileManager;
    use crate::storage::MemoryKeyValueStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    const VARIANT: &str = "Alafasy_128kbps";

    /// Writes a small file per part; fails parts listed in `failing`
    #[derive(Default)]
    struct FakeFetcher {
        calls: Mutex<HashMap<String, u32>>,
        failing: Vec<&'static str>,
    }

    impl FakeFetcher {
        fn calls(&self) -> u32 {
            self.calls.lock().values().sum()
        }
    }

    #[async_trait]
    impl PartFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
            *self.calls.lock().entry(url.to_string()).or_default() += 1;
            if self.failing.iter().any(|suffix| url.ends_with(suffix)) {
                return Err(CoreError::UnexpectedStatusCode {
                    status_code: 503,
                    url: url.to_string(),
                });
            }
            tokio::fs::write(destination, b"ayah").await?;
            Ok(4)
        }
    }

    fn context(dir: &TempDir, fetcher: Arc<FakeFetcher>) -> DownloadContext {
        let config = DownloadConfig {
            audio_directory: dir.path().to_path_buf(),
            retry_delay_ms: 1,
            ..Default::default()
        };
        DownloadContext {
            queue: Arc::new(DownloadQueueStore::new(Arc::new(MemoryKeyValueStore::new()))),
            files: Arc::new(FileManager::new(dir.path().to_path_buf())),
            source: Arc::new(EveryAyahSource::new(&config.base_url, dir.path()).unwrap()),
            fetcher,
            events: DownloadEvents::new(),
            config,
        }
    }

    #[tokio::test]
    async fn test_run_completes_item() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let ctx = context(&dir, fetcher.clone());
        ctx.queue.enqueue(1, VARIANT, 7).await;
        let item = ctx.queue.claim_pending(1).await.remove(0);

        let outcome = run_item(&ctx, item, &ItemControl::new()).await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(fetcher.calls(), 7);
        assert!(ctx.queue.is_downloaded(1, VARIANT));
        assert_eq!(ctx.queue.downloaded(VARIANT).unwrap().total_bytes, 28);
        assert!(dir.path().join(VARIANT).join("001007.mp3").exists());
    }

    #[tokio::test]
    async fn test_existing_parts_are_not_refetched() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let ctx = context(&dir, fetcher.clone());
        std::fs::create_dir_all(dir.path().join(VARIANT)).unwrap();
        std::fs::write(dir.path().join(VARIANT).join("001001.mp3"), b"cached").unwrap();

        ctx.queue.enqueue(1, VARIANT, 7).await;
        let item = ctx.queue.claim_pending(1).await.remove(0);
        run_item(&ctx, item, &ItemControl::new()).await;

        assert_eq!(fetcher.calls(), 6);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_item() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            failing: vec!["001003.mp3"],
            ..Default::default()
        });
        let ctx = context(&dir, fetcher.clone());
        let id = ctx.queue.enqueue(1, VARIANT, 7).await;
        let item = ctx.queue.claim_pending(1).await.remove(0);

        let outcome = run_item(&ctx, item, &ItemControl::new()).await;

        assert!(matches!(outcome, RunOutcome::Failed(_)));
        assert_eq!(fetcher.calls(), 2 + 3);
        let failed = ctx.queue.get(&id).unwrap();
        assert_eq!(failed.status, DownloadStatus::Failed);
        assert_eq!(failed.parts_completed, 2);
        assert_eq!(failed.error.as_deref(), Some("Verse 3 could not be downloaded. Tap resume to try again."));
    }

    #[tokio::test]
    async fn test_pause_before_start_keeps_cursor() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let ctx = context(&dir, fetcher.clone());
        let id = ctx.queue.enqueue(1, VARIANT, 7).await;
        let item = ctx.queue.claim_pending(1).await.remove(0);

        let control = ItemControl::new();
        control.request_pause();
        let outcome = run_item(&ctx, item, &control).await;

        assert_eq!(outcome, RunOutcome::Paused);
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(ctx.queue.get(&id).unwrap().status, DownloadStatus::Paused);
    }

    #[tokio::test]
    async fn test_cancel_before_first_part() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let ctx = context(&dir, fetcher);
        let id = ctx.queue.enqueue(1, VARIANT, 7).await;
        let item = ctx.queue.claim_pending(1).await.remove(0);

        let control = ItemControl::new();
        control.request_cancel();
        let outcome = run_item(&ctx, item, &control).await;

        assert_eq!(outcome, RunOutcome::Cancelled);
        // Cancelled runs leave queue cleanup to the canceller
        assert!(ctx.queue.get(&id).is_some());
    }
}
