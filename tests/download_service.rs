// End-to-end tests for DownloadService with scripted collaborators

use async_trait::async_trait;
use parking_lot::Mutex;
use quran_audio_core::download::{
    Collaborators, DownloadItem, DownloadProgress, DownloadStatus, NetworkStatus, PartFetcher,
    PartLocation, PartSource, WatchedNetworkPolicy,
};
use quran_audio_core::file::paths::part_file_name;
use quran_audio_core::file::{FileInfo, FileManager, FileStorage};
use quran_audio_core::storage::MemoryKeyValueStore;
use quran_audio_core::{CoreError, DownloadConfig, DownloadService, DownloadSettings, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

const VARIANT: &str = "Alafasy_128kbps";
const PARTS: u32 = 5;
const PART_BYTES: &[u8] = b"ayah-audio";

/// Four resources of five parts each
struct TestSource {
    root: PathBuf,
}

impl PartSource for TestSource {
    fn part_count(&self, resource_id: u32) -> Option<u32> {
        (1..=4).contains(&resource_id).then_some(PARTS)
    }

    fn resource_ids(&self) -> Vec<u32> {
        vec![1, 2, 3, 4]
    }

    fn variant_directory(&self, variant: &str) -> PathBuf {
        self.root.join(variant)
    }

    fn locate(&self, variant: &str, resource_id: u32, part: u32) -> Result<PartLocation> {
        if self.part_count(resource_id).is_none() {
            return Err(CoreError::InvalidResource(resource_id));
        }
        let name = part_file_name(resource_id, part);
        Ok(PartLocation {
            url: format!("https://mirror.test/{}/{}", variant, name),
            path: self.variant_directory(variant).join(name),
        })
    }
}

/// Fetcher with per-URL call counts, scripted failures and an optional hold
#[derive(Default)]
struct ScriptedFetcher {
    calls: Mutex<HashMap<String, u32>>,
    failures: Mutex<HashMap<String, u32>>,
    hold: Mutex<Option<String>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    reached: Notify,
    release: Notify,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Default::default() }
    }

    fn fail(&self, url: &str, times: u32) {
        self.failures.lock().insert(url.to_string(), times);
    }

    /// Block the first fetch of `url` until `release` is notified
    fn hold(&self, url: &str) {
        *self.hold.lock() = Some(url.to_string());
    }

    /// Block the first fetch of `url` until the returned gate is notified
    fn gate(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(url.to_string(), gate.clone());
        gate
    }

    fn calls(&self, url: &str) -> u32 {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl PartFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        *self.calls.lock().entry(url.to_string()).or_default() += 1;

        let held = {
            let mut hold = self.hold.lock();
            if hold.as_deref() == Some(url) {
                hold.take();
                true
            } else {
                false
            }
        };
        if held {
            self.reached.notify_one();
            self.release.notified().await;
        }
        let gate = self.gates.lock().remove(url);
        if let Some(gate) = gate {
            gate.notified().await;
        }

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(CoreError::UnexpectedStatusCode {
                        status_code: 503,
                        url: url.to_string(),
                    });
                }
            }
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let written = tokio::fs::write(destination, PART_BYTES).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        written?;
        Ok(PART_BYTES.len() as u64)
    }
}

/// Local files whose existence check on one path blocks until released
struct GatedFiles {
    inner: FileManager,
    gate: Mutex<Option<PathBuf>>,
    reached: Notify,
    release: Notify,
}

impl GatedFiles {
    fn new(root: PathBuf) -> Self {
        Self {
            inner: FileManager::new(root),
            gate: Mutex::new(None),
            reached: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl FileStorage for GatedFiles {
    async fn ensure_directory(&self, path: &Path) -> Result<()> {
        self.inner.ensure_directory(path).await
    }

    async fn exists(&self, path: &Path) -> Result<FileInfo> {
        let gated = {
            let mut gate = self.gate.lock();
            if gate.as_deref() == Some(path) {
                gate.take();
                true
            } else {
                false
            }
        };
        if gated {
            self.reached.notify_one();
            self.release.notified().await;
        }
        self.inner.exists(path).await
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<String>> {
        self.inner.list_directory(path).await
    }

    async fn remove_directory(&self, path: &Path) -> Result<bool> {
        self.inner.remove_directory(path).await
    }
}

struct Harness {
    dir: TempDir,
    store: Arc<MemoryKeyValueStore>,
    network: Arc<WatchedNetworkPolicy>,
    fetcher: Arc<ScriptedFetcher>,
    service: DownloadService,
}

impl Harness {
    async fn new(status: NetworkStatus, settings: DownloadSettings) -> Self {
        Self::with_fetcher(status, settings, ScriptedFetcher::default()).await
    }

    async fn with_fetcher(
        status: NetworkStatus,
        settings: DownloadSettings,
        fetcher: ScriptedFetcher,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryKeyValueStore::new());
        let network = Arc::new(WatchedNetworkPolicy::new(status, settings));
        let fetcher = Arc::new(fetcher);
        let service = build_service(dir.path(), store.clone(), network.clone(), fetcher.clone());
        service.start().await.unwrap();
        Self { dir, store, network, fetcher, service }
    }

    fn audio(&self) -> PathBuf {
        self.dir.path().join("audio")
    }

    fn url(&self, resource_id: u32, part: u32) -> String {
        format!("https://mirror.test/{}/{}", VARIANT, part_file_name(resource_id, part))
    }

    fn part_path(&self, resource_id: u32, part: u32) -> PathBuf {
        self.audio().join(VARIANT).join(part_file_name(resource_id, part))
    }

    fn item(&self, id: &str) -> Option<DownloadItem> {
        self.service.queue_snapshot().into_iter().find(|item| item.id == id)
    }
}

fn build_service(
    root: &Path,
    store: Arc<MemoryKeyValueStore>,
    network: Arc<WatchedNetworkPolicy>,
    fetcher: Arc<ScriptedFetcher>,
) -> DownloadService {
    let files = Arc::new(FileManager::new(root.join("audio")));
    build_service_with_files(root, store, network, fetcher, files)
}

fn build_service_with_files(
    root: &Path,
    store: Arc<MemoryKeyValueStore>,
    network: Arc<WatchedNetworkPolicy>,
    fetcher: Arc<ScriptedFetcher>,
    files: Arc<dyn FileStorage>,
) -> DownloadService {
    let audio = root.join("audio");
    let config = DownloadConfig {
        audio_directory: audio.clone(),
        retry_delay_ms: 1,
        cancel_wait_timeout_ms: 5_000,
        ..Default::default()
    };
    let collaborators = Collaborators {
        store,
        files,
        network,
        fetcher,
        source: Arc::new(TestSource { root: audio }),
    };
    DownloadService::new(config, collaborators)
}

fn default_settings() -> DownloadSettings {
    DownloadSettings::default()
}

/// Poll until `condition` holds, failing after five seconds
async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn record(events: &Arc<Mutex<Vec<DownloadProgress>>>) -> impl Fn(&DownloadProgress) + Send + Sync + 'static {
    let events = events.clone();
    move |progress| events.lock().push(progress.clone())
}

#[tokio::test]
async fn test_downloads_every_part_and_records_completion() {
    let settings = DownloadSettings { max_concurrent_downloads: 1, ..Default::default() };
    let h = Harness::new(NetworkStatus::wifi(), settings).await;
    let completed = Arc::new(Mutex::new(Vec::new()));
    let _sub = h.service.on_complete(record(&completed));

    let id = h.service.enqueue_resource(1, VARIANT).await.unwrap();
    h.service.wait_until_idle().await;

    assert_eq!(id, "surah-Alafasy_128kbps-001");
    assert!(h.service.is_downloaded(1, VARIANT));
    assert!(h.service.queue_snapshot().is_empty());
    assert_eq!(h.service.downloaded_resources(VARIANT), vec![1]);
    assert_eq!(h.service.storage_used(VARIANT), PARTS as u64 * PART_BYTES.len() as u64);

    for part in 1..=PARTS {
        assert_eq!(h.fetcher.calls(&h.url(1, part)), 1);
        assert!(h.part_path(1, part).exists());
    }

    let completed = completed.lock();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].status, DownloadStatus::Completed);
    assert_eq!(completed[0].progress, 100);

    // Persisted for the next launch
    let saved = h.store.get("downloads.completed").unwrap();
    assert!(saved.contains(VARIANT));
}

#[tokio::test]
async fn test_enqueue_is_idempotent_and_validated() {
    let h = Harness::new(NetworkStatus::offline(), default_settings()).await;

    let first = h.service.enqueue_resource(2, VARIANT).await.unwrap();
    let second = h.service.enqueue_resource(2, VARIANT).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.service.queue_snapshot().len(), 1);

    assert!(matches!(
        h.service.enqueue_resource(9, VARIANT).await,
        Err(CoreError::InvalidResource(9))
    ));
    assert!(matches!(
        h.service.enqueue_resource(1, "../escape").await,
        Err(CoreError::InvalidVariant(_))
    ));
}

#[tokio::test]
async fn test_offline_leaves_items_pending() {
    let h = Harness::new(NetworkStatus::offline(), default_settings()).await;

    let id = h.service.enqueue_resource(1, VARIANT).await.unwrap();
    h.service.wait_until_idle().await;

    assert_eq!(h.item(&id).unwrap().status, DownloadStatus::Pending);
    assert_eq!(h.fetcher.total_calls(), 0);

    h.network.set_status(NetworkStatus::cellular());
    wait_for(|| h.service.is_downloaded(1, VARIANT)).await;
}

#[tokio::test]
async fn test_wifi_only_waits_for_wifi() {
    let settings = DownloadSettings { wifi_only_downloads: true, ..Default::default() };
    let h = Harness::new(NetworkStatus::cellular(), settings).await;

    let id = h.service.enqueue_resource(3, VARIANT).await.unwrap();
    h.service.wait_until_idle().await;
    assert_eq!(h.item(&id).unwrap().status, DownloadStatus::Pending);
    assert_eq!(h.fetcher.total_calls(), 0);

    h.network.set_status(NetworkStatus::wifi());
    wait_for(|| h.service.is_downloaded(3, VARIANT)).await;
    assert_eq!(h.fetcher.total_calls(), PARTS);
}

#[tokio::test]
async fn test_pause_and_resume_continue_from_cursor() {
    let h = Harness::new(NetworkStatus::wifi(), default_settings()).await;
    h.fetcher.hold(&h.url(1, 3));

    let id = h.service.enqueue_resource(1, VARIANT).await.unwrap();
    h.fetcher.reached.notified().await;

    h.service.pause(&id).await.unwrap();
    h.fetcher.release.notify_one();
    wait_for(|| h.item(&id).map(|i| i.status) == Some(DownloadStatus::Paused)).await;

    // The in-flight part is kept; the cursor stops right after it
    let paused = h.item(&id).unwrap();
    assert_eq!(paused.parts_completed, 3);
    assert_eq!(paused.progress, 60);
    assert_eq!(h.fetcher.calls(&h.url(1, 4)), 0);

    h.service.resume(&id).await.unwrap();
    wait_for(|| h.service.is_downloaded(1, VARIANT)).await;

    for part in 1..=PARTS {
        assert_eq!(h.fetcher.calls(&h.url(1, part)), 1, "part {} fetched again", part);
    }
}

#[tokio::test]
async fn test_failure_while_paused_keeps_cursor() {
    let h = Harness::new(NetworkStatus::wifi(), default_settings()).await;
    let errors = Arc::new(Mutex::new(Vec::new()));
    let _sub = h.service.on_error(record(&errors));
    h.fetcher.hold(&h.url(1, 3));
    h.fetcher.fail(&h.url(1, 3), 1);

    let id = h.service.enqueue_resource(1, VARIANT).await.unwrap();
    h.fetcher.reached.notified().await;
    h.service.pause(&id).await.unwrap();
    h.fetcher.release.notify_one();
    wait_for(|| h.item(&id).map(|i| i.status) == Some(DownloadStatus::Paused)).await;

    // The failed attempt is not an item failure
    let paused = h.item(&id).unwrap();
    assert_eq!(paused.parts_completed, 2);
    assert!(paused.error.is_none());
    assert!(errors.lock().is_empty());

    h.service.resume(&id).await.unwrap();
    wait_for(|| h.service.is_downloaded(1, VARIANT)).await;

    assert_eq!(h.fetcher.calls(&h.url(1, 1)), 1);
    assert_eq!(h.fetcher.calls(&h.url(1, 2)), 1);
    assert_eq!(h.fetcher.calls(&h.url(1, 3)), 2);
    assert_eq!(h.fetcher.calls(&h.url(1, 4)), 1);
    assert_eq!(h.fetcher.calls(&h.url(1, 5)), 1);
}

#[tokio::test]
async fn test_pause_pending_item_and_unknown_ids() {
    let h = Harness::new(NetworkStatus::offline(), default_settings()).await;
    let progress = Arc::new(Mutex::new(Vec::new()));
    let _sub = h.service.on_progress(record(&progress));

    let id = h.service.enqueue_resource(4, VARIANT).await.unwrap();
    h.service.pause(&id).await.unwrap();
    assert_eq!(h.item(&id).unwrap().status, DownloadStatus::Paused);
    assert_eq!(progress.lock().last().unwrap().status, DownloadStatus::Paused);

    h.service.resume(&id).await.unwrap();
    assert_eq!(h.item(&id).unwrap().status, DownloadStatus::Pending);

    assert!(matches!(h.service.pause("surah-nobody-001").await, Err(CoreError::RecordNotFound(_))));
    assert!(matches!(h.service.resume("surah-nobody-001").await, Err(CoreError::RecordNotFound(_))));
    assert!(matches!(h.service.cancel("surah-nobody-001").await, Err(CoreError::RecordNotFound(_))));
}

#[tokio::test]
async fn test_part_failure_exhausts_retries_then_resumes() {
    let h = Harness::new(NetworkStatus::wifi(), default_settings()).await;
    let errors = Arc::new(Mutex::new(Vec::new()));
    let _sub = h.service.on_error(record(&errors));
    h.fetcher.fail(&h.url(1, 3), 3);

    let id = h.service.enqueue_resource(1, VARIANT).await.unwrap();
    wait_for(|| h.item(&id).map(|i| i.status) == Some(DownloadStatus::Failed)).await;

    let failed = h.item(&id).unwrap();
    assert_eq!(failed.parts_completed, 2);
    assert!(failed.error.is_some());
    assert_eq!(h.fetcher.calls(&h.url(1, 3)), 3);
    assert_eq!(h.fetcher.calls(&h.url(1, 4)), 0);
    assert_eq!(errors.lock().len(), 1);
    assert!(!h.service.is_downloaded(1, VARIANT));

    h.service.resume(&id).await.unwrap();
    wait_for(|| h.service.is_downloaded(1, VARIANT)).await;

    assert_eq!(h.fetcher.calls(&h.url(1, 1)), 1);
    assert_eq!(h.fetcher.calls(&h.url(1, 2)), 1);
    assert_eq!(h.fetcher.calls(&h.url(1, 3)), 4);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let h = Harness::new(NetworkStatus::wifi(), default_settings()).await;
    h.fetcher.fail(&h.url(2, 1), 2);

    h.service.enqueue_resource(2, VARIANT).await.unwrap();
    wait_for(|| h.service.is_downloaded(2, VARIANT)).await;
    assert_eq!(h.fetcher.calls(&h.url(2, 1)), 3);
}

#[tokio::test]
async fn test_cancel_mid_download_removes_everything() {
    let h = Harness::new(NetworkStatus::wifi(), default_settings()).await;
    let completed = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let _complete = h.service.on_complete(record(&completed));
    let _error = h.service.on_error(record(&errors));
    h.fetcher.hold(&h.url(1, 3));

    let id = h.service.enqueue_resource(1, VARIANT).await.unwrap();
    h.fetcher.reached.notified().await;
    assert!(h.part_path(1, 2).exists());

    h.service.cancel(&id).await.unwrap();

    assert!(h.item(&id).is_none());
    assert!(!h.service.is_downloaded(1, VARIANT));
    for part in 1..=PARTS {
        assert!(!h.part_path(1, part).exists());
    }
    assert!(!h.audio().join(VARIANT).exists());
    assert!(completed.lock().is_empty());
    assert!(errors.lock().is_empty());

    h.service.wait_until_idle().await;
    assert!(completed.lock().is_empty());
}

#[tokio::test]
async fn test_cancel_all_clears_variant_queue() {
    let h = Harness::new(NetworkStatus::offline(), default_settings()).await;

    let added = h.service.enqueue_all(VARIANT).await.unwrap();
    assert_eq!(added.len(), 4);
    assert!(h.service.enqueue_all(VARIANT).await.unwrap().is_empty());

    assert_eq!(h.service.cancel_all(VARIANT).await.unwrap(), 4);
    assert!(h.service.queue_snapshot().is_empty());
}

#[tokio::test]
async fn test_cancel_all_stops_active_downloads() {
    let h = Harness::with_fetcher(
        NetworkStatus::wifi(),
        default_settings(),
        ScriptedFetcher::with_delay(Duration::from_secs(30)),
    )
    .await;
    let completed = Arc::new(Mutex::new(Vec::new()));
    let _sub = h.service.on_complete(record(&completed));

    h.service.enqueue_all(VARIANT).await.unwrap();
    wait_for(|| h.fetcher.in_flight.load(Ordering::SeqCst) == 2).await;

    assert_eq!(h.service.cancel_all(VARIANT).await.unwrap(), 4);
    assert!(h.service.queue_snapshot().is_empty());
    assert!(h.service.downloaded_resources(VARIANT).is_empty());
    assert!(!h.audio().join(VARIANT).exists());
    assert!(completed.lock().is_empty());
    assert_eq!(h.fetcher.total_calls(), 2);

    // The processor is usable again once cancel_all returns
    let id = h.service.enqueue_resource(3, VARIANT).await.unwrap();
    wait_for(|| h.fetcher.calls(&h.url(3, 1)) == 1).await;
    assert_eq!(h.item(&id).unwrap().status, DownloadStatus::Downloading);
}

#[tokio::test]
async fn test_cancel_after_settled_run_removes_item() {
    let h = Harness::new(NetworkStatus::wifi(), default_settings()).await;
    let first = h.fetcher.gate(&h.url(1, 3));
    let second = h.fetcher.gate(&h.url(2, 1));

    // Surahs 1 and 2 share one batch
    h.service.enqueue_all(VARIANT).await.unwrap();
    wait_for(|| h.fetcher.calls(&h.url(1, 3)) == 1 && h.fetcher.calls(&h.url(2, 1)) == 1).await;

    let id = "surah-Alafasy_128kbps-001";
    h.service.pause(id).await.unwrap();
    first.notify_one();
    wait_for(|| h.item(id).map(|i| i.status) == Some(DownloadStatus::Paused)).await;

    // Back to pending while surah 2 still holds the batch
    h.service.resume(id).await.unwrap();
    assert_eq!(h.item(id).unwrap().status, DownloadStatus::Pending);

    h.service.cancel(id).await.unwrap();
    assert!(h.item(id).is_none());
    for part in 1..=PARTS {
        assert!(!h.part_path(1, part).exists());
    }

    second.notify_one();
    wait_for(|| h.service.downloaded_resources(VARIANT) == vec![2, 3, 4]).await;
    h.service.wait_until_idle().await;

    assert!(!h.service.is_downloaded(1, VARIANT));
    assert_eq!(h.fetcher.calls(&h.url(1, 4)), 0);
    assert!(!h.part_path(1, 1).exists());
}

#[tokio::test]
async fn test_settings_change_restarts_pending_items() {
    let settings = DownloadSettings { wifi_only_downloads: true, ..Default::default() };
    let h = Harness::new(NetworkStatus::cellular(), settings).await;

    let id = h.service.enqueue_resource(2, VARIANT).await.unwrap();
    h.service.wait_until_idle().await;
    assert_eq!(h.item(&id).unwrap().status, DownloadStatus::Pending);

    h.network.set_settings(DownloadSettings { wifi_only_downloads: false, ..settings });
    h.service.settings_changed();
    wait_for(|| h.service.is_downloaded(2, VARIANT)).await;
    assert_eq!(h.fetcher.total_calls(), PARTS);
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let h = Harness::with_fetcher(
        NetworkStatus::wifi(),
        default_settings(),
        ScriptedFetcher::with_delay(Duration::from_millis(5)),
    )
    .await;

    h.service.enqueue_all(VARIANT).await.unwrap();
    wait_for(|| h.service.downloaded_resources(VARIANT).len() == 4).await;

    assert_eq!(h.fetcher.max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(h.fetcher.total_calls(), 4 * PARTS);
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let h = Harness::new(NetworkStatus::wifi(), default_settings()).await;
    let progress = Arc::new(Mutex::new(Vec::new()));
    let _sub = h.service.on_progress(record(&progress));

    h.service.enqueue_resource(1, VARIANT).await.unwrap();
    h.service.enqueue_resource(2, VARIANT).await.unwrap();
    wait_for(|| h.service.downloaded_resources(VARIANT).len() == 2).await;

    let events = progress.lock();
    for resource_id in [1, 2] {
        let seen: Vec<_> = events.iter().filter(|p| p.resource_id == resource_id).collect();
        assert!(!seen.is_empty());
        for pair in seen.windows(2) {
            assert!(pair[0].progress <= pair[1].progress);
            assert!(pair[0].parts_completed <= pair[1].parts_completed);
        }
        assert_eq!(seen.last().unwrap().parts_completed, PARTS);
    }
}

#[tokio::test]
async fn test_unsubscribed_listener_stops_receiving() {
    let h = Harness::new(NetworkStatus::wifi(), default_settings()).await;
    let completed = Arc::new(Mutex::new(Vec::new()));
    let sub = h.service.on_complete(record(&completed));
    sub.unsubscribe();

    h.service.enqueue_resource(1, VARIANT).await.unwrap();
    wait_for(|| h.service.is_downloaded(1, VARIANT)).await;
    assert!(completed.lock().is_empty());
}

#[tokio::test]
async fn test_restore_resumes_persisted_queue() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryKeyValueStore::new());
    let fetcher = Arc::new(ScriptedFetcher::default());

    {
        let network = Arc::new(WatchedNetworkPolicy::new(NetworkStatus::offline(), default_settings()));
        let first = build_service(dir.path(), store.clone(), network, fetcher.clone());
        first.start().await.unwrap();
        first.enqueue_resource(1, VARIANT).await.unwrap();
        let paused = first.enqueue_resource(2, VARIANT).await.unwrap();
        first.pause(&paused).await.unwrap();
    }

    let network = Arc::new(WatchedNetworkPolicy::new(NetworkStatus::wifi(), default_settings()));
    let second = build_service(dir.path(), store, network, fetcher.clone());
    assert!(second.queue_snapshot().is_empty());
    second.start().await.unwrap();
    assert_eq!(second.queue_snapshot().len(), 2);

    wait_for(|| second.is_downloaded(1, VARIANT)).await;
    second.wait_until_idle().await;

    let remaining = second.queue_snapshot();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].resource_id, 2);
    assert_eq!(remaining[0].status, DownloadStatus::Paused);
}

#[tokio::test]
async fn test_delete_and_verify_downloads() {
    let h = Harness::new(NetworkStatus::wifi(), default_settings()).await;

    h.service.enqueue_resource(1, VARIANT).await.unwrap();
    h.service.enqueue_resource(2, VARIANT).await.unwrap();
    wait_for(|| h.service.downloaded_resources(VARIANT).len() == 2).await;

    h.service.delete_resource(1, VARIANT).await.unwrap();
    assert!(!h.service.is_downloaded(1, VARIANT));
    assert!(!h.part_path(1, 1).exists());
    assert_eq!(h.service.storage_used(VARIANT), PARTS as u64 * PART_BYTES.len() as u64);

    std::fs::remove_file(h.part_path(2, 4)).unwrap();
    assert_eq!(h.service.verify_downloads(VARIANT).await.unwrap(), vec![2]);
    assert!(h.service.downloaded_resources(VARIANT).is_empty());
    assert_eq!(h.service.storage_used(VARIANT), 0);

    h.service.delete_all_for_variant(VARIANT).await.unwrap();
    assert!(!h.audio().join(VARIANT).exists());
}

#[tokio::test]
async fn test_verify_keeps_bytes_of_concurrent_completion() {
    let dir = TempDir::new().unwrap();
    let audio = dir.path().join("audio");
    let files = Arc::new(GatedFiles::new(audio.clone()));
    let network = Arc::new(WatchedNetworkPolicy::new(NetworkStatus::wifi(), default_settings()));
    let service = build_service_with_files(
        dir.path(),
        Arc::new(MemoryKeyValueStore::new()),
        network,
        Arc::new(ScriptedFetcher::default()),
        files.clone(),
    );
    service.start().await.unwrap();
    let surah_bytes = PARTS as u64 * PART_BYTES.len() as u64;

    service.enqueue_resource(1, VARIANT).await.unwrap();
    wait_for(|| service.is_downloaded(1, VARIANT)).await;

    *files.gate.lock() = Some(audio.join(VARIANT).join(part_file_name(1, 1)));
    let verify = tokio::spawn({
        let service = service.clone();
        async move { service.verify_downloads(VARIANT).await }
    });
    files.reached.notified().await;

    // Completes while verify is suspended on its first check
    service.enqueue_resource(2, VARIANT).await.unwrap();
    wait_for(|| service.is_downloaded(2, VARIANT)).await;
    assert_eq!(service.storage_used(VARIANT), 2 * surah_bytes);

    files.release.notify_one();
    let dropped = verify.await.unwrap().unwrap();

    assert!(dropped.is_empty());
    assert_eq!(service.downloaded_resources(VARIANT), vec![1, 2]);
    assert_eq!(service.storage_used(VARIANT), 2 * surah_bytes);
}
