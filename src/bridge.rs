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


//! JSON bridge between the app and the download service
//!
//! Every command takes a JSON string and returns a JSON string. The platform
//! layers (`jni_bridge` on Android, `ios_bridge` on iOS) only convert
//! strings and call in here, so the whole surface is testable on the host.
//!
//! # Architecture
//! JavaScript (React Native) → Kotlin/Swift (ExpoRustBridgeModule) → JNI/C FFI → bridge
//!
//! # Design Patterns
//! 1. **JSON Communication**: all data crosses the FFI boundary as JSON
//! 2. **Error Handling**: errors come back as JSON error responses
//! 3. **Async Runtime**: one lazily created Tokio runtime drives every service
//! 4. **No Panics**: panics are caught before they reach the FFI boundary
//!
//! # Response Format
//! ```json
//! { "success": true, "data": { ... } }
//! ```
//! Or on error:
//! ```json
//! { "success": false, "error": "Error message" }
//! ```
//!
//! Every command names the database it works on (`db_path`). One service
//! is kept per database; `init` creates it and later commands look it up.

use crate::download::{
    Collaborators, ConnectionType, DownloadConfig, DownloadService, DownloadSettings, NetworkStatus,
    WatchedNetworkPolicy,
};
use crate::error::{CoreError, Result};
use crate::storage::{Database, SqliteKeyValueStore};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

struct ServiceEntry {
    service: DownloadService,
    network: Arc<WatchedNetworkPolicy>,
}

lazy_static::lazy_static! {
    // Lazy tokio runtime shared by every service
    static ref RUNTIME: std::io::Result<tokio::runtime::Runtime> =
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("quran-audio")
            .build();

    // db_path -> service instance
    static ref SERVICES: Mutex<HashMap<String, Arc<ServiceEntry>>> = Mutex::new(HashMap::new());
}

fn runtime() -> Result<&'static tokio::runtime::Runtime> {
    RUNTIME
        .as_ref()
        .map_err(|e| CoreError::internal(format!("Failed to create Tokio runtime: {}", e)))
}

fn service(db_path: &str) -> Result<Arc<ServiceEntry>> {
    SERVICES.lock().get(db_path).cloned().ok_or_else(|| {
        CoreError::InvalidState(format!("Download service not initialized for {}", db_path))
    })
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Convert Rust result to JSON response string
pub fn result_to_json<T: Serialize>(result: Result<T>) -> String {
    match result {
        Ok(data) => success_response(data),
        Err(e) => error_response(&e.to_string()),
    }
}

/// Create success response JSON
pub fn success_response<T: Serialize>(data: T) -> String {
    serde_json::json!({
        "success": true,
        "data": data
    })
    .to_string()
}

/// Create error response JSON
pub fn error_response(error: &str) -> String {
    serde_json::json!({
        "success": false,
        "error": error
    })
    .to_string()
}

/// Wrap a function call with panic catching
pub fn catch_panic<F>(f: F) -> String
where
    F: FnOnce() -> String,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic_err) => {
            let panic_msg = if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic occurred".to_string()
            };
            tracing::error!(panic = %panic_msg, "panic caught at bridge boundary");
            error_response(&format!("Rust panic: {}", panic_msg))
        }
    }
}

fn parse_params<P: DeserializeOwned>(params_json: &str) -> Result<P> {
    serde_json::from_str(params_json)
        .map_err(|e| CoreError::invalid_input(format!("Invalid JSON: {}", e)))
}

/// Parse params, run the command and wrap the result
fn handle<P, T, F>(params_json: &str, command: F) -> String
where
    P: DeserializeOwned,
    T: Serialize,
    F: FnOnce(P) -> Result<T>,
{
    catch_panic(move || result_to_json(parse_params(params_json).and_then(command)))
}

/// Run an async command against an initialized service
fn with_service<T, F, Fut>(db_path: &str, command: F) -> Result<T>
where
    F: FnOnce(Arc<ServiceEntry>) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let entry = service(db_path)?;
    runtime()?.block_on(command(entry))
}

// ============================================================================
// PARAMETERS
// ============================================================================

#[derive(Deserialize)]
struct DbParams {
    db_path: String,
}

#[derive(Deserialize)]
struct ItemParams {
    db_path: String,
    id: String,
}

#[derive(Deserialize)]
struct VariantParams {
    db_path: String,
    variant: String,
}

#[derive(Deserialize)]
struct ResourceParams {
    db_path: String,
    resource_id: u32,
    variant: String,
}

#[derive(Deserialize)]
struct InitParams {
    db_path: String,
    #[serde(flatten)]
    config: DownloadConfig,
    #[serde(default)]
    settings: DownloadSettings,
    #[serde(default)]
    network: Option<NetworkStatus>,
}

#[derive(Deserialize)]
struct NetworkParams {
    db_path: String,
    online: bool,
    connection: ConnectionType,
}

#[derive(Deserialize)]
struct SettingsParams {
    db_path: String,
    #[serde(flatten)]
    settings: DownloadSettings,
}

// ============================================================================
// COMMANDS
// ============================================================================

/// Open the database and start the download service
///
/// # Arguments (JSON string)
/// ```json
/// {
///   "db_path": "/data/data/.../downloads.db",
///   "audio_directory": "/data/data/.../audio",
///   "base_url": "https://everyayah.com/data/",
///   "settings": { "max_concurrent_downloads": 2, "wifi_only_downloads": false },
///   "network": { "online": true, "connection": "wifi" }
/// }
/// ```
/// Everything but `db_path` and `audio_directory` is optional. Calling
/// `init` again for the same database returns the running service.
pub fn init(params_json: &str) -> String {
    handle(params_json, |params: InitParams| {
        let InitParams { db_path, config, settings, network } = params;
        if SERVICES.lock().contains_key(&db_path) {
            return Ok(serde_json::json!({ "initialized": true, "restored": false }));
        }

        let entry = runtime()?.block_on(async {
            let db = Database::new(&db_path).await?;
            let network = Arc::new(WatchedNetworkPolicy::new(
                network.unwrap_or_else(NetworkStatus::offline),
                settings,
            ));
            let collaborators = Collaborators::local(
                &config,
                Arc::new(SqliteKeyValueStore::new(db)),
                network.clone(),
            )?;
            let service = DownloadService::new(config, collaborators);
            service.start().await?;
            Ok::<_, CoreError>(ServiceEntry { service, network })
        })?;

        // Another caller may have won the race; keep the first service
        let mut services = SERVICES.lock();
        services.entry(db_path).or_insert_with(|| Arc::new(entry));
        Ok(serde_json::json!({ "initialized": true, "restored": true }))
    })
}

/// Push a connectivity change from the platform
pub fn set_network_status(params_json: &str) -> String {
    handle(params_json, |params: NetworkParams| {
        let entry = service(&params.db_path)?;
        entry.network.set_status(NetworkStatus {
            online: params.online,
            connection: params.connection,
        });
        Ok(serde_json::json!({ "updated": true }))
    })
}

/// Replace the user's download preferences
pub fn update_settings(params_json: &str) -> String {
    handle(params_json, |SettingsParams { db_path, settings }: SettingsParams| {
        with_service(&db_path, |entry| async move {
            entry.network.set_settings(settings);
            entry.service.settings_changed();
            Ok(settings)
        })
    })
}

pub fn enqueue(params_json: &str) -> String {
    handle(params_json, |ResourceParams { db_path, resource_id, variant }: ResourceParams| {
        let id = with_service(&db_path, |entry| async move {
            entry.service.enqueue_resource(resource_id, &variant).await
        })?;
        Ok(serde_json::json!({ "id": id }))
    })
}

pub fn enqueue_all(params_json: &str) -> String {
    handle(params_json, |VariantParams { db_path, variant }: VariantParams| {
        let added = with_service(&db_path, |entry| async move {
            entry.service.enqueue_all(&variant).await
        })?;
        Ok(serde_json::json!({ "added": added }))
    })
}

pub fn pause(params_json: &str) -> String {
    handle(params_json, |ItemParams { db_path, id }: ItemParams| {
        with_service(&db_path, |entry| async move { entry.service.pause(&id).await })?;
        Ok(serde_json::json!({ "paused": true }))
    })
}

pub fn resume(params_json: &str) -> String {
    handle(params_json, |ItemParams { db_path, id }: ItemParams| {
        with_service(&db_path, |entry| async move { entry.service.resume(&id).await })?;
        Ok(serde_json::json!({ "resumed": true }))
    })
}

pub fn cancel(params_json: &str) -> String {
    handle(params_json, |ItemParams { db_path, id }: ItemParams| {
        with_service(&db_path, |entry| async move { entry.service.cancel(&id).await })?;
        Ok(serde_json::json!({ "cancelled": true }))
    })
}

pub fn cancel_all(params_json: &str) -> String {
    handle(params_json, |VariantParams { db_path, variant }: VariantParams| {
        let cancelled = with_service(&db_path, |entry| async move {
            entry.service.cancel_all(&variant).await
        })?;
        Ok(serde_json::json!({ "cancelled": cancelled }))
    })
}

/// Current queue, each item with a display string for the UI
pub fn queue_snapshot(params_json: &str) -> String {
    handle(params_json, |params: DbParams| {
        let entry = service(&params.db_path)?;
        let items: Vec<serde_json::Value> = entry
            .service
            .queue_snapshot()
            .iter()
            .map(|item| -> Result<serde_json::Value> {
                let display = crate::download::DownloadProgress::from(item).display_string();
                let mut value = serde_json::to_value(item)?;
                value["display"] = serde_json::Value::String(display);
                value["active"] = serde_json::Value::Bool(item.is_active());
                Ok(value)
            })
            .collect::<Result<_>>()?;
        Ok(serde_json::json!({ "items": items }))
    })
}

pub fn is_downloaded(params_json: &str) -> String {
    handle(params_json, |params: ResourceParams| {
        let entry = service(&params.db_path)?;
        let downloaded = entry.service.is_downloaded(params.resource_id, &params.variant);
        Ok(serde_json::json!({ "downloaded": downloaded }))
    })
}

pub fn downloaded_resources(params_json: &str) -> String {
    handle(params_json, |params: VariantParams| {
        let entry = service(&params.db_path)?;
        Ok(serde_json::json!({
            "resource_ids": entry.service.downloaded_resources(&params.variant),
            "total_bytes": entry.service.storage_used(&params.variant),
        }))
    })
}

pub fn delete_resource(params_json: &str) -> String {
    handle(params_json, |ResourceParams { db_path, resource_id, variant }: ResourceParams| {
        with_service(&db_path, |entry| async move {
            entry.service.delete_resource(resource_id, &variant).await
        })?;
        Ok(serde_json::json!({ "deleted": true }))
    })
}

pub fn delete_all_for_variant(params_json: &str) -> String {
    handle(params_json, |VariantParams { db_path, variant }: VariantParams| {
        with_service(&db_path, |entry| async move {
            entry.service.delete_all_for_variant(&variant).await
        })?;
        Ok(serde_json::json!({ "deleted": true }))
    })
}

pub fn verify_downloads(params_json: &str) -> String {
    handle(params_json, |VariantParams { db_path, variant }: VariantParams| {
        let dropped = with_service(&db_path, |entry| async move {
            entry.service.verify_downloads(&variant).await
        })?;
        Ok(serde_json::json!({ "dropped": dropped }))
    })
}

// ============================================================================
// TESTS
// ============================================================================
