//! Offline recitation download core
//!
//! Native core of the mobile app's offline Quran audio. The app reaches it
//! through the JSON bridge (`bridge`), wrapped by JNI on Android and a C ABI
//! on iOS.

pub mod bridge;
pub mod download;
pub mod error;
pub mod file;
pub mod storage;

// JNI bridge for Android
#[cfg(target_os = "android")]
mod jni_bridge;

// C FFI bridge for iOS
#[cfg(target_os = "ios")]
mod ios_bridge;

pub use download::{DownloadConfig, DownloadService, DownloadSettings};
pub use error::{CoreError, Result};
