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


//! JNI bridge for Android
//!
//! Thin wrappers around `bridge`: each takes the JSON parameters as a Java
//! string, forwards them and returns the JSON response.
//!
//! # Architecture
//! JavaScript (React Native) → Kotlin (ExpoRustBridgeModule) → JNI → bridge

use crate::bridge::{catch_panic, error_response};
use crate::error::{CoreError, Result};
use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;

/// Convert JString to Rust String
fn jstring_to_string(env: &mut JNIEnv, jstr: &JString) -> Result<String> {
    env.get_string(jstr)
        .map(|s| s.into())
        .map_err(|e| CoreError::invalid_input(format!("JNI string conversion failed: {}", e)))
}

/// Run a bridge command on a Java string and hand the response back to Java
///
/// Returns null only if the JVM cannot allocate the response string.
fn call(mut env: JNIEnv, params_json: JString, command: fn(&str) -> String) -> jstring {
    let response = match jstring_to_string(&mut env, &params_json) {
        Ok(params) => catch_panic(|| command(&params)),
        Err(e) => error_response(&e.to_string()),
    };

    match env.new_string(response) {
        Ok(output) => output.into_raw(),
        Err(e) => {
            tracing::error!(error = %e, "failed to create java string");
            std::ptr::null_mut()
        }
    }
}

macro_rules! jni_commands {
    ($($name:ident => $command:path),* $(,)?) => {
        $(
            #[no_mangle]
            pub extern "C" fn $name(env: JNIEnv, _class: JClass, params_json: JString) -> jstring {
                call(env, params_json, $command)
            }
        )*
    };
}

jni_commands! {
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeInitDownloads => crate::bridge::init,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeSetNetworkStatus => crate::bridge::set_network_status,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeUpdateDownloadSettings => crate::bridge::update_settings,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeEnqueueDownload => crate::bridge::enqueue,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeEnqueueAllDownloads => crate::bridge::enqueue_all,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativePauseDownload => crate::bridge::pause,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeResumeDownload => crate::bridge::resume,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeCancelDownload => crate::bridge::cancel,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeCancelAllDownloads => crate::bridge::cancel_all,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeGetDownloadQueue => crate::bridge::queue_snapshot,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeIsDownloaded => crate::bridge::is_downloaded,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeGetDownloadedResources => crate::bridge::downloaded_resources,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeDeleteResource => crate::bridge::delete_resource,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeDeleteVariant => crate::bridge::delete_all_for_variant,
    Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeVerifyDownloads => crate::bridge::verify_downloads,
}
