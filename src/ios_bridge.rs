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


//! C FFI bridge for iOS
//!
//! Thin wrappers around `bridge` taking and returning C strings.
//!
//! # Architecture
//! JavaScript (React Native) → Swift (ExpoRustBridgeModule) → C FFI → bridge
//!
//! # Memory Management
//! Every returned string is allocated by Rust and MUST be freed by the
//! caller using `rust_free_string()`.
//!
//! ```swift
//! let resultPtr = rust_enqueue_download(params)
//! defer { rust_free_string(resultPtr) }
//! let jsonString = String(cString: resultPtr)
//! ```

use crate::bridge::{catch_panic, error_response};
use crate::error::{CoreError, Result};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Convert C string to Rust String
fn c_str_to_string(ptr: *const c_char) -> Result<String> {
    if ptr.is_null() {
        return Err(CoreError::invalid_input("Null pointer received"));
    }
    // SAFETY: the caller passes a valid NUL-terminated string
    unsafe {
        CStr::from_ptr(ptr)
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| CoreError::invalid_input(format!("Invalid UTF-8: {}", e)))
    }
}

/// Convert Rust string to C string pointer
///
/// Caller MUST free the returned pointer using `rust_free_string()`
fn string_to_c_str(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c_string) => c_string.into_raw(),
        // JSON escapes control characters, so the error response has no NUL
        Err(_) => CString::new(error_response("String contains null bytes"))
            .map(CString::into_raw)
            .unwrap_or(std::ptr::null_mut()),
    }
}

fn call(params_json: *const c_char, command: fn(&str) -> String) -> *mut c_char {
    let response = match c_str_to_string(params_json) {
        Ok(params) => catch_panic(|| command(&params)),
        Err(e) => error_response(&e.to_string()),
    };
    string_to_c_str(response)
}

macro_rules! ffi_commands {
    ($($name:ident => $command:path),* $(,)?) => {
        $(
            #[no_mangle]
            pub extern "C" fn $name(params_json: *const c_char) -> *mut c_char {
                call(params_json, $command)
            }
        )*
    };
}

ffi_commands! {
    rust_init_downloads => crate::bridge::init,
    rust_set_network_status => crate::bridge::set_network_status,
    rust_update_download_settings => crate::bridge::update_settings,
    rust_enqueue_download => crate::bridge::enqueue,
    rust_enqueue_all_downloads => crate::bridge::enqueue_all,
    rust_pause_download => crate::bridge::pause,
    rust_resume_download => crate::bridge::resume,
    rust_cancel_download => crate::bridge::cancel,
    rust_cancel_all_downloads => crate::bridge::cancel_all,
    rust_get_download_queue => crate::bridge::queue_snapshot,
    rust_is_downloaded => crate::bridge::is_downloaded,
    rust_get_downloaded_resources => crate::bridge::downloaded_resources,
    rust_delete_resource => crate::bridge::delete_resource,
    rust_delete_variant => crate::bridge::delete_all_for_variant,
    rust_verify_downloads => crate::bridge::verify_downloads,
}

/// Free a string previously returned by this module
///
/// Calling it twice on the same pointer is a double free. Null is ignored.
#[no_mangle]
pub extern "C" fn rust_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        // SAFETY: ptr came from CString::into_raw in string_to_c_str
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_pointer_is_rejected() {
        let ptr = rust_pause_download(std::ptr::null());
        let response = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        assert!(response.contains("Null pointer received"));
        rust_free_string(ptr);
    }

    #[test]
    fn test_free_null_is_safe() {
        rust_free_string(std::ptr::null_mut());
    }
}
