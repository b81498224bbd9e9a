//! # cactus-ffi
//!
//! C ABI bindings for cactus telemetry.
//!
//! Every function forwards to the process-wide API in `cactus_telemetry`;
//! this crate only converts C strings and stores errors for
//! `cactus_telemetry_last_error()`.
//!
//! ## Usage
//!
//! ```sh
//! cargo build -p cactus-ffi --release
//! ```
//!
//! Include the generated header (`include/cactus_telemetry.h`):
//!
//! ```c
//! cactus_set_telemetry_environment("cpp", "/tmp/cactus");
//! cactus_set_telemetry_cloud_disabled(true);
//! if (cactus_telemetry_init("my-project", "chat", NULL) != 0) {
//!     fprintf(stderr, "telemetry: %s\n", cactus_telemetry_last_error());
//! }
//! cactus_telemetry_record_completion("qwen3-0.6b", true, 42.0, 18.5, 900.0, 64, "ok");
//! cactus_telemetry_flush();
//! cactus_telemetry_shutdown();
//! ```

#![allow(clippy::missing_safety_doc)]

use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Thread-Local Error Storage
// ============================================================================

thread_local! {
    /// Last error raised on this thread by a `cactus_*` call.
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: &str) {
    log::warn!(target: "cactus_ffi", "{}", message);
    LAST_ERROR.with(|e| {
        // Interior NULs would make CString::new fail; keep the message readable.
        *e.borrow_mut() = CString::new(message.replace('\0', " ")).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Copy a C string, treating null as absent. Invalid UTF-8 is replaced.
unsafe fn optional_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// Copy a C string, treating null as empty.
unsafe fn str_or_empty(ptr: *const c_char) -> String {
    optional_str(ptr).unwrap_or_default()
}

// ============================================================================
// Environment
// ============================================================================

/// Set the framework name and cache directory used by the next
/// `cactus_telemetry_init`.
///
/// A null or empty `cache_location` selects the platform cache directory.
///
/// # Safety
///
/// Both pointers must be null or point to null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn cactus_set_telemetry_environment(
    framework: *const c_char,
    cache_location: *const c_char,
) {
    clear_last_error();
    let framework = optional_str(framework)
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| cactus_telemetry::DEFAULT_FRAMEWORK.to_string());
    let cache_location = optional_str(cache_location).map(PathBuf::from);
    cactus_telemetry::set_telemetry_environment(&framework, cache_location);
}

/// Enable or disable cloud upload for sessions started afterwards.
/// Local logging is unaffected.
#[no_mangle]
pub extern "C" fn cactus_set_telemetry_cloud_disabled(disabled: bool) {
    clear_last_error();
    cactus_telemetry::set_cloud_disabled(disabled);
}

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Start a telemetry session, replacing any active one.
///
/// `metadata` is an optional JSON (or plain text) blob stored with every event.
///
/// # Returns
///
/// - `0` on success
/// - `-1` on failure (check `cactus_telemetry_last_error()` for details)
///
/// # Safety
///
/// All pointers must be null or point to null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn cactus_telemetry_init(
    project: *const c_char,
    session: *const c_char,
    metadata: *const c_char,
) -> i32 {
    clear_last_error();
    let project = str_or_empty(project);
    let session = str_or_empty(session);
    let metadata = optional_str(metadata);

    match cactus_telemetry::init(&project, &session, metadata.as_deref()) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&format!("Failed to initialize telemetry: {}", e));
            -1
        }
    }
}

/// Record one completion event.
///
/// Dropped (with a warning log) when no session is active.
///
/// # Safety
///
/// `model` and `status` must be null or point to null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn cactus_telemetry_record_completion(
    model: *const c_char,
    success: bool,
    ttft_ms: f64,
    tokens_per_second: f64,
    total_time_ms: f64,
    tokens: i64,
    status: *const c_char,
) {
    clear_last_error();
    let model = str_or_empty(model);
    let status = str_or_empty(status);
    cactus_telemetry::record_completion(
        &model,
        success,
        ttft_ms,
        tokens_per_second,
        total_time_ms,
        tokens,
        &status,
    );
}

/// Write buffered events to `completion.log`.
///
/// Errors are reported through `cactus_telemetry_last_error()`.
#[no_mangle]
pub extern "C" fn cactus_telemetry_flush() {
    clear_last_error();
    if let Err(e) = cactus_telemetry::flush() {
        set_last_error(&format!("Failed to flush telemetry: {}", e));
    }
}

/// Flush and close the active session. Safe to call at any time.
#[no_mangle]
pub extern "C" fn cactus_telemetry_shutdown() {
    clear_last_error();
    if let Err(e) = cactus_telemetry::shutdown() {
        set_last_error(&format!("Failed to shut down telemetry: {}", e));
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Last error raised on the calling thread, or null.
///
/// The pointer stays valid until the next `cactus_*` call on the same thread
/// and must not be freed.
#[no_mangle]
pub extern "C" fn cactus_telemetry_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(message) => message.as_ptr(),
        None => std::ptr::null(),
    })
}

/// Library version as a static null-terminated string. Must not be freed.
#[no_mangle]
pub extern "C" fn cactus_telemetry_version() -> *const c_char {
    static VERSION_CSTRING: OnceLock<CString> = OnceLock::new();

    VERSION_CSTRING
        .get_or_init(|| CString::new(VERSION).unwrap_or_default())
        .as_ptr()
}
