//! C ABI exported to the plugin host.
//!
//! The host loads the library, calls `plugin_init` once to obtain an opaque
//! state pointer, and then calls `plugin_extract_str` for every field of every
//! event. Strings returned by this module are owned by the library: static
//! ones live for the whole process, the others live inside the state and stay
//! valid until the next call on that state.

use crate::error::JevtError;
use crate::extractor::config::ExtractorConfig;
use crate::extractor::ExtractionContext;
use crate::fields::fields_json;
use once_cell::sync::Lazy;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;
use tracing::debug;

pub const PLUGIN_ID: u32 = 3;
pub const PLUGIN_NAME: &str = "jevt";
pub const PLUGIN_DESCRIPTION: &str = "implements extracting arbitrary fields from inputs formatted as JSON";
pub const REQUIRED_API_VERSION: &str = "1.0.0";

pub const TYPE_EXTRACTOR_PLUGIN: u32 = 2;

pub const SCAP_SUCCESS: i32 = 0;
pub const SCAP_FAILURE: i32 = 1;

const NO_ERROR: &str = "no error";

static NAME_C: Lazy<CString> = Lazy::new(|| to_c_string(PLUGIN_NAME));
static DESCRIPTION_C: Lazy<CString> = Lazy::new(|| to_c_string(PLUGIN_DESCRIPTION));
static API_VERSION_C: Lazy<CString> = Lazy::new(|| to_c_string(REQUIRED_API_VERSION));
static FIELDS_C: Lazy<CString> = Lazy::new(|| match fields_json() {
    Ok(json) => to_c_string(&json),
    Err(err) => to_c_string(&format!("[] /* {} */", err)),
});

/// Convert to a C string, dropping interior NULs rather than failing.
fn to_c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

/// Per-instance state behind the opaque pointer handed to the host.
pub struct PluginState {
    context: ExtractionContext,
    /// Backing storage for the string returned by `plugin_get_last_error`.
    last_error: CString,
}

impl PluginState {
    pub fn new(config: ExtractorConfig) -> Result<Self, JevtError> {
        Ok(PluginState {
            context: ExtractionContext::new(config)?,
            last_error: to_c_string(NO_ERROR),
        })
    }
}

/// Borrow a C string argument as UTF-8 text, replacing invalid sequences.
///
/// # Safety
///
/// `s` must be NULL or a valid NUL-terminated string.
unsafe fn arg_str<'a>(s: *const c_char) -> Option<std::borrow::Cow<'a, str>> {
    if s.is_null() {
        return None;
    }
    // SAFETY: the caller guarantees a valid NUL-terminated string
    Some(unsafe { CStr::from_ptr(s) }.to_string_lossy())
}

#[no_mangle]
pub extern "C" fn plugin_get_type() -> u32 {
    TYPE_EXTRACTOR_PLUGIN
}

/// Create the plugin state.
///
/// The configuration string is logged but not interpreted.
///
/// # Safety
///
/// - `config` must be NULL or a valid NUL-terminated string
/// - `rc` must be NULL or point to writable memory
/// - The returned pointer must be released with `plugin_destroy`
#[no_mangle]
pub unsafe extern "C" fn plugin_init(config: *const c_char, rc: *mut i32) -> *mut c_void {
    // SAFETY: forwarded from this function's contract
    let raw_config = unsafe { arg_str(config) };
    debug!(
        plugin = PLUGIN_NAME,
        config = raw_config.as_deref().unwrap_or(""),
        "plugin_init"
    );

    let (state, code) = match PluginState::new(ExtractorConfig::default()) {
        Ok(state) => (Box::into_raw(Box::new(state)) as *mut c_void, SCAP_SUCCESS),
        Err(err) => {
            debug!(plugin = PLUGIN_NAME, error = %err, "plugin_init failed");
            (ptr::null_mut(), SCAP_FAILURE)
        }
    };

    if !rc.is_null() {
        // SAFETY: rc is non-null and writable per the contract
        unsafe { *rc = code };
    }
    state
}

/// Release the plugin state.
///
/// # Safety
///
/// `state` must be NULL or a pointer returned by `plugin_init` that has not
/// been destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn plugin_destroy(state: *mut c_void) {
    debug!(plugin = PLUGIN_NAME, "plugin_destroy");
    if !state.is_null() {
        // SAFETY: state came from Box::into_raw in plugin_init
        drop(unsafe { Box::from_raw(state as *mut PluginState) });
    }
}

/// Text of the most recent failure, or "no error".
///
/// The returned string is owned by the state and valid until the next call
/// on it.
///
/// # Safety
///
/// `state` must be NULL or a live pointer returned by `plugin_init`.
#[no_mangle]
pub unsafe extern "C" fn plugin_get_last_error(state: *mut c_void) -> *const c_char {
    if state.is_null() {
        return ptr::null();
    }
    // SAFETY: state is a live PluginState per the contract
    let state = unsafe { &mut *(state as *mut PluginState) };
    state.last_error = to_c_string(state.context.last_error().unwrap_or(NO_ERROR));
    state.last_error.as_ptr()
}

#[no_mangle]
pub extern "C" fn plugin_get_id() -> u32 {
    PLUGIN_ID
}

#[no_mangle]
pub extern "C" fn plugin_get_name() -> *const c_char {
    NAME_C.as_ptr()
}

#[no_mangle]
pub extern "C" fn plugin_get_description() -> *const c_char {
    DESCRIPTION_C.as_ptr()
}

#[no_mangle]
pub extern "C" fn plugin_get_required_api_version() -> *const c_char {
    API_VERSION_C.as_ptr()
}

/// Field schema as a JSON array.
#[no_mangle]
pub extern "C" fn plugin_get_fields() -> *const c_char {
    FIELDS_C.as_ptr()
}

/// Extract one field of one event.
///
/// Returns the address of the NUL-terminated value inside the state's output
/// buffer, or NULL when the field is not present for this event. The value
/// is overwritten by the next call on the same state.
///
/// # Safety
///
/// - `state` must be a live pointer returned by `plugin_init`, not used
///   concurrently from another thread
/// - `arg` must be NULL or a valid NUL-terminated string
/// - `data` must be NULL or point to at least `datalen` readable bytes
#[no_mangle]
pub unsafe extern "C" fn plugin_extract_str(
    state: *mut c_void,
    evtnum: u64,
    id: u32,
    arg: *const c_char,
    data: *const u8,
    datalen: u32,
) -> *const c_char {
    if state.is_null() {
        return ptr::null();
    }
    // SAFETY: state is a live PluginState per the contract
    let state = unsafe { &mut *(state as *mut PluginState) };
    // SAFETY: forwarded from this function's contract
    let arg = unsafe { arg_str(arg) };
    let raw: &[u8] = if data.is_null() {
        &[]
    } else {
        // SAFETY: data points to datalen readable bytes per the contract
        unsafe { std::slice::from_raw_parts(data, datalen as usize) }
    };

    match state.context.extract(evtnum, id, arg.as_deref(), raw) {
        Some(handle) => handle.as_ptr(),
        None => ptr::null(),
    }
}
