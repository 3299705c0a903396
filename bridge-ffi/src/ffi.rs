//! `extern "C"` surface.
//!
//! Conventions shared by every function here:
//!
//! - The last parameter is `char **err`. It is set to NULL on success and to a
//!   caller-owned message (free with [`free_string`]) on failure.
//! - On failure the primary result is zero-valued: [`BridgeValue::NULL`], an
//!   empty [`BridgeBuffer`], a null string or `0`. Always check `err` first.
//! - No panic crosses the boundary; a panic is reported as an internal error.
//! - The process-wide bridge is created by [`bridge_init`], or lazily by the
//!   first call (from `$UPLINK_BRIDGE_CONFIG`, else defaults).

use std::ffi::{c_char, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use bridge_net::MockNetwork;
use bridge_types::{
    snapshot, BridgeError, BucketConfig, Handle, ProjectOptions, Result, Snapshot, TypeTag,
    ValueEnvelope,
};

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::{free_c_string, into_c_string, ErrorChannel};
use crate::logging;

/// A handle-carrying value as seen from C.
///
/// `type_tag` is 0 and `handle.id` is 0 when the call failed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeValue {
    /// Registry handle.
    pub handle: Handle,
    /// `TypeTag` discriminant of the referenced object.
    pub type_tag: u32,
}

impl BridgeValue {
    /// The value returned on failure.
    pub const NULL: BridgeValue = BridgeValue {
        handle: Handle::INVALID,
        type_tag: 0,
    };
}

/// A byte buffer owned by the caller until passed to [`free_buffer`].
#[repr(C)]
#[derive(Debug)]
pub struct BridgeBuffer {
    /// Start of the bytes; null for the empty buffer.
    pub data: *mut u8,
    /// Number of bytes.
    pub len: usize,
}

impl BridgeBuffer {
    /// The buffer returned on failure.
    pub const EMPTY: BridgeBuffer = BridgeBuffer {
        data: std::ptr::null_mut(),
        len: 0,
    };

    fn from_vec(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            return Self::EMPTY;
        }
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        let data = Box::into_raw(boxed) as *mut u8;
        Self { data, len }
    }

    /// View the bytes.
    ///
    /// # Safety
    ///
    /// The buffer must come from this library and not have been freed.
    pub unsafe fn as_slice(&self) -> &[u8] {
        if self.data.is_null() {
            &[]
        } else {
            std::slice::from_raw_parts(self.data, self.len)
        }
    }
}

struct Global {
    bridge: Bridge,
    runtime: tokio::runtime::Runtime,
}

static GLOBAL: OnceLock<Global> = OnceLock::new();

fn build(config: BridgeConfig) -> Result<Global> {
    logging::init(&config.logging);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("uplink-bridge")
        .build()
        .map_err(|e| BridgeError::Internal(format!("failed to start runtime: {e}")))?;
    let bridge = Bridge::new(config, Arc::new(MockNetwork::new()));
    Ok(Global { bridge, runtime })
}

fn global() -> Result<&'static Global> {
    if let Some(global) = GLOBAL.get() {
        return Ok(global);
    }
    let global = build(BridgeConfig::from_env()?)?;
    if GLOBAL.set(global).is_ok() {
        tracing::info!("Bridge initialized lazily");
    }
    GLOBAL
        .get()
        .ok_or_else(|| BridgeError::Internal("bridge not initialized".to_string()))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Run `body`, reporting its error (or panic) through `err`.
fn guarded<R>(err: *mut *mut c_char, fallback: R, body: impl FnOnce() -> Result<R>) -> R {
    // SAFETY: every exported function documents `err` as null or writable.
    let channel = unsafe { ErrorChannel::new(err) };
    channel.clear();
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            channel.report(&e);
            fallback
        }
        Err(panic) => {
            let e = BridgeError::Internal(panic_message(panic.as_ref()));
            tracing::error!("{}", e);
            channel.report(&e);
            fallback
        }
    }
}

/// Like [`guarded`] for calls that produce an envelope.
fn guarded_value(
    err: *mut *mut c_char,
    body: impl FnOnce() -> Result<ValueEnvelope>,
) -> BridgeValue {
    guarded(err, BridgeValue::NULL, || match body()? {
        ValueEnvelope::Value { handle, tag } => Ok(BridgeValue {
            handle,
            type_tag: tag as u32,
        }),
        ValueEnvelope::Error { message } => {
            // SAFETY: as in `guarded`.
            unsafe { ErrorChannel::new(err) }.report_message(&message);
            Ok(BridgeValue::NULL)
        }
    })
}

unsafe fn read_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::ParseFailure(format!("{what} is null")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| BridgeError::ParseFailure(format!("{what} is not valid UTF-8")))
}

unsafe fn read_bytes<'a>(ptr: *const u8, len: usize) -> Result<&'a [u8]> {
    match (ptr.is_null(), len) {
        (_, 0) => Ok(&[]),
        (true, _) => Err(BridgeError::DecodingFailure(format!(
            "null buffer with length {len}"
        ))),
        (false, _) => Ok(std::slice::from_raw_parts(ptr, len)),
    }
}

/// Initialize the bridge from a TOML file, or defaults when `config_path` is
/// null. Fails if the bridge already exists.
///
/// # Safety
///
/// `config_path` must be null or a NUL-terminated string. `err` must be null
/// or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn bridge_init(config_path: *const c_char, err: *mut *mut c_char) -> bool {
    guarded(err, false, || {
        let config = if config_path.is_null() {
            BridgeConfig::default()
        } else {
            BridgeConfig::from_file(Path::new(read_str(config_path, "config path")?))?
        };
        let global = build(config)?;
        GLOBAL.set(global).map_err(|_| {
            BridgeError::InvalidConfig("bridge already initialized".to_string())
        })?;
        tracing::info!("Bridge initialized");
        Ok(true)
    })
}

/// Release every live handle. Returns how many were released.
#[no_mangle]
pub extern "C" fn bridge_shutdown() -> u64 {
    catch_unwind(|| GLOBAL.get().map_or(0, |g| g.bridge.shutdown() as u64)).unwrap_or(0)
}

/// Parse an API key and return a handle to it.
///
/// # Safety
///
/// `text` must be null or a NUL-terminated string. `err` must be null or
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn parse_api_key(text: *const c_char, err: *mut *mut c_char) -> BridgeValue {
    guarded_value(err, || {
        let text = read_str(text, "api key")?;
        Ok(global()?.bridge.parse_api_key(text))
    })
}

/// Canonical text form of an API key. Free the result with [`free_string`].
///
/// # Safety
///
/// `err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn serialize_api_key(handle: Handle, err: *mut *mut c_char) -> *mut c_char {
    guarded(err, std::ptr::null_mut(), || {
        let text = global()?.bridge.serialize_api_key(handle)?;
        Ok(into_c_string(&text))
    })
}

/// Look up an identity version by number.
///
/// # Safety
///
/// `err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn get_id_version(number: u32, err: *mut *mut c_char) -> BridgeValue {
    guarded_value(err, || Ok(global()?.bridge.get_id_version(number)))
}

/// Create an uplink client from an `UplinkConfig` handle.
///
/// # Safety
///
/// `err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn new_uplink(config: Handle, err: *mut *mut c_char) -> BridgeValue {
    guarded_value(err, || Ok(global()?.bridge.new_uplink(config)))
}

/// Open a project. `options` is a `ProjectOptions` snapshot; an empty buffer
/// means default options.
///
/// # Safety
///
/// `satellite` must be null or a NUL-terminated string. `options` must be
/// null or valid for `options_len` bytes. `err` must be null or valid for
/// writes.
#[no_mangle]
pub unsafe extern "C" fn open_project(
    uplink: Handle,
    satellite: *const c_char,
    api_key: Handle,
    options: *const u8,
    options_len: usize,
    err: *mut *mut c_char,
) -> BridgeValue {
    guarded_value(err, || {
        let satellite = read_str(satellite, "satellite address")?;
        let bytes = read_bytes(options, options_len)?;
        let options = if bytes.is_empty() {
            ProjectOptions::default()
        } else {
            snapshot::decode::<ProjectOptions>(bytes)?
        };
        let global = global()?;
        Ok(global.runtime.block_on(
            global
                .bridge
                .open_project(uplink, satellite, api_key, &options),
        ))
    })
}

/// Create a bucket and return its `Bucket` snapshot by value. `config` is a
/// `BucketConfig` snapshot; an empty buffer means defaults.
///
/// # Safety
///
/// `name` must be null or a NUL-terminated string. `config` must be null or
/// valid for `config_len` bytes. `err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn create_bucket(
    project: Handle,
    name: *const c_char,
    config: *const u8,
    config_len: usize,
    err: *mut *mut c_char,
) -> BridgeBuffer {
    guarded(err, BridgeBuffer::EMPTY, || {
        let name = read_str(name, "bucket name")?;
        let bytes = read_bytes(config, config_len)?;
        let config = if bytes.is_empty() {
            BucketConfig::default()
        } else {
            snapshot::decode::<BucketConfig>(bytes)?
        };
        let global = global()?;
        let bucket = global
            .runtime
            .block_on(global.bridge.create_bucket(project, name, &config))?;
        Ok(BridgeBuffer::from_vec(Snapshot::encode(&bucket)?))
    })
}

/// Snapshot of the object behind `handle`. Free with [`free_buffer`].
///
/// # Safety
///
/// `err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn get_snapshot(handle: Handle, err: *mut *mut c_char) -> BridgeBuffer {
    guarded(err, BridgeBuffer::EMPTY, || {
        Ok(BridgeBuffer::from_vec(global()?.bridge.snapshot_of(handle)?))
    })
}

/// Apply a snapshot. With `handle.id == 0` a new object is created;
/// otherwise the object behind `handle` is updated in place.
///
/// # Safety
///
/// `data` must be null or valid for `len` bytes. `err` must be null or valid
/// for writes.
#[no_mangle]
pub unsafe extern "C" fn apply_snapshot(
    handle: Handle,
    data: *const u8,
    len: usize,
    err: *mut *mut c_char,
) -> BridgeValue {
    guarded_value(err, || {
        let bytes = read_bytes(data, len)?;
        let target = handle.is_valid().then_some(handle);
        Ok(global()?.bridge.apply_snapshot(target, bytes))
    })
}

/// Add a reference. Returns the new count.
///
/// # Safety
///
/// `err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn retain_handle(handle: Handle, err: *mut *mut c_char) -> u64 {
    guarded(err, 0, || global()?.bridge.retain(handle))
}

/// Drop a reference. Returns the remaining count; at 0 the handle is dead.
///
/// # Safety
///
/// `err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn release_handle(handle: Handle, err: *mut *mut c_char) -> u64 {
    guarded(err, 0, || global()?.bridge.release(handle))
}

unsafe fn release_typed(handle: Handle, tag: TypeTag, err: *mut *mut c_char) -> u64 {
    guarded(err, 0, || global()?.bridge.release_as(handle, tag))
}

/// [`release_handle`] for project handles.
///
/// # Safety
///
/// `err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn close_project(handle: Handle, err: *mut *mut c_char) -> u64 {
    release_typed(handle, TypeTag::Project, err)
}

/// [`release_handle`] for uplink handles.
///
/// # Safety
///
/// `err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn close_uplink(handle: Handle, err: *mut *mut c_char) -> u64 {
    release_typed(handle, TypeTag::Uplink, err)
}

/// [`release_handle`] for API key handles.
///
/// # Safety
///
/// `err` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn free_api_key(handle: Handle, err: *mut *mut c_char) -> u64 {
    release_typed(handle, TypeTag::ApiKey, err)
}

/// Number of live handles.
#[no_mangle]
pub extern "C" fn live_handles() -> u64 {
    catch_unwind(|| global().map_or(0, |g| g.bridge.live_handles() as u64)).unwrap_or(0)
}

/// Free a string returned by this library. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a string returned by this library, not yet freed.
#[no_mangle]
pub unsafe extern "C" fn free_string(ptr: *mut c_char) {
    free_c_string(ptr);
}

/// Free a buffer returned by this library. The empty buffer is ignored.
///
/// # Safety
///
/// `buffer` must be the empty buffer or one returned by this library, not
/// yet freed.
#[no_mangle]
pub unsafe extern "C" fn free_buffer(buffer: BridgeBuffer) {
    if !buffer.data.is_null() {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
            buffer.data,
            buffer.len,
        )));
    }
}
