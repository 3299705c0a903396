//! ErrorChannel - the `char **err` out-parameter every C entry point takes.
//!
//! On success the bridge writes NULL into `*err`. On failure it writes a
//! newly allocated, NUL-terminated message that the caller owns and must
//! release with `free_string`. The bridge keeps no reference to a message it
//! has handed out, and does not guard against the caller freeing it twice.

use std::ffi::{c_char, CString};

use bridge_types::BridgeError;

/// Writer for an error out-parameter.
#[derive(Debug)]
pub struct ErrorChannel {
    out: *mut *mut c_char,
}

impl ErrorChannel {
    /// Wrap an out-parameter. A null `out` discards every report.
    ///
    /// # Safety
    ///
    /// `out` must be null or valid for writes for the lifetime of the channel.
    pub unsafe fn new(out: *mut *mut c_char) -> Self {
        Self { out }
    }

    /// Signal success.
    pub fn clear(&self) {
        if !self.out.is_null() {
            // SAFETY: non-null and valid for writes per `new`.
            unsafe { *self.out = std::ptr::null_mut() };
        }
    }

    /// Hand `error` to the caller.
    pub fn report(&self, error: &BridgeError) {
        self.report_message(&error.to_string());
    }

    /// Hand a raw message to the caller.
    pub fn report_message(&self, message: &str) {
        if self.out.is_null() {
            tracing::warn!("Error dropped (no out-parameter): {}", message);
            return;
        }
        // SAFETY: non-null and valid for writes per `new`.
        unsafe { *self.out = into_c_string(message) };
    }
}

/// Copy `s` into a caller-owned C string. Interior NULs are replaced.
pub fn into_c_string(s: &str) -> *mut c_char {
    let c = CString::new(s).unwrap_or_else(|_| {
        CString::new(s.replace('\0', "\u{fffd}")).unwrap_or_default()
    });
    c.into_raw()
}

/// Free a string produced by [`into_c_string`]. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a pointer returned by [`into_c_string`] that has not
/// been freed yet.
pub unsafe fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::Handle;
    use std::ffi::CStr;

    fn take(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { free_c_string(ptr) };
        s
    }

    #[test]
    fn clear_writes_null() {
        let mut out: *mut c_char = into_c_string("stale");
        let stale = out;
        let channel = unsafe { ErrorChannel::new(&mut out) };
        channel.clear();
        assert!(out.is_null());
        unsafe { free_c_string(stale) };
    }

    #[test]
    fn report_transfers_message() {
        let mut out: *mut c_char = std::ptr::null_mut();
        let channel = unsafe { ErrorChannel::new(&mut out) };
        channel.report(&BridgeError::invalid_handle(Handle::new(3, 2), "stale generation"));

        assert_eq!(take(out), "invalid handle: 3@2 (stale generation)");
    }

    #[test]
    fn null_out_parameter_is_tolerated() {
        let channel = unsafe { ErrorChannel::new(std::ptr::null_mut()) };
        channel.clear();
        channel.report(&BridgeError::Internal("nobody listens".into()));
    }

    #[test]
    fn interior_nul_is_replaced() {
        assert_eq!(take(into_c_string("a\0b")), "a\u{fffd}b");
    }
}
