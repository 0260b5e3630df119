//! `#[repr(C)]` shapes exchanged with the host
//!
//! Each fallible call returns a tagged struct. On failure `error` points to
//! an owned NUL-terminated message the host frees with `rdb_error_free`; on
//! success it is null.

use std::ffi::{c_char, c_void, CString};
use std::fmt::Display;
use std::ptr;

use crate::error::{RdbError, Result};

/// A byte buffer `{ptr, len}`
///
/// Direction decides ownership:
/// - passed in: borrowed for the duration of the call
/// - returned from `rdb_get`: owned by the host, released with `rdb_bytes_free`
/// - handed to a visitor: borrowed for the duration of the callback
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RdbBytes {
    pub ptr: *const u8,
    pub len: u64,
}

impl RdbBytes {
    /// `{null, 0}`
    pub const fn empty() -> Self {
        Self {
            ptr: ptr::null(),
            len: 0,
        }
    }

    /// Borrow a slice without transferring ownership
    pub fn borrowed(slice: &[u8]) -> Self {
        if slice.is_empty() {
            return Self::empty();
        }
        Self {
            ptr: slice.as_ptr(),
            len: slice.len() as u64,
        }
    }

    /// Hand `data` to the host; it must come back through [`RdbBytes::free`]
    pub(crate) fn owned(data: Vec<u8>) -> Self {
        if data.is_empty() {
            return Self::empty();
        }
        let boxed = data.into_boxed_slice();
        let len = boxed.len() as u64;
        let ptr = Box::into_raw(boxed) as *const u8;
        Self { ptr, len }
    }

    /// View an inbound buffer
    ///
    /// `{null, 0}` is the empty slice; a null pointer with a non-zero length
    /// is rejected.
    ///
    /// # Safety
    /// A non-null `ptr` must be valid for reads of `len` bytes for `'a`.
    pub unsafe fn as_slice<'a>(&self, what: &str) -> Result<&'a [u8]> {
        if self.ptr.is_null() {
            if self.len == 0 {
                return Ok(&[]);
            }
            return Err(RdbError::InvalidArgument(format!(
                "{} is null with length {}",
                what, self.len
            )));
        }

        let len = usize::try_from(self.len).map_err(|_| {
            RdbError::InvalidArgument(format!("{} length {} too large", what, self.len))
        })?;
        Ok(std::slice::from_raw_parts(self.ptr, len))
    }

    /// Release a buffer created by [`RdbBytes::owned`]
    ///
    /// # Safety
    /// `self` must come from `owned` and not have been freed before.
    pub(crate) unsafe fn free(self) {
        if self.ptr.is_null() || self.len == 0 {
            return;
        }
        let slice = ptr::slice_from_raw_parts_mut(self.ptr as *mut u8, self.len as usize);
        drop(Box::from_raw(slice));
    }
}

/// Outcome of `rdb_open`
#[repr(C)]
#[derive(Debug)]
pub struct RdbResult {
    pub ok: bool,
    pub handle: u64,
    pub error: *mut c_char,
}

/// Outcome of `rdb_get`
///
/// `valid` with `error == null` distinguishes a stored value (possibly empty)
/// from an absent key (`valid == false`, `error == null`).
#[repr(C)]
#[derive(Debug)]
pub struct RdbOptionalBytes {
    pub bytes: RdbBytes,
    pub valid: bool,
    pub error: *mut c_char,
}

/// Outcome of calls that return nothing else
#[repr(C)]
#[derive(Debug)]
pub struct RdbStatus {
    pub ok: bool,
    pub error: *mut c_char,
}

/// Visitor for `rdb_foreach`; return `true` to continue, `false` to stop
pub type RdbVisitor =
    Option<extern "C" fn(key: RdbBytes, value: RdbBytes, user_data: *mut c_void) -> bool>;

/// Result shapes that can carry an error message
pub(crate) trait Failure {
    fn failure(message: *mut c_char) -> Self;
}

impl Failure for RdbResult {
    fn failure(message: *mut c_char) -> Self {
        Self {
            ok: false,
            handle: 0,
            error: message,
        }
    }
}

impl Failure for RdbOptionalBytes {
    fn failure(message: *mut c_char) -> Self {
        Self {
            bytes: RdbBytes::empty(),
            valid: false,
            error: message,
        }
    }
}

impl Failure for RdbStatus {
    fn failure(message: *mut c_char) -> Self {
        Self {
            ok: false,
            error: message,
        }
    }
}

impl From<Result<u64>> for RdbResult {
    fn from(result: Result<u64>) -> Self {
        match result {
            Ok(handle) => Self {
                ok: true,
                handle,
                error: ptr::null_mut(),
            },
            Err(e) => Self::failure(error_message(e)),
        }
    }
}

impl From<Result<Option<Vec<u8>>>> for RdbOptionalBytes {
    fn from(result: Result<Option<Vec<u8>>>) -> Self {
        match result {
            Ok(Some(value)) => Self {
                bytes: RdbBytes::owned(value),
                valid: true,
                error: ptr::null_mut(),
            },
            Ok(None) => Self {
                bytes: RdbBytes::empty(),
                valid: false,
                error: ptr::null_mut(),
            },
            Err(e) => Self::failure(error_message(e)),
        }
    }
}

impl From<Result<()>> for RdbStatus {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                error: ptr::null_mut(),
            },
            Err(e) => Self::failure(error_message(e)),
        }
    }
}

/// Allocate an owned C string for the host
///
/// Interior NULs would truncate the message, so they are escaped.
pub(crate) fn error_message(message: impl Display) -> *mut c_char {
    let text = message.to_string().replace('\0', "\\0");
    CString::new(text).unwrap_or_default().into_raw()
}
