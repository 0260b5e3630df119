//! `extern "C"` entry points
//!
//! All calls go through [`Registry::global`]. Every entry point catches
//! panics, so nothing unwinds into the host.

use std::any::Any;
use std::ffi::{c_char, c_void, CString};
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use crate::error::{RdbError, Result};
use crate::registry::{Handle, Registry};

use super::types::{
    error_message, Failure, RdbBytes, RdbOptionalBytes, RdbResult, RdbStatus, RdbVisitor,
};

/// Open (creating if needed) the database directory at `path`.
///
/// # Safety
/// `path` must satisfy the inbound buffer rules of [`RdbBytes`].
#[no_mangle]
pub unsafe extern "C" fn rdb_open(path: RdbBytes) -> RdbResult {
    boundary("rdb_open", || {
        let path = decode_path(path.as_slice("path")?)?;
        let handle = Registry::global().open(&path)?;
        Ok(handle.id())
    })
}

/// Flush and close a database. The handle is invalid afterwards.
#[no_mangle]
pub extern "C" fn rdb_close(db: u64) -> RdbStatus {
    boundary("rdb_close", || Registry::global().close(Handle::from_raw(db)))
}

/// Look up `key`. A found value must be released with `rdb_bytes_free`.
///
/// # Safety
/// `key` must satisfy the inbound buffer rules of [`RdbBytes`].
#[no_mangle]
pub unsafe extern "C" fn rdb_get(db: u64, key: RdbBytes) -> RdbOptionalBytes {
    boundary("rdb_get", || {
        let key = key.as_slice("key")?;
        Registry::global().get(Handle::from_raw(db), key)
    })
}

/// Store `value` under `key`.
///
/// # Safety
/// `key` and `value` must satisfy the inbound buffer rules of [`RdbBytes`].
#[no_mangle]
pub unsafe extern "C" fn rdb_set(db: u64, key: RdbBytes, value: RdbBytes) -> RdbStatus {
    boundary("rdb_set", || {
        let key = key.as_slice("key")?;
        let value = value.as_slice("value")?;
        Registry::global().set(Handle::from_raw(db), key, value)
    })
}

/// Delete `key`; deleting an absent key succeeds.
///
/// # Safety
/// `key` must satisfy the inbound buffer rules of [`RdbBytes`].
#[no_mangle]
pub unsafe extern "C" fn rdb_remove(db: u64, key: RdbBytes) -> RdbStatus {
    boundary("rdb_remove", || {
        let key = key.as_slice("key")?;
        Registry::global().remove(Handle::from_raw(db), key)
    })
}

/// Call `visit` for every live entry in ascending key order.
///
/// The buffers passed to `visit` are only valid during that call and must not
/// be freed. `visit` may call back into this library.
#[no_mangle]
pub extern "C" fn rdb_foreach(db: u64, visit: RdbVisitor, user_data: *mut c_void) -> RdbStatus {
    boundary("rdb_foreach", || {
        let visit = visit
            .ok_or_else(|| RdbError::InvalidArgument("visitor is null".to_string()))?;

        Registry::global().for_each(Handle::from_raw(db), |key, value| {
            if visit(RdbBytes::borrowed(key), RdbBytes::borrowed(value), user_data) {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            }
        })
    })
}

/// Release a buffer returned by `rdb_get`. `{null, 0}` is a no-op.
///
/// # Safety
/// `bytes` must come from this library and be freed at most once.
#[no_mangle]
pub unsafe extern "C" fn rdb_bytes_free(bytes: RdbBytes) {
    bytes.free();
}

/// Release an error message. Null is a no-op.
///
/// # Safety
/// `error` must come from this library and be freed at most once.
#[no_mangle]
pub unsafe extern "C" fn rdb_error_free(error: *mut c_char) {
    if !error.is_null() {
        drop(CString::from_raw(error));
    }
}

/// Print engine logs to stderr, filtered by `RUST_LOG`. Safe to call twice.
#[no_mangle]
pub extern "C" fn rdb_init_logging() {
    let _ = panic::catch_unwind(crate::logging::init);
}

/// Run `body`, turning errors and panics into an owned message
fn boundary<T, R>(op: &'static str, body: impl FnOnce() -> Result<T>) -> R
where
    R: Failure + From<Result<T>>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => R::from(Ok(value)),
        Ok(Err(e)) => {
            tracing::debug!(op, error = %e, "Call failed");
            R::from(Err(e))
        }
        Err(payload) => {
            let reason = panic_reason(payload.as_ref());
            tracing::error!(op, reason = %reason, "Panic caught at C boundary");
            R::failure(error_message(format!("{} panicked: {}", op, reason)))
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(unix)]
fn decode_path(bytes: &[u8]) -> Result<PathBuf> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    if bytes.is_empty() {
        return Err(RdbError::InvalidArgument("path is empty".to_string()));
    }
    Ok(PathBuf::from(OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
fn decode_path(bytes: &[u8]) -> Result<PathBuf> {
    if bytes.is_empty() {
        return Err(RdbError::InvalidArgument("path is empty".to_string()));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|_| RdbError::InvalidArgument("path is not UTF-8".to_string()))?;
    Ok(PathBuf::from(text))
}
