//! C ABI
//!
//! Flat `extern "C"` functions over the process-wide [`Registry`], declared
//! for C callers in `include/rdb.h`.
//!
//! ## Ownership
//! ```text
//! host ──RdbBytes (borrowed for the call)──────────────► rdb_set / rdb_get / ...
//! host ◄─RdbOptionalBytes.bytes (owned, rdb_bytes_free)── rdb_get
//! host ◄─*.error (owned, rdb_error_free)────────────────── any failing call
//! host ◄─visitor key/value (borrowed for the callback)─── rdb_foreach
//! ```
//!
//! [`Registry`]: crate::registry::Registry

mod api;
mod types;

pub use api::{
    rdb_bytes_free, rdb_close, rdb_error_free, rdb_foreach, rdb_get, rdb_init_logging, rdb_open,
    rdb_remove, rdb_set,
};
pub use types::{RdbBytes, RdbOptionalBytes, RdbResult, RdbStatus, RdbVisitor};
