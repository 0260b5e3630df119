//! Logging setup for hosts that want engine logs
//!
//! The library itself only emits `tracing` events. Binaries and C hosts call
//! [`init`] to print them to stderr.

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,rdb=debug";

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
