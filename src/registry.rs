//! Handle Registry
//!
//! Maps opaque [`Handle`]s to live engines.
//!
//! ## Guarantees
//! - Handle ids are never reused within one registry, so a stale handle can
//!   only ever fail with `InvalidHandle`
//! - At most one live engine per canonical directory
//! - A failed open registers nothing
//!
//! Operations clone the engine's `Arc` out of the table and run without the
//! registry lock; a concurrent `close` makes in-flight calls on that engine
//! fail with `InvalidHandle` rather than touch a half-closed database.
//!
//! Opening and closing do their disk work outside the lock too. The path is
//! reserved first, so a second open of the same directory fails with
//! `AlreadyInUse` until the first open or close has finished.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::Config;
use crate::engine::{Engine, Snapshot};
use crate::error::{RdbError, Result};

/// Opaque identifier for an open database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Rebuild a handle from the id a caller kept across the C boundary
    pub fn from_raw(id: u64) -> Self {
        Handle(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a canonical data directory
enum Slot {
    /// An open or close is in progress
    Busy,
    Owned(Handle),
}

#[derive(Default)]
struct Inner {
    engines: HashMap<Handle, Arc<Engine>>,
    paths: HashMap<PathBuf, Slot>,
}

/// Table of open databases
pub struct Registry {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The process-wide registry behind the C ABI
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Open the database in `path` with default settings
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Handle> {
        self.open_with(Config::for_path(path.as_ref()))
    }

    /// Open a database with an explicit config
    ///
    /// The directory is created when writable and resolved to its canonical
    /// form, so two spellings of one directory share one owner.
    pub fn open_with(&self, mut config: Config) -> Result<Handle> {
        if !config.read_only {
            fs::create_dir_all(&config.data_dir)?;
        }
        let canonical = fs::canonicalize(&config.data_dir)?;

        let reservation = self.reserve(&canonical)?;

        config.data_dir = canonical.clone();
        let engine = Engine::open(config)?;

        let handle = Handle(self.next_id.fetch_add(1, Ordering::SeqCst));
        reservation.commit(handle, engine);

        tracing::info!(handle = handle.id(), path = %canonical.display(), "Opened database");
        Ok(handle)
    }

    /// Flush and release a database
    ///
    /// The handle is invalid afterwards even if the final flush fails; the
    /// unflushed writes stay in the WAL and are recovered on the next open.
    /// The directory cannot be reopened until the engine has let go of it.
    pub fn close(&self, handle: Handle) -> Result<()> {
        let (engine, reservation) = {
            let mut inner = self.inner.lock();
            let engine = inner
                .engines
                .remove(&handle)
                .ok_or_else(|| invalid(handle))?;
            let path = engine.data_dir().to_path_buf();
            inner.paths.insert(path.clone(), Slot::Busy);
            (engine, Reservation::new(self, path))
        };

        let closed = engine.close();
        drop(reservation);

        match &closed {
            Ok(()) => tracing::info!(handle = handle.id(), "Closed database"),
            Err(e) => tracing::error!(handle = handle.id(), error = %e, "Close failed"),
        }
        closed
    }

    pub fn get(&self, handle: Handle, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.engine(handle)?.get(key)
    }

    pub fn set(&self, handle: Handle, key: &[u8], value: &[u8]) -> Result<()> {
        self.engine(handle)?.put(key, value)
    }

    pub fn remove(&self, handle: Handle, key: &[u8]) -> Result<()> {
        self.engine(handle)?.delete(key)
    }

    /// Visit live entries in ascending key order; see [`Engine::for_each`]
    pub fn for_each<F>(&self, handle: Handle, visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    {
        self.engine(handle)?.for_each(visit)
    }

    pub fn iter(&self, handle: Handle) -> Result<Snapshot> {
        self.engine(handle)?.iter()
    }

    /// Shared reference to the engine behind `handle`
    pub fn engine(&self, handle: Handle) -> Result<Arc<Engine>> {
        self.inner
            .lock()
            .engines
            .get(&handle)
            .cloned()
            .ok_or_else(|| invalid(handle))
    }

    pub fn is_open(&self, handle: Handle) -> bool {
        self.inner.lock().engines.contains_key(&handle)
    }

    /// Number of open databases
    pub fn len(&self) -> usize {
        self.inner.lock().engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Registry {
    /// Claim `path` for an open in progress
    fn reserve(&self, path: &Path) -> Result<Reservation<'_>> {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.paths.get(path) {
            match slot {
                Slot::Owned(owner) => {
                    tracing::warn!(path = %path.display(), owner = owner.id(), "Database already open")
                }
                Slot::Busy => {
                    tracing::warn!(path = %path.display(), "Database is being opened or closed")
                }
            }
            return Err(RdbError::AlreadyInUse(path.to_path_buf()));
        }
        inner.paths.insert(path.to_path_buf(), Slot::Busy);
        Ok(Reservation::new(self, path.to_path_buf()))
    }
}

/// A `Busy` path slot, released on drop unless committed
struct Reservation<'a> {
    registry: &'a Registry,
    path: PathBuf,
    committed: bool,
}

impl<'a> Reservation<'a> {
    fn new(registry: &'a Registry, path: PathBuf) -> Self {
        Self {
            registry,
            path,
            committed: false,
        }
    }

    /// Register `engine` under `handle` as the owner of the path
    fn commit(mut self, handle: Handle, engine: Engine) {
        let mut inner = self.registry.inner.lock();
        inner.engines.insert(handle, Arc::new(engine));
        inner.paths.insert(self.path.clone(), Slot::Owned(handle));
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.inner.lock().paths.remove(&self.path);
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(handle: Handle) -> RdbError {
    RdbError::InvalidHandle(format!("unknown or closed handle {}", handle))
}
