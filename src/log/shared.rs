//! Mutual-exclusion adapter over the single-threaded engine.

use crate::log::config::SyncPolicy;
use crate::log::engine::ChunkLog;
use crate::log::error::{Error, Result};
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A [`ChunkLog`] shared between threads.
///
/// Every operation takes one mutex for its whole duration, so concurrent
/// callers observe a total order consistent with their invocations. There
/// are no fairness guarantees beyond the mutex itself.
pub struct SharedChunkLog {
    inner: Mutex<ChunkLog>,
}

impl SharedChunkLog {
    /// Wraps an already-open engine.
    pub fn new(log: ChunkLog) -> Self {
        Self {
            inner: Mutex::new(log),
        }
    }

    /// Opens a log and wraps it; see [`ChunkLog::open`].
    pub fn open(path: impl AsRef<Path>, chunk_size: u32, create: bool) -> Result<Self> {
        Ok(Self::new(ChunkLog::open(path, chunk_size, create)?))
    }

    pub fn open_with_policy(
        path: impl AsRef<Path>,
        chunk_size: u32,
        create: bool,
        policy: SyncPolicy,
    ) -> Result<Self> {
        Ok(Self::new(ChunkLog::open_with_policy(
            path, chunk_size, create, policy,
        )?))
    }

    /// Unwraps back into the single-threaded engine.
    pub fn into_inner(self) -> ChunkLog {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, entry: &[u8]) -> Result<u64> {
        self.locked()?.append(entry)
    }

    pub fn append_entries<B: AsRef<[u8]>>(&self, entries: &[B]) -> Result<u64> {
        self.locked()?.append_entries(entries)
    }

    pub fn get(&self, id: u64) -> Result<Vec<u8>> {
        self.locked()?.get(id)
    }

    pub fn forget(&self, new_oldest: u64) -> Result<()> {
        self.locked()?.forget(new_oldest)
    }

    pub fn rollback(&self, new_newest: u64) -> Result<()> {
        self.locked()?.rollback(new_newest)
    }

    pub fn truncate(&self, new_oldest: u64, new_newest: u64) -> Result<()> {
        self.locked()?.truncate(new_oldest, new_newest)
    }

    pub fn oldest_id(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .oldest_id()
    }

    pub fn newest_id(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .newest_id()
    }

    pub fn set_sync(&self, policy: SyncPolicy) -> Result<()> {
        self.locked()?.set_sync(policy)
    }

    pub fn sync(&self) -> Result<()> {
        self.locked()?.sync()
    }

    pub fn close(&self) -> Result<()> {
        self.locked()?.close()
    }

    fn locked(&self) -> Result<MutexGuard<'_, ChunkLog>> {
        self.inner
            .lock()
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::Other, "log mutex poisoned")))
    }
}
