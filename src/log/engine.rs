//! The single-threaded core engine: a dense sequence of records spread
//! across fixed-capacity chunks, with prefix/suffix truncation and
//! crash-consistent recovery.

use crate::log::cache::ChunkCache;
use crate::log::chunk::Chunk;
use crate::log::config::{SyncPolicy, DEFAULT_CACHE_CHUNKS, FORMAT_VERSION};
use crate::log::error::{Error, Result};
use crate::log::paths::LogDir;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An embedded append-only log over a directory of chunk files.
///
/// Records are opaque byte strings with dense 1-indexed IDs;
/// [`oldest_id`](ChunkLog::oldest_id) and [`newest_id`](ChunkLog::newest_id)
/// bound the live range (both 0 while the log is empty). The engine assumes
/// a single caller and does no internal synchronization; wrap it in
/// [`SharedChunkLog`](crate::SharedChunkLog) to share it across threads.
pub struct ChunkLog {
    dir: LogDir,
    chunk_size: u32,
    /// Ordered, contiguous, never empty; the last element is the tail.
    chunks: Vec<Chunk>,
    oldest: u64,
    newest: u64,
    policy: SyncPolicy,
    dirty_ops: u32,
    /// Files of forgotten/rolled-back chunks, unlinked at the next sync.
    pending_deletes: Vec<PathBuf>,
    cache: ChunkCache,
    closed: bool,
}

impl ChunkLog {
    /// Opens the log at `path` with the default sync policy.
    ///
    /// With `create`, a missing directory is created and initialized for
    /// `chunk_size`-byte chunks; opening an existing directory validates
    /// its control files instead and keeps the stored chunk size.
    pub fn open(path: impl AsRef<Path>, chunk_size: u32, create: bool) -> Result<Self> {
        Self::open_with_policy(path, chunk_size, create, SyncPolicy::default())
    }

    pub fn open_with_policy(
        path: impl AsRef<Path>,
        chunk_size: u32,
        create: bool,
        policy: SyncPolicy,
    ) -> Result<Self> {
        let dir = LogDir::open(path.as_ref(), create)?;

        if !dir.is_initialized() {
            if !create {
                return Err(Error::CorruptFiles("missing version file".into()));
            }
            if chunk_size == 0 {
                return Err(Error::CorruptFiles("chunk size must be positive".into()));
            }
            dir.init(chunk_size)?;
            info!(path = %dir.root().display(), chunk_size, "created log directory");
        }

        let version = dir.read_version()?;
        if version != FORMAT_VERSION {
            return Err(Error::UnknownVersion(version));
        }
        let stored = dir.read_chunk_size()?;
        if stored == 0 {
            return Err(Error::CorruptFiles("stored chunk size is zero".into()));
        }
        if create && chunk_size != 0 && stored != chunk_size {
            return Err(Error::CorruptFiles(format!(
                "chunk size mismatch: directory holds {}, caller asked for {}",
                stored, chunk_size
            )));
        }
        let chunk_size = stored;

        let mut pending_deletes = Vec::new();
        let mut listed = dir.list_chunk_files()?;

        for pair in listed.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(Error::CorruptFiles(format!(
                    "duplicate chunk index {}",
                    pair[0].0
                )));
            }
        }

        // A hole in the index sequence marks a delete that crashed midway;
        // everything past the hole is a stale tail and gets discarded.
        if let Some(gap) = listed.windows(2).position(|p| p[1].0 != p[0].0 + 1) {
            let dropped = listed.split_off(gap + 1);
            warn!(
                kept = listed.len(),
                dropped = dropped.len(),
                "gap in chunk indices; discarding the post-gap suffix"
            );
            for (ordinal, first_id, path) in dropped {
                let (_, meta_path) = dir.chunk_paths(ordinal, first_id);
                pending_deletes.push(path);
                pending_deletes.push(meta_path);
            }
        }

        // A meta file without its data file is garbage in every scenario.
        for (ordinal, first_id, meta_path) in dir.list_meta_files()? {
            let (data_path, _) = dir.chunk_paths(ordinal, first_id);
            if !data_path.exists() && !pending_deletes.contains(&meta_path) {
                warn!(ordinal, "orphan metadata file; scheduling deletion");
                pending_deletes.push(meta_path);
            }
        }

        let mut chunks = Vec::with_capacity(listed.len().max(1));
        if listed.is_empty() {
            let (data_path, meta_path) = dir.create_chunk_files(0, 1)?;
            chunks.push(Chunk::create(0, 1, data_path, meta_path, chunk_size)?);
        } else {
            let last = listed.len() - 1;
            for (i, (ordinal, first_id, data_path)) in listed.into_iter().enumerate() {
                let (_, meta_path) = dir.chunk_paths(ordinal, first_id);
                let chunk = Chunk::open(ordinal, first_id, data_path, meta_path, chunk_size, i == last)?;
                if let Some(prev) = chunks.last_mut() {
                    if prev.next_id() != chunk.first_id {
                        return Err(Error::CorruptFiles(format!(
                            "chunk {} starts at id {}, expected {}",
                            chunk.ordinal,
                            chunk.first_id,
                            prev.next_id()
                        )));
                    }
                    prev.evict();
                }
                chunks.push(chunk);
            }
        }

        let tail = chunks.last().expect("chunk set is never empty");
        let newest = tail.next_id() - 1;
        let mut oldest = match dir.read_oldest()? {
            Some(stored) => stored,
            None => chunks[0].first_id,
        };
        if newest == 0 {
            oldest = 0;
        } else {
            oldest = oldest.clamp(chunks[0].first_id, newest);
        }

        let mut cache = ChunkCache::new(DEFAULT_CACHE_CHUNKS);
        cache.touch(tail.ordinal);

        let mut log = Self {
            dir,
            chunk_size,
            chunks,
            oldest,
            newest,
            policy,
            dirty_ops: 0,
            pending_deletes,
            cache,
            closed: false,
        };

        // chunks wholly below the persisted oldest were forgotten before
        // the crash; resume their deferred deletion
        while log.chunks.len() > 1 && log.chunks[0].next_id() <= log.oldest {
            log.drop_front_chunk();
        }

        debug!(
            oldest = log.oldest,
            newest = log.newest,
            chunks = log.chunks.len(),
            "opened log"
        );
        Ok(log)
    }

    /// Smallest live ID; 0 iff the log is empty.
    pub fn oldest_id(&self) -> u64 {
        self.oldest
    }

    /// Largest live ID; 0 iff the log is empty.
    pub fn newest_id(&self) -> u64 {
        self.newest
    }

    /// Appends one record and returns its ID.
    ///
    /// Fails with [`Error::TooBig`] when the record exceeds the chunk
    /// capacity. Sealing a full tail chunk forces a full sync before the
    /// next chunk is created.
    pub fn append(&mut self, entry: &[u8]) -> Result<u64> {
        self.check_open()?;
        if entry.len() as u64 > self.chunk_size as u64 {
            return Err(Error::TooBig);
        }
        if !self.tail().has_room(entry.len(), self.chunk_size) {
            self.seal_tail()?;
        }
        debug_assert_eq!(self.tail().next_id(), self.newest + 1);
        let id = self.newest + 1;
        self.tail_mut().append_record(entry)?;
        self.newest = id;
        if self.oldest == 0 {
            self.oldest = 1;
        }
        self.note_mutation()?;
        Ok(id)
    }

    /// Appends records in order and returns the first assigned ID (0 when
    /// `entries` is empty).
    ///
    /// Not atomic: a mid-sequence [`Error::TooBig`] aborts at that element
    /// and leaves the prior appends committed.
    pub fn append_entries<B: AsRef<[u8]>>(&mut self, entries: &[B]) -> Result<u64> {
        self.check_open()?;
        let mut first = 0;
        for entry in entries {
            let id = self.append(entry.as_ref())?;
            if first == 0 {
                first = id;
            }
        }
        Ok(first)
    }

    /// Returns a copy of the record with the given ID.
    pub fn get(&mut self, id: u64) -> Result<Vec<u8>> {
        self.check_open()?;
        if self.newest == 0 || id < self.oldest || id > self.newest {
            return Err(Error::IdOutOfRange);
        }
        let index = self.chunk_index_for(id);
        self.ensure_resident(index)?;
        Ok(self.chunks[index].record(id).to_vec())
    }

    /// Raises the oldest live ID to `new_oldest`, discarding the prefix.
    ///
    /// A target at or below the current oldest (including 0) is a no-op; a
    /// target past the newest ID fails with [`Error::IdOutOfRange`].
    /// `forget(newest_id())` collapses the log to a single record.
    pub fn forget(&mut self, new_oldest: u64) -> Result<()> {
        self.check_open()?;
        if new_oldest <= self.oldest {
            return Ok(());
        }
        if new_oldest > self.newest {
            return Err(Error::IdOutOfRange);
        }
        self.apply_forget(new_oldest);
        self.note_mutation()
    }

    /// Lowers the newest live ID to `new_newest`, discarding the suffix.
    ///
    /// A target at or above the current newest is a no-op; a target below
    /// the oldest ID fails with [`Error::IdOutOfRange`] (so `rollback(0)`
    /// is only accepted on an empty log).
    pub fn rollback(&mut self, new_newest: u64) -> Result<()> {
        self.check_open()?;
        if new_newest >= self.newest {
            return Ok(());
        }
        if new_newest < self.oldest {
            return Err(Error::IdOutOfRange);
        }
        self.apply_rollback(new_newest)?;
        self.note_mutation()
    }

    /// Forget and rollback in one step: keeps exactly the records in
    /// `[new_oldest, new_newest]`.
    ///
    /// Preconditions are checked up front, so no partial effect is ever
    /// observable: fails with [`Error::IdOutOfRange`] when
    /// `new_oldest > new_newest`, `new_oldest` is past the newest ID, or
    /// `new_newest` is below the oldest.
    pub fn truncate(&mut self, new_oldest: u64, new_newest: u64) -> Result<()> {
        self.check_open()?;
        if new_oldest > new_newest || new_oldest > self.newest || new_newest < self.oldest {
            return Err(Error::IdOutOfRange);
        }
        if new_oldest > self.oldest {
            self.apply_forget(new_oldest);
        }
        if new_newest < self.newest {
            self.apply_rollback(new_newest)?;
        }
        self.note_mutation()
    }

    /// Replaces the sync policy. Any policy other than
    /// [`SyncPolicy::Never`] also syncs immediately, so this doubles as
    /// "sync now and reconfigure".
    pub fn set_sync(&mut self, policy: SyncPolicy) -> Result<()> {
        self.check_open()?;
        self.policy = policy;
        if policy != SyncPolicy::Never {
            self.sync_internal()?;
        }
        Ok(())
    }

    /// Forces a full sync: every dirty chunk, the oldest pointer, pending
    /// file deletions, then the directory itself.
    pub fn sync(&mut self) -> Result<()> {
        self.check_open()?;
        self.sync_internal()
    }

    /// Final sync, then releases the directory lock. Every later call on
    /// this log, including a second `close`, fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.sync_internal()?;
        self.dir.unlock()?;
        self.closed = true;
        debug!(oldest = self.oldest, newest = self.newest, "closed log");
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn tail(&self) -> &Chunk {
        self.chunks.last().expect("chunk set is never empty")
    }

    fn tail_mut(&mut self) -> &mut Chunk {
        self.chunks.last_mut().expect("chunk set is never empty")
    }

    /// Index of the chunk holding `id`. Caller guarantees the id is live.
    fn chunk_index_for(&self, id: u64) -> usize {
        self.chunks.partition_point(|c| c.first_id <= id) - 1
    }

    fn ensure_resident(&mut self, index: usize) -> Result<()> {
        if !self.chunks[index].is_resident() {
            self.chunks[index].materialize(self.chunk_size)?;
        }
        self.cache.touch(self.chunks[index].ordinal);
        self.evict_over_capacity();
        Ok(())
    }

    fn evict_over_capacity(&mut self) {
        let tail_ordinal = self.tail().ordinal;
        while let Some(victim) = self.cache.evict_candidate(tail_ordinal) {
            if let Some(chunk) = self.chunks.iter_mut().find(|c| c.ordinal == victim) {
                chunk.evict();
            }
        }
    }

    /// Syncs everything and opens a fresh tail chunk after the current one
    /// ran out of room.
    fn seal_tail(&mut self) -> Result<()> {
        // retiring the tail always syncs, whatever the policy says
        self.sync_internal()?;
        let ordinal = self.tail().ordinal + 1;
        let first_id = self.newest + 1;
        let (data_path, meta_path) = self.dir.create_chunk_files(ordinal, first_id)?;
        let chunk = Chunk::create(ordinal, first_id, data_path, meta_path, self.chunk_size)?;
        debug!(ordinal, first_id, "sealed tail chunk; opened a new one");
        self.chunks.push(chunk);
        self.cache.touch(ordinal);
        self.evict_over_capacity();
        Ok(())
    }

    fn apply_forget(&mut self, new_oldest: u64) {
        while self.chunks.len() > 1 && self.chunks[0].next_id() <= new_oldest {
            self.drop_front_chunk();
        }
        self.oldest = new_oldest;
    }

    fn apply_rollback(&mut self, new_newest: u64) -> Result<()> {
        while self.tail().first_id > new_newest {
            let chunk = self.chunks.pop().expect("chunk set is never empty");
            self.cache.forget(chunk.ordinal);
            debug!(ordinal = chunk.ordinal, "chunk rolled back");
            let (data_path, meta_path) = chunk.into_paths();
            self.pending_deletes.push(data_path);
            self.pending_deletes.push(meta_path);
        }
        let index = self.chunks.len() - 1;
        self.ensure_resident(index)?;
        let tail = &mut self.chunks[index];
        let keep = new_newest - tail.first_id + 1;
        if keep < tail.count {
            tail.rollback_records(keep);
        }
        self.newest = new_newest;
        Ok(())
    }

    fn drop_front_chunk(&mut self) {
        let chunk = self.chunks.remove(0);
        self.cache.forget(chunk.ordinal);
        debug!(ordinal = chunk.ordinal, first_id = chunk.first_id, "chunk forgotten");
        let (data_path, meta_path) = chunk.into_paths();
        self.pending_deletes.push(data_path);
        self.pending_deletes.push(meta_path);
    }

    fn note_mutation(&mut self) -> Result<()> {
        self.dirty_ops += 1;
        if self.policy.due(self.dirty_ops) {
            self.sync_internal()?;
        }
        Ok(())
    }

    fn sync_internal(&mut self) -> Result<()> {
        for chunk in &mut self.chunks {
            if chunk.is_dirty() {
                chunk.sync()?;
            }
        }
        self.dir.write_oldest(self.oldest)?;
        for path in &self.pending_deletes {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.pending_deletes.clear();
        self.dir.sync_dir()?;
        self.dirty_ops = 0;
        Ok(())
    }
}

impl Drop for ChunkLog {
    fn drop(&mut self) {
        if !self.closed {
            // best effort: an explicit close is the way to see the error
            let _ = self.sync_internal();
        }
    }
}
