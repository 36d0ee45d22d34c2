//! One chunk: a capped data file mapped writable, paired with a metadata
//! file of little-endian u32 record end-offsets.

use crate::log::error::{Error, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A contiguous subrange of the log backed by a data/meta file pair.
///
/// The identifying fields stay resident for the chunk's whole lifetime; the
/// heavy state (mapping and end-offset list) can be evicted once the chunk
/// is sealed and re-materialized on demand.
pub(crate) struct Chunk {
    pub(crate) ordinal: u32,
    pub(crate) first_id: u64,
    pub(crate) count: u64,
    pub(crate) data_path: PathBuf,
    pub(crate) meta_path: PathBuf,
    state: Option<ChunkState>,
}

struct ChunkState {
    file: File,
    map: MmapMut,
    ends: Vec<u32>,
    /// `ends[..synced]` is the prefix known to match the meta file.
    synced: usize,
    /// End records physically present in the meta file.
    meta_on_disk: usize,
    /// Data-file length to truncate to on the next sync; set by rollback,
    /// cleared by the next append (which re-establishes the exact length).
    rollback_len: Option<u64>,
}

/// Complete end records read from a meta file, plus whether the file had
/// trailing bytes that do not form a whole record.
struct MetaContents {
    ends: Vec<u32>,
    partial_tail: bool,
}

impl Chunk {
    /// Wraps a freshly created (empty) chunk file pair.
    pub(crate) fn create(
        ordinal: u32,
        first_id: u64,
        data_path: PathBuf,
        meta_path: PathBuf,
        chunk_size: u32,
    ) -> Result<Self> {
        let (file, map) = map_data_file(&data_path, chunk_size)?;
        Ok(Self {
            ordinal,
            first_id,
            count: 0,
            data_path,
            meta_path,
            state: Some(ChunkState {
                file,
                map,
                ends: Vec::new(),
                synced: 0,
                meta_on_disk: 0,
                rollback_len: None,
            }),
        })
    }

    /// Opens and validates an existing chunk during recovery.
    ///
    /// The final chunk tolerates a missing meta file, a partial trailing
    /// record, and end-offsets the data file does not back (a crash lost
    /// the unflushed suffix); non-final chunks must be complete.
    pub(crate) fn open(
        ordinal: u32,
        first_id: u64,
        data_path: PathBuf,
        meta_path: PathBuf,
        chunk_size: u32,
        is_final: bool,
    ) -> Result<Self> {
        let data_len = fs::metadata(&data_path)?.len();
        let meta = read_meta(&meta_path)?;

        let mut ends;
        let mut repair_meta = false;
        match meta {
            None => {
                if !is_final {
                    return Err(Error::MissingMetaNonfinalChunk(ordinal));
                }
                ends = Vec::new();
            }
            Some(contents) => {
                if contents.partial_tail && !is_final {
                    return Err(Error::CorruptFiles(format!(
                        "chunk {} metadata has a partial end record",
                        ordinal
                    )));
                }
                repair_meta = contents.partial_tail;
                ends = contents.ends;
            }
        }

        if is_final {
            // drop end-offsets the data file cannot back
            let backed = ends.iter().take_while(|&&e| e as u64 <= data_len).count();
            if backed < ends.len() {
                warn!(
                    ordinal,
                    dropped = ends.len() - backed,
                    "discarding end-offsets past the data file length"
                );
                ends.truncate(backed);
                repair_meta = true;
            }
        }

        validate_ends(ordinal, &ends, chunk_size)?;

        if !is_final {
            if ends.is_empty() {
                return Err(Error::EmptyNonfinalChunk(ordinal));
            }
            let last = *ends.last().unwrap() as u64;
            if last > data_len {
                return Err(Error::CorruptFiles(format!(
                    "chunk {} data file is shorter than its metadata claims",
                    ordinal
                )));
            }
        }

        if repair_meta {
            let meta_file = OpenOptions::new().write(true).open(&meta_path)?;
            meta_file.set_len(4 * ends.len() as u64)?;
            meta_file.sync_all()?;
        }

        let (file, map) = map_data_file(&data_path, chunk_size)?;
        let last_end = ends.last().copied().unwrap_or(0) as u64;
        // a tail data file longer than its last end is repaired on the next
        // sync; sealed chunks stay clean so they remain evictable
        let rollback_len = (is_final && data_len > last_end).then_some(last_end);

        let synced = ends.len();
        Ok(Self {
            ordinal,
            first_id,
            count: ends.len() as u64,
            data_path,
            meta_path,
            state: Some(ChunkState {
                file,
                map,
                ends,
                synced,
                meta_on_disk: synced,
                rollback_len,
            }),
        })
    }

    /// Reloads the mapping and end-offset list of an evicted chunk.
    pub(crate) fn materialize(&mut self, chunk_size: u32) -> Result<()> {
        debug_assert!(self.state.is_none());
        let contents = read_meta(&self.meta_path)?.ok_or_else(|| {
            Error::CorruptFiles(format!("chunk {} metadata file disappeared", self.ordinal))
        })?;
        if contents.partial_tail || contents.ends.len() as u64 != self.count {
            return Err(Error::CorruptFiles(format!(
                "chunk {} metadata changed underneath the log",
                self.ordinal
            )));
        }
        let (file, map) = map_data_file(&self.data_path, chunk_size)?;
        let synced = contents.ends.len();
        self.state = Some(ChunkState {
            file,
            map,
            ends: contents.ends,
            synced,
            meta_on_disk: synced,
            rollback_len: None,
        });
        Ok(())
    }

    /// Drops the mapping and end-offset list. Only legal for clean chunks.
    pub(crate) fn evict(&mut self) {
        debug_assert!(!self.is_dirty());
        self.state = None;
    }

    pub(crate) fn is_resident(&self) -> bool {
        self.state.is_some()
    }

    /// First ID past this chunk's records.
    pub(crate) fn next_id(&self) -> u64 {
        self.first_id + self.count
    }

    /// Bytes of record data currently held (the last end-offset).
    pub(crate) fn data_len(&self) -> u64 {
        let state = self.state.as_ref().expect("chunk not resident");
        state.ends.last().copied().unwrap_or(0) as u64
    }

    pub(crate) fn has_room(&self, len: usize, chunk_size: u32) -> bool {
        self.data_len() + len as u64 <= chunk_size as u64
    }

    /// Appends one record: extends the data file, then copies the bytes
    /// through the mapping, so an end-offset never outruns its data.
    pub(crate) fn append_record(&mut self, bytes: &[u8]) -> Result<()> {
        let state = self.state.as_mut().expect("chunk not resident");
        let start = state.ends.last().copied().unwrap_or(0) as u64;
        let end = start + bytes.len() as u64;
        debug_assert!(end as usize <= state.map.len());
        state.file.set_len(end)?;
        state.map[start as usize..end as usize].copy_from_slice(bytes);
        state.ends.push(end as u32);
        state.rollback_len = None;
        self.count += 1;
        Ok(())
    }

    /// Borrows the bytes of a record held by this chunk.
    pub(crate) fn record(&self, id: u64) -> &[u8] {
        let state = self.state.as_ref().expect("chunk not resident");
        let slot = (id - self.first_id) as usize;
        let start = if slot == 0 { 0 } else { state.ends[slot - 1] as usize };
        &state.map[start..state.ends[slot] as usize]
    }

    /// Shrinks the chunk to its first `keep` records. The file truncation
    /// is deferred to the next sync via the rollback marker.
    pub(crate) fn rollback_records(&mut self, keep: u64) {
        let state = self.state.as_mut().expect("chunk not resident");
        debug_assert!(keep <= state.ends.len() as u64);
        state.ends.truncate(keep as usize);
        state.synced = state.synced.min(keep as usize);
        state.rollback_len = Some(state.ends.last().copied().unwrap_or(0) as u64);
        self.count = keep;
    }

    pub(crate) fn is_dirty(&self) -> bool {
        match &self.state {
            None => false,
            Some(s) => s.ends.len() > s.synced || s.meta_on_disk > s.synced || s.rollback_len.is_some(),
        }
    }

    /// Flushes this chunk: shrink the meta file below any rolled-back
    /// ends, apply a pending data-file truncation, flush the mapped data,
    /// then append and fsync the dirty end-offsets.
    ///
    /// The meta file is shrunk before anything else so it never claims
    /// ends the data file does not back, whichever step a crash lands on.
    pub(crate) fn sync(&mut self) -> Result<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };

        if state.meta_on_disk > state.synced {
            let meta_file = OpenOptions::new().write(true).open(&self.meta_path)?;
            meta_file.set_len(4 * state.synced as u64)?;
            meta_file.sync_all()?;
            state.meta_on_disk = state.synced;
        }

        if let Some(len) = state.rollback_len.take() {
            state.file.set_len(len)?;
        }

        let data_len = state.ends.last().copied().unwrap_or(0) as usize;
        if data_len > 0 {
            state.map.flush_range(0, data_len)?;
        }
        // set_len only changes metadata; make the new length durable too
        state.file.sync_all()?;

        if state.ends.len() > state.synced {
            let mut buf = Vec::with_capacity((state.ends.len() - state.synced) * 4);
            for &end in &state.ends[state.synced..] {
                buf.extend_from_slice(&end.to_le_bytes());
            }
            let mut meta_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.meta_path)?;
            meta_file.write_all(&buf)?;
            meta_file.sync_all()?;
            state.synced = state.ends.len();
            state.meta_on_disk = state.synced;
        }

        Ok(())
    }

    /// Gives up the file paths for deferred deletion.
    pub(crate) fn into_paths(self) -> (PathBuf, PathBuf) {
        (self.data_path, self.meta_path)
    }
}

fn map_data_file(path: &Path, chunk_size: u32) -> Result<(File, MmapMut)> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    // SAFETY: the database directory is guarded by a process-exclusive
    // lock, so nothing mutates the file underneath the mapping. The map
    // covers chunk_size bytes; pages past the current file length are only
    // touched after set_len has extended the file over them.
    let map = unsafe { MmapOptions::new().len(chunk_size as usize).map_mut(&file)? };
    Ok((file, map))
}

fn read_meta(path: &Path) -> Result<Option<MetaContents>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut ends = Vec::with_capacity(bytes.len() / 4);
    for raw in bytes.chunks_exact(4) {
        ends.push(u32::from_le_bytes(raw.try_into().unwrap()));
    }
    Ok(Some(MetaContents {
        ends,
        partial_tail: bytes.len() % 4 != 0,
    }))
}

fn validate_ends(ordinal: u32, ends: &[u32], chunk_size: u32) -> Result<()> {
    let mut prev = 0u32;
    for &end in ends {
        if end < prev || end > chunk_size {
            return Err(Error::CorruptFiles(format!(
                "chunk {} has an out-of-order or oversized end-offset",
                ordinal
            )));
        }
        prev = end;
    }
    Ok(())
}
