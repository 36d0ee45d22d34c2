//! Directory layout: control files, chunk file naming, process lock.

use crate::log::config::{
    chunk_file_name, meta_file_name, parse_chunk_file_name, parse_meta_file_name, CHUNK_SIZE_FILE,
    FORMAT_VERSION, LOCK_FILE, OLDEST_FILE, VERSION_FILE,
};
use crate::log::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// The database directory with its process-exclusive lock held.
///
/// Control file layout: `version` (2 bytes LE), `chunk_size` (4 bytes LE),
/// `oldest` (8 bytes LE, absent until the first sync), one
/// `chunk_<ordinal>_<first_id>` / `.meta` pair per chunk, and `lock`.
pub(crate) struct LogDir {
    root: PathBuf,
    lock: File,
}

impl LogDir {
    /// Opens (or with `create`, makes) the directory and takes the lock.
    pub(crate) fn open(root: &Path, create: bool) -> Result<Self> {
        match fs::metadata(root) {
            Ok(md) if md.is_dir() => {}
            Ok(_) => return Err(Error::NotDirectory),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !create {
                    return Err(Error::PathDoesntExist);
                }
                fs::create_dir_all(root)?;
            }
            Err(e) => return Err(e.into()),
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;
        lock.try_lock_exclusive().map_err(|_| Error::Lock)?;

        Ok(Self {
            root: root.to_path_buf(),
            lock,
        })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.root.join(VERSION_FILE).exists()
    }

    /// Writes the immutable control files of a fresh database.
    pub(crate) fn init(&self, chunk_size: u32) -> Result<()> {
        self.write_control(VERSION_FILE, &FORMAT_VERSION.to_le_bytes())?;
        self.write_control(CHUNK_SIZE_FILE, &chunk_size.to_le_bytes())?;
        self.sync_dir()
    }

    pub(crate) fn read_version(&self) -> Result<u16> {
        let bytes = fs::read(self.root.join(VERSION_FILE))
            .map_err(|_| Error::CorruptFiles("missing or unreadable version file".into()))?;
        let raw: [u8; 2] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::CorruptFiles("version file is not 2 bytes".into()))?;
        Ok(u16::from_le_bytes(raw))
    }

    pub(crate) fn read_chunk_size(&self) -> Result<u32> {
        let bytes = fs::read(self.root.join(CHUNK_SIZE_FILE))
            .map_err(|_| Error::CorruptFiles("missing or unreadable chunk_size file".into()))?;
        let raw: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::CorruptFiles("chunk_size file is not 4 bytes".into()))?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Reads the persisted oldest pointer; `None` when no sync has run yet.
    pub(crate) fn read_oldest(&self) -> Result<Option<u64>> {
        match fs::read(self.root.join(OLDEST_FILE)) {
            Ok(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::CorruptFiles("oldest file is not 8 bytes".into()))?;
                Ok(Some(u64::from_le_bytes(raw)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrites the oldest pointer atomically (tmp, fsync, rename).
    pub(crate) fn write_oldest(&self, oldest: u64) -> Result<()> {
        let tmp = self.root.join("oldest.tmp");
        fs::write(&tmp, oldest.to_le_bytes())?;
        File::open(&tmp)?.sync_all()?;
        fs::rename(&tmp, self.root.join(OLDEST_FILE))?;
        Ok(())
    }

    fn write_control(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(name);
        fs::write(&path, bytes)?;
        File::open(&path)?.sync_all()?;
        Ok(())
    }

    /// Chunk data files present on disk, sorted by ordinal.
    pub(crate) fn list_chunk_files(&self) -> Result<Vec<(u32, u64, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some((ordinal, first_id)) = parse_chunk_file_name(name) {
                    found.push((ordinal, first_id, entry.path()));
                }
            }
        }
        found.sort_by_key(|&(ordinal, _, _)| ordinal);
        Ok(found)
    }

    /// Metadata files present on disk, unsorted.
    pub(crate) fn list_meta_files(&self) -> Result<Vec<(u32, u64, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some((ordinal, first_id)) = parse_meta_file_name(name) {
                    found.push((ordinal, first_id, entry.path()));
                }
            }
        }
        Ok(found)
    }

    pub(crate) fn chunk_paths(&self, ordinal: u32, first_id: u64) -> (PathBuf, PathBuf) {
        (
            self.root.join(chunk_file_name(ordinal, first_id)),
            self.root.join(meta_file_name(ordinal, first_id)),
        )
    }

    /// Creates an empty chunk file pair and makes the names durable.
    pub(crate) fn create_chunk_files(&self, ordinal: u32, first_id: u64) -> Result<(PathBuf, PathBuf)> {
        let (data_path, meta_path) = self.chunk_paths(ordinal, first_id);
        File::create(&data_path)?.sync_all()?;
        File::create(&meta_path)?.sync_all()?;
        self.sync_dir()?;
        Ok((data_path, meta_path))
    }

    /// Fsyncs the directory so renames and unlinks survive a crash.
    pub(crate) fn sync_dir(&self) -> Result<()> {
        File::open(&self.root)?.sync_all()?;
        Ok(())
    }

    pub(crate) fn unlock(&self) -> Result<()> {
        FileExt::unlock(&self.lock)?;
        Ok(())
    }
}
