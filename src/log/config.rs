//! On-disk format constants and the sync policy type.

/// Format version written to the `version` control file.
pub const FORMAT_VERSION: u16 = 0;

/// Mutations between periodic syncs when no policy is given.
pub const DEFAULT_SYNC_EVERY: u32 = 256;

/// Resident chunks kept by the cache when no capacity is given.
pub const DEFAULT_CACHE_CHUNKS: usize = 32;

pub(crate) const VERSION_FILE: &str = "version";
pub(crate) const CHUNK_SIZE_FILE: &str = "chunk_size";
pub(crate) const OLDEST_FILE: &str = "oldest";
pub(crate) const LOCK_FILE: &str = "lock";
pub(crate) const META_SUFFIX: &str = ".meta";

/// When the engine flushes dirty state to stable storage.
///
/// Independently of the policy, a full sync always runs when the tail chunk
/// fills up and is sealed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPolicy {
    /// No periodic syncing; only explicit [`sync`](crate::ChunkLog::sync)
    /// calls and forced seal syncs flush.
    Never,
    /// Sync after every mutation.
    EveryOp,
    /// Sync once this many mutations have accumulated.
    Every(u32),
}

impl SyncPolicy {
    pub(crate) fn due(self, dirty_ops: u32) -> bool {
        match self {
            SyncPolicy::Never => false,
            SyncPolicy::EveryOp => true,
            SyncPolicy::Every(n) => dirty_ops >= n,
        }
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::Every(DEFAULT_SYNC_EVERY)
    }
}

pub(crate) fn chunk_file_name(ordinal: u32, first_id: u64) -> String {
    format!("chunk_{}_{}", ordinal, first_id)
}

pub(crate) fn meta_file_name(ordinal: u32, first_id: u64) -> String {
    format!("chunk_{}_{}{}", ordinal, first_id, META_SUFFIX)
}

/// Parses `chunk_<ordinal>_<first_id>` data file names; anything else
/// (control files, meta files, strays) yields `None`.
pub(crate) fn parse_chunk_file_name(name: &str) -> Option<(u32, u64)> {
    let rest = name.strip_prefix("chunk_")?;
    let (ordinal, first_id) = rest.split_once('_')?;
    Some((ordinal.parse().ok()?, first_id.parse().ok()?))
}

/// Parses `chunk_<ordinal>_<first_id>.meta` names.
pub(crate) fn parse_meta_file_name(name: &str) -> Option<(u32, u64)> {
    parse_chunk_file_name(name.strip_suffix(META_SUFFIX)?)
}
