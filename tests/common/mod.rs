use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Chunk capacity used by the shared fixtures: small enough that the
/// standard 255-entry fill spreads across many chunks.
pub const CHUNK_SIZE: u32 = 113;

/// Standard fill size for the multi-chunk fixtures.
pub const NUM_ENTRIES: usize = 255;

/// A throwaway directory for one test's databases.
pub struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create test dir"),
        }
    }

    /// Path for a database under this test's directory.
    pub fn db_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    #[allow(dead_code)]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// The payload appended as record `i + 1`.
pub fn entry(i: usize) -> Vec<u8> {
    format!("entry-{}", i).into_bytes()
}

/// Payloads `entry-0 .. entry-<n-1>`.
pub fn entries(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(entry).collect()
}
