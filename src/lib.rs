//! # chunklog
//!
//! An embedded, append-only log database. Records are opaque byte strings
//! with dense, 1-indexed 64-bit IDs, persisted across fixed-capacity chunk
//! files inside a single locked directory. The log can be truncated from
//! both sides: [`forget`](ChunkLog::forget) discards a prefix,
//! [`rollback`](ChunkLog::rollback) discards a suffix.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chunklog::ChunkLog;
//!
//! # fn main() -> chunklog::Result<()> {
//! // Create a log with 1 MiB chunks
//! let mut log = ChunkLog::open("./my-log", 1024 * 1024, true)?;
//!
//! let id = log.append(b"hello, log")?;
//! assert_eq!(log.get(id)?, b"hello, log");
//!
//! log.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Durability
//!
//! Writes land in a memory-mapped tail chunk immediately, but their
//! end-offsets are flushed lazily under a [`SyncPolicy`]: periodically
//! after a configured number of mutations, on every chunk roll, on
//! [`sync`](ChunkLog::sync) and on [`close`](ChunkLog::close). A crash can
//! lose the records appended since the last sync, never anything older and
//! never a torn record.
//!
//! ## Concurrency
//!
//! [`ChunkLog`] assumes a single caller. [`SharedChunkLog`] wraps it in a
//! mutex for multi-threaded use:
//!
//! ```rust,no_run
//! use chunklog::SharedChunkLog;
//! use std::sync::Arc;
//!
//! # fn main() -> chunklog::Result<()> {
//! let log = Arc::new(SharedChunkLog::open("./my-log", 1024 * 1024, true)?);
//! let writer = Arc::clone(&log);
//! std::thread::spawn(move || writer.append(b"from another thread"));
//! # Ok(())
//! # }
//! ```

pub mod log;

pub use log::{ChunkLog, Error, Result, SharedChunkLog, SyncPolicy};
