mod cache;
mod chunk;
mod config;
mod engine;
mod error;
mod paths;
mod shared;

pub use config::{SyncPolicy, DEFAULT_CACHE_CHUNKS, DEFAULT_SYNC_EVERY, FORMAT_VERSION};
pub use engine::ChunkLog;
pub use error::{Error, Result};
pub use shared::SharedChunkLog;
