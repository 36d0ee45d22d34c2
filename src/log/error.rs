use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the log can report.
///
/// Argument errors (`TooBig`, `IdOutOfRange`) leave the log untouched.
/// Environmental and corruption errors are only produced while opening a
/// database; once an engine exists they cannot occur. `Closed` is returned
/// by every operation, including `close` itself, after the first successful
/// close.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("record is larger than the chunk capacity")]
    TooBig,
    #[error("id is outside the range held by the log")]
    IdOutOfRange,
    #[error("log is closed")]
    Closed,
    #[error("database path does not exist")]
    PathDoesntExist,
    #[error("database path is not a directory")]
    NotDirectory,
    #[error("database directory is locked by another process")]
    Lock,
    #[error("unknown database format version {0}")]
    UnknownVersion(u16),
    #[error("corrupt database files: {0}")]
    CorruptFiles(String),
    #[error("non-final chunk {0} holds no records")]
    EmptyNonfinalChunk(u32),
    #[error("non-final chunk {0} has no metadata file")]
    MissingMetaNonfinalChunk(u32),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
