//! Crate-wide error type.
//!
//! One flat enum covering every recoverable failure named in the engine's
//! external-interface and error-handling design. Programmer errors (a
//! negative page id reaching a low-level routine, an index logic error)
//! are not represented here — they panic, since they indicate a bug in
//! the engine itself rather than a condition a caller can act on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamDbError {
    #[error("backing stream does not start with the StreamDB magic number")]
    NotAStreamDb,

    #[error("backing stream is shorter than the engine header")]
    StreamTooShort,

    #[error("CRC check failed for page {page_id}")]
    CrcFailure { page_id: i32 },

    #[error("cycle detected in page chain ending at {end_id} (revisited page {at_id})")]
    ChainCycle { end_id: i32, at_id: i32 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no space available to grow the backing stream")]
    OutOfSpace,

    #[error("corrupted on-disk structure: {0}")]
    Corrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamDbError>;
