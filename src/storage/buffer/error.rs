//! Buffer pool errors.

use crate::storage::StorageError;

/// Errors from buffer pool operations.
#[derive(Debug)]
pub enum BufferError {
    /// Every frame is pinned; nothing can be evicted to make room.
    NoFreeFrames,

    /// Error from the file underneath the pool, surfaced verbatim.
    Storage(StorageError),
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::NoFreeFrames => {
                write!(f, "buffer pool exhausted: all frames are pinned")
            }
            BufferError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for BufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BufferError::Storage(e) => Some(e),
            BufferError::NoFreeFrames => None,
        }
    }
}

impl From<StorageError> for BufferError {
    fn from(e: StorageError) -> Self {
        BufferError::Storage(e)
    }
}
