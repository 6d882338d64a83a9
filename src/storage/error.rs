//! Storage layer errors.

use crate::storage::PageId;

/// Errors from the file layer and raw page I/O.
#[derive(Debug)]
pub enum StorageError {
    /// Page has not been allocated in this file.
    PageNotFound(PageId),

    /// Buffer passed to read_page/write_page was not exactly PAGE_SIZE bytes.
    InvalidBufferSize {
        /// Expected buffer size (PAGE_SIZE).
        expected: usize,
        /// Size of the buffer actually provided.
        actual: usize,
    },

    /// Create was attempted on a name that already exists.
    FileExists(String),

    /// Open or destroy was attempted on a name that does not exist.
    FileNotFound(String),

    /// Destroy was attempted while handles on the file are still open.
    FileInUse(String),

    /// The file contains no pages, so it has no first page.
    EmptyFile,

    /// The file on disk has an invalid size or layout.
    Corrupted(String),

    /// I/O error from the underlying file system.
    Io(std::io::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::PageNotFound(id) => write!(f, "page {} not allocated", id),
            StorageError::InvalidBufferSize { expected, actual } => {
                write!(f, "invalid buffer size: expected {}, got {}", expected, actual)
            }
            StorageError::FileExists(name) => write!(f, "file {:?} already exists", name),
            StorageError::FileNotFound(name) => write!(f, "file {:?} not found", name),
            StorageError::FileInUse(name) => write!(f, "file {:?} is still open", name),
            StorageError::EmptyFile => write!(f, "file has no pages"),
            StorageError::Corrupted(msg) => write!(f, "corrupted file: {}", msg),
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}
