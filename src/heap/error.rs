//! Heap layer errors.

use super::page::{RecordId, SlotId};
use crate::storage::{BufferError, StorageError};

/// Errors from heap file operations.
///
/// `PageFull` and `SlotNotFound` are page-level conditions: the scan and
/// insert paths consume them internally (a full page triggers chain
/// growth, an exhausted page triggers a page hop) and they reach callers
/// only when a record id is used out of contract.
#[derive(Debug)]
pub enum HeapError {
    /// Create was attempted on an existing heap file.
    FileExists(String),

    /// Page cannot hold the record.
    PageFull {
        /// Bytes needed for the record and its slot.
        required: usize,
        /// Bytes of free space on the page.
        available: usize,
    },

    /// Slot does not exist on the page or holds no record.
    SlotNotFound(SlotId),

    /// No record lives at this record id.
    RecordNotFound(RecordId),

    /// Record can never fit on a page.
    InvalidRecordLength {
        /// Length of the rejected record.
        length: usize,
        /// Largest insertable record.
        max: usize,
    },

    /// Scan predicate parameters were rejected.
    BadScanParam(String),

    /// A cursor operation was called with no current record.
    NoCurrentRecord,

    /// The file's header or page chain is inconsistent.
    Corrupted(String),

    /// Error from the buffer pool, surfaced verbatim.
    Buffer(BufferError),

    /// Error from the file layer, surfaced verbatim.
    Storage(StorageError),
}

impl std::fmt::Display for HeapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeapError::FileExists(name) => write!(f, "heap file {:?} already exists", name),
            HeapError::PageFull { required, available } => {
                write!(f, "page full: need {} bytes, have {}", required, available)
            }
            HeapError::SlotNotFound(slot_id) => {
                write!(f, "slot {} not found or deleted", slot_id)
            }
            HeapError::RecordNotFound(rid) => {
                write!(f, "no record at ({}, {})", rid.page_id, rid.slot_id)
            }
            HeapError::InvalidRecordLength { length, max } => {
                write!(f, "record of {} bytes exceeds page capacity of {}", length, max)
            }
            HeapError::BadScanParam(msg) => write!(f, "bad scan parameter: {}", msg),
            HeapError::NoCurrentRecord => write!(f, "scan has no current record"),
            HeapError::Corrupted(msg) => write!(f, "corrupted heap file: {}", msg),
            HeapError::Buffer(e) => write!(f, "buffer pool error: {}", e),
            HeapError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for HeapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HeapError::Buffer(e) => Some(e),
            HeapError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for HeapError {
    fn from(e: BufferError) -> Self {
        HeapError::Buffer(e)
    }
}

impl From<StorageError> for HeapError {
    fn from(e: StorageError) -> Self {
        HeapError::Storage(e)
    }
}
