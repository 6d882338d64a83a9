//! In-memory page I/O for tests and development.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Storage, Vfs};
use crate::storage::error::StorageError;
use crate::storage::page::{PageData, PageId, PAGE_SIZE};

/// One in-memory file: a shared, growable vector of pages.
///
/// Cloning yields another handle on the same pages, so a file survives a
/// close/reopen cycle within one process the way a disk file would.
#[derive(Clone)]
pub struct MemoryStorage {
    pages: Arc<Mutex<Vec<PageData>>>,
}

impl MemoryStorage {
    /// Creates a new empty in-memory file.
    pub fn new() -> Self {
        Self {
            pages: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        let pages = self.pages.lock();
        let page = pages
            .get(page_id.page_num() as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;
        buf.copy_from_slice(page.as_slice());
        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        let mut pages = self.pages.lock();
        let page = pages
            .get_mut(page_id.page_num() as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;
        page.as_mut_slice().copy_from_slice(buf);
        Ok(())
    }

    async fn allocate_page(&self) -> Result<PageId, StorageError> {
        let mut pages = self.pages.lock();
        let page_id = PageId::new(pages.len() as u64);
        pages.push(PageData::new());
        Ok(page_id)
    }

    async fn page_count(&self) -> usize {
        self.pages.lock().len()
    }

    async fn first_page(&self) -> Result<PageId, StorageError> {
        if self.pages.lock().is_empty() {
            return Err(StorageError::EmptyFile);
        }
        Ok(PageId::new(0))
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// In-memory file namespace keyed by name.
pub struct MemoryVfs {
    files: Mutex<HashMap<String, MemoryStorage>>,
}

impl MemoryVfs {
    /// Creates an empty namespace.
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryVfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for MemoryVfs {
    type File = MemoryStorage;

    async fn create(&self, name: &str) -> Result<(), StorageError> {
        let mut files = self.files.lock();
        if files.contains_key(name) {
            return Err(StorageError::FileExists(name.to_string()));
        }
        files.insert(name.to_string(), MemoryStorage::new());
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<MemoryStorage, StorageError> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))
    }

    async fn destroy(&self, name: &str) -> Result<(), StorageError> {
        self.files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_and_read_zeroed() {
        let storage = MemoryStorage::new();
        let page_id = storage.allocate_page().await.unwrap();
        let mut buf = vec![0u8; PAGE_SIZE];
        storage.read_page(page_id, &mut buf).await.unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let storage = MemoryStorage::new();
        let page_id = storage.allocate_page().await.unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        buf[0] = 42;
        buf[100] = 99;
        storage.write_page(page_id, &buf).await.unwrap();

        let mut back = vec![0u8; PAGE_SIZE];
        storage.read_page(page_id, &mut back).await.unwrap();
        assert_eq!(back[0], 42);
        assert_eq!(back[100], 99);
    }

    #[tokio::test]
    async fn test_page_not_found() {
        let storage = MemoryStorage::new();
        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            storage.read_page(PageId::new(999), &mut buf).await,
            Err(StorageError::PageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_buffer_size() {
        let storage = MemoryStorage::new();
        let page_id = storage.allocate_page().await.unwrap();
        let mut buf = vec![0u8; 100];
        assert!(matches!(
            storage.read_page(page_id, &mut buf).await,
            Err(StorageError::InvalidBufferSize { .. })
        ));
    }

    #[tokio::test]
    async fn test_reopen_sees_same_pages() {
        let vfs = MemoryVfs::new();
        vfs.create("t").await.unwrap();

        {
            let storage = vfs.open("t").await.unwrap();
            let page_id = storage.allocate_page().await.unwrap();
            let mut buf = vec![0u8; PAGE_SIZE];
            buf[7] = 7;
            storage.write_page(page_id, &buf).await.unwrap();
        }

        let storage = vfs.open("t").await.unwrap();
        assert_eq!(storage.page_count().await, 1);
        let mut buf = vec![0u8; PAGE_SIZE];
        storage.read_page(PageId::new(0), &mut buf).await.unwrap();
        assert_eq!(buf[7], 7);
    }

    #[tokio::test]
    async fn test_namespace_errors() {
        let vfs = MemoryVfs::new();
        vfs.create("a").await.unwrap();
        assert!(matches!(vfs.create("a").await, Err(StorageError::FileExists(_))));
        assert!(matches!(vfs.open("b").await, Err(StorageError::FileNotFound(_))));
        vfs.destroy("a").await.unwrap();
        assert!(matches!(vfs.destroy("a").await, Err(StorageError::FileNotFound(_))));
    }
}
