//! Disk-backed page I/O.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{File as TokioFile, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{Storage, Vfs};
use crate::storage::error::StorageError;
use crate::storage::page::{PageId, PAGE_SIZE};

/// One heap file on disk: pages stored as contiguous 8KB blocks.
///
/// ```text
/// +--------------+--------------+--------------+
/// | Page 0 (8KB) | Page 1 (8KB) | Page 2 (8KB) | ...
/// +--------------+--------------+--------------+
/// ^ offset 0     ^ offset 8192  ^ offset 16384
/// ```
///
/// The file handle sits behind a `tokio::sync::Mutex`, so page reads and
/// writes are serialized per file. Durability requires an explicit
/// `sync_all`; until then writes may sit in the OS cache.
pub struct FileStorage {
    path: PathBuf,
    file: Mutex<TokioFile>,
    page_count: AtomicU64,
}

impl FileStorage {
    /// Opens an existing storage file.
    ///
    /// # Errors
    ///
    /// `StorageError::Corrupted` if the file size is not a multiple of
    /// PAGE_SIZE.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let file = OpenOptions::new().read(true).write(true).open(&path).await?;

        let file_size = file.metadata().await?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, PAGE_SIZE
            )));
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_count: AtomicU64::new(file_size / PAGE_SIZE as u64),
        })
    }

    /// Returns the path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        if page_id.page_num() >= self.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset())).await?;
        file.read_exact(buf).await?;
        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        if page_id.page_num() >= self.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset())).await?;
        file.write_all(buf).await?;
        Ok(())
    }

    async fn allocate_page(&self) -> Result<PageId, StorageError> {
        let mut file = self.file.lock().await;

        let page_num = self.page_count.load(Ordering::Acquire);
        let page_id = PageId::new(page_num);

        // Extend the file with a zeroed page
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset())).await?;
        file.write_all(&[0u8; PAGE_SIZE]).await?;

        self.page_count.store(page_num + 1, Ordering::Release);
        Ok(page_id)
    }

    async fn page_count(&self) -> usize {
        self.page_count.load(Ordering::Acquire) as usize
    }

    async fn first_page(&self) -> Result<PageId, StorageError> {
        if self.page_count.load(Ordering::Acquire) == 0 {
            return Err(StorageError::EmptyFile);
        }
        Ok(PageId::new(0))
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        let file = self.file.lock().await;
        file.sync_all().await?;
        Ok(())
    }
}

/// Directory-based file namespace: one file per heap file, all under a
/// common root directory.
pub struct DiskVfs {
    root: PathBuf,
}

impl DiskVfs {
    /// Creates a namespace rooted at `root`. The directory must exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Vfs for DiskVfs {
    type File = FileStorage;

    async fn create(&self, name: &str) -> Result<(), StorageError> {
        let result = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_of(name))
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::FileExists(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, name: &str) -> Result<FileStorage, StorageError> {
        match FileStorage::open(self.path_of(name)).await {
            Ok(storage) => Ok(storage),
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn destroy(&self, name: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_of(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_allocate_write_read() {
        let dir = tempdir().unwrap();
        let vfs = DiskVfs::new(dir.path());
        vfs.create("t").await.unwrap();
        let storage = vfs.open("t").await.unwrap();

        let p0 = storage.allocate_page().await.unwrap();
        assert_eq!(p0, PageId::new(0));

        let mut buf = vec![0u8; PAGE_SIZE];
        buf[17] = 99;
        storage.write_page(p0, &buf).await.unwrap();

        let mut back = vec![0u8; PAGE_SIZE];
        storage.read_page(p0, &mut back).await.unwrap();
        assert_eq!(back[17], 99);
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let vfs = DiskVfs::new(dir.path());
        vfs.create("t").await.unwrap();
        assert!(matches!(vfs.create("t").await, Err(StorageError::FileExists(_))));
    }

    #[tokio::test]
    async fn test_open_missing_fails() {
        let dir = tempdir().unwrap();
        let vfs = DiskVfs::new(dir.path());
        assert!(matches!(vfs.open("nope").await, Err(StorageError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_destroy_removes_file() {
        let dir = tempdir().unwrap();
        let vfs = DiskVfs::new(dir.path());
        vfs.create("t").await.unwrap();
        vfs.destroy("t").await.unwrap();
        assert!(matches!(vfs.open("t").await, Err(StorageError::FileNotFound(_))));
        assert!(matches!(vfs.destroy("t").await, Err(StorageError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_first_page_empty_file() {
        let dir = tempdir().unwrap();
        let vfs = DiskVfs::new(dir.path());
        vfs.create("t").await.unwrap();
        let storage = vfs.open("t").await.unwrap();
        assert!(matches!(storage.first_page().await, Err(StorageError::EmptyFile)));
        storage.allocate_page().await.unwrap();
        assert_eq!(storage.first_page().await.unwrap(), PageId::new(0));
    }

    #[tokio::test]
    async fn test_corrupted_file_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad");
        tokio::fs::write(&path, vec![0u8; 100]).await.unwrap();
        assert!(matches!(
            FileStorage::open(&path).await,
            Err(StorageError::Corrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let vfs = DiskVfs::new(dir.path());
        vfs.create("t").await.unwrap();

        {
            let storage = vfs.open("t").await.unwrap();
            for i in 0..5u8 {
                let page_id = storage.allocate_page().await.unwrap();
                let mut buf = vec![0u8; PAGE_SIZE];
                buf[0] = i * 10;
                storage.write_page(page_id, &buf).await.unwrap();
            }
            storage.sync_all().await.unwrap();
        }

        let storage = vfs.open("t").await.unwrap();
        assert_eq!(storage.page_count().await, 5);
        for i in 0..5u8 {
            let mut buf = vec![0u8; PAGE_SIZE];
            storage.read_page(PageId::new(i as u64), &mut buf).await.unwrap();
            assert_eq!(buf[0], i * 10);
        }
    }
}
