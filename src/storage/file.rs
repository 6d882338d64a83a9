//! Open-file table of the file layer.
//!
//! The buffer pool keys cached frames by `(FileId, PageId)`, so two opens
//! of the same name must resolve to the same [`FileId`] or the pool would
//! cache one disk page in two frames. [`Db`] provides that guarantee: it
//! keeps a name → open file table and hands out shared [`FileHandle`]s.
//! Dropping the last handle closes the file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::error::StorageError;
use super::io::{Storage, Vfs};
use super::page::PageId;

/// Process-unique identity of one open file.
///
/// A fresh id is assigned each time a file goes from closed to open; a
/// name reopened after its last handle was dropped gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(u64);

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// An open file: identity, name, and the page I/O backend.
pub struct OpenFile<F> {
    id: FileId,
    name: String,
    storage: F,
}

impl<F: Storage> OpenFile<F> {
    /// Returns the identity of this open file.
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Returns the name the file was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the page I/O backend.
    pub fn storage(&self) -> &F {
        &self.storage
    }

    /// Returns the number of the file's first page.
    pub async fn first_page(&self) -> Result<PageId, StorageError> {
        self.storage.first_page().await
    }
}

/// Shared handle on an open file. Cloning is cheap; dropping the last
/// clone closes the file.
pub type FileHandle<F> = Arc<OpenFile<F>>;

/// The file layer: a [`Vfs`] namespace plus the open-file table.
pub struct Db<V: Vfs> {
    vfs: V,
    open_files: Mutex<HashMap<String, Weak<OpenFile<V::File>>>>,
}

impl<V: Vfs> Db<V> {
    /// Wraps a namespace in a file layer.
    pub fn new(vfs: V) -> Self {
        Self {
            vfs,
            open_files: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the underlying namespace.
    pub fn vfs(&self) -> &V {
        &self.vfs
    }

    /// Creates an empty file. Fails with `FileExists` if the name is taken.
    pub async fn create_file(&self, name: &str) -> Result<(), StorageError> {
        self.vfs.create(name).await
    }

    /// Opens a file, sharing the handle with any other open of the same name.
    pub async fn open_file(&self, name: &str) -> Result<FileHandle<V::File>, StorageError> {
        // Fast path: the file is already open
        if let Some(existing) = self.open_files.lock().get(name).and_then(Weak::upgrade) {
            return Ok(existing);
        }

        let storage = self.vfs.open(name).await?;

        let mut open_files = self.open_files.lock();
        // Another task may have opened the same name while we were in I/O
        if let Some(existing) = open_files.get(name).and_then(Weak::upgrade) {
            return Ok(existing);
        }

        let handle = Arc::new(OpenFile {
            id: FileId(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            storage,
        });
        open_files.insert(name.to_string(), Arc::downgrade(&handle));
        Ok(handle)
    }

    /// Removes a file from the namespace.
    ///
    /// The file must not be open; destroying a file while handles to it
    /// exist would leave those handles addressing freed pages.
    pub async fn destroy_file(&self, name: &str) -> Result<(), StorageError> {
        {
            let mut open_files = self.open_files.lock();
            if open_files.get(name).is_some_and(|w| w.strong_count() > 0) {
                return Err(StorageError::FileInUse(name.to_string()));
            }
            open_files.remove(name);
        }
        self.vfs.destroy(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::io::MemoryVfs;

    #[tokio::test]
    async fn test_open_shares_identity() {
        let db = Db::new(MemoryVfs::new());
        db.create_file("r").await.unwrap();

        let a = db.open_file("r").await.unwrap();
        let b = db.open_file("r").await.unwrap();
        assert_eq!(a.id(), b.id());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_reopen_after_close_gets_new_identity() {
        let db = Db::new(MemoryVfs::new());
        db.create_file("r").await.unwrap();

        let first_id = db.open_file("r").await.unwrap().id();
        // Handle dropped: the file is closed
        let second_id = db.open_file("r").await.unwrap().id();
        assert_ne!(first_id, second_id);
    }

    #[tokio::test]
    async fn test_destroy_open_file_rejected() {
        let db = Db::new(MemoryVfs::new());
        db.create_file("r").await.unwrap();

        let handle = db.open_file("r").await.unwrap();
        assert!(db.destroy_file("r").await.is_err());

        drop(handle);
        db.destroy_file("r").await.unwrap();
        assert!(matches!(
            db.open_file("r").await,
            Err(StorageError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let db = Db::new(MemoryVfs::new());
        assert!(matches!(
            db.open_file("nope").await,
            Err(StorageError::FileNotFound(_))
        ));
    }
}
