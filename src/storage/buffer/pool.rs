//! The buffer pool manager.

use std::collections::HashMap;
use std::sync::Weak;

use log::warn;
use parking_lot::Mutex;

use super::error::BufferError;
use super::frame::{Frame, FrameId, FrameMeta, PageKey};
use super::guard::PageGuard;
use super::replacer::LruReplacer;
use crate::storage::file::{FileHandle, FileId, OpenFile};
use crate::storage::io::Storage;
use crate::storage::page::PageId;

/// Caches pages of any number of open files in a fixed set of frames.
///
/// Pages are keyed by `(FileId, PageId)`. A fetched page is pinned until
/// its [`PageGuard`] drops; unpinned pages stay cached and are recycled
/// in LRU order when a frame is needed, with dirty victims written back
/// first. When every frame is pinned, fetching fails with
/// [`BufferError::NoFreeFrames`] rather than blocking.
///
/// The pool keeps weak references to the files whose pages it caches so
/// that eviction can write a dirty victim back after the fetching caller
/// is gone. Files must be flushed (see [`flush_file`](Self::flush_file))
/// before their last handle is dropped; a dirty page whose file has been
/// closed can no longer be written back and is discarded with a warning.
pub struct BufferPool<F: Storage> {
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    files: Mutex<HashMap<FileId, Weak<OpenFile<F>>>>,
    pool_size: usize,
}

/// Mutable bookkeeping guarded by the state mutex.
struct PoolState {
    page_table: HashMap<PageKey, FrameId>,
    meta: Vec<FrameMeta>,
    free_list: Vec<FrameId>,
    replacer: LruReplacer,
}

impl<F: Storage> BufferPool<F> {
    /// Creates a pool with `pool_size` frames.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        Self {
            frames: (0..pool_size).map(|_| Frame::new()).collect(),
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                meta: (0..pool_size).map(|_| FrameMeta::new()).collect(),
                free_list: (0..pool_size).rev().map(FrameId::new).collect(),
                replacer: LruReplacer::with_capacity(pool_size),
            }),
            files: Mutex::new(HashMap::new()),
            pool_size,
        }
    }

    /// Pins a page of an open file and returns the guard holding the pin.
    ///
    /// A cached page is returned directly; otherwise the page is read
    /// from the file into a free or evicted frame.
    ///
    /// # Errors
    ///
    /// - `BufferError::NoFreeFrames` if every frame is pinned
    /// - `BufferError::Storage` if the page does not exist or I/O fails
    pub async fn fetch_page<'a>(
        &'a self,
        file: &FileHandle<F>,
        page_id: PageId,
    ) -> Result<PageGuard<'a, F>, BufferError> {
        self.register_file(file);

        let key = PageKey {
            file: file.id(),
            page: page_id,
        };
        let frame_id = self.locate_or_load(file, key).await?;

        let data = self.frames[frame_id.index()].data.write().await;
        Ok(PageGuard::new(self, frame_id, page_id, data))
    }

    /// Allocates a fresh page at the end of the file and pins it.
    ///
    /// The new page is zeroed.
    pub async fn alloc_page<'a>(
        &'a self,
        file: &FileHandle<F>,
    ) -> Result<PageGuard<'a, F>, BufferError> {
        let page_id = file.storage().allocate_page().await?;
        self.fetch_page(file, page_id).await
    }

    /// Writes back every dirty cached page of one file, then syncs it.
    ///
    /// Waits for any read in progress on the affected frames; callers
    /// must have dropped their own pins on this file's pages first.
    pub async fn flush_file(&self, file: &FileHandle<F>) -> Result<(), BufferError> {
        let file_id = file.id();
        let dirty: Vec<(FrameId, PageKey)> = {
            let state = self.state.lock();
            state
                .meta
                .iter()
                .enumerate()
                .filter_map(|(index, meta)| match meta.key {
                    Some(key) if key.file == file_id && meta.dirty => {
                        Some((FrameId::new(index), key))
                    }
                    _ => None,
                })
                .collect()
        };

        for (frame_id, key) in dirty {
            let data = self.frames[frame_id.index()].data.read().await;

            // The frame may have been evicted and reused since we scanned
            {
                let state = self.state.lock();
                if state.meta[frame_id.index()].key != Some(key) {
                    continue;
                }
            }

            file.storage().write_page(key.page, data.as_slice()).await?;

            let mut state = self.state.lock();
            if state.meta[frame_id.index()].key == Some(key) {
                state.meta[frame_id.index()].dirty = false;
            }
        }

        file.storage().sync_all().await?;
        Ok(())
    }

    /// Number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of pages currently cached.
    pub fn cached_pages(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Number of frames with at least one outstanding pin.
    ///
    /// Exposed so callers can assert their own pin accounting.
    pub fn pinned_frames(&self) -> usize {
        self.state
            .lock()
            .meta
            .iter()
            .filter(|meta| meta.pin_count > 0)
            .count()
    }

    /// Remembers the file so eviction can write its pages back later.
    fn register_file(&self, file: &FileHandle<F>) {
        let mut files = self.files.lock();
        files
            .entry(file.id())
            .or_insert_with(|| std::sync::Arc::downgrade(file));
        // Drop table entries for files that have since been closed
        files.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Finds the frame caching `key`, loading the page if absent.
    async fn locate_or_load(
        &self,
        file: &FileHandle<F>,
        key: PageKey,
    ) -> Result<FrameId, BufferError> {
        // Fast path: already cached
        {
            let mut state = self.state.lock();
            if let Some(&frame_id) = state.page_table.get(&key) {
                state.meta[frame_id.index()].pin_count += 1;
                state.replacer.pin(frame_id);
                return Ok(frame_id);
            }
        }

        let frame_id = self.take_frame().await?;

        // Read the page into the frame before publishing it
        let read_result = {
            let mut data = self.frames[frame_id.index()].data.write().await;
            file.storage().read_page(key.page, data.as_mut_slice()).await
        };
        if let Err(e) = read_result {
            let mut state = self.state.lock();
            state.free_list.push(frame_id);
            return Err(e.into());
        }

        let mut state = self.state.lock();

        // Another task may have loaded the same page while we did I/O;
        // keep theirs and recycle our frame.
        if let Some(&existing) = state.page_table.get(&key) {
            state.free_list.push(frame_id);
            state.meta[existing.index()].pin_count += 1;
            state.replacer.pin(existing);
            return Ok(existing);
        }

        state.page_table.insert(key, frame_id);
        state.meta[frame_id.index()].reset(key);
        Ok(frame_id)
    }

    /// Claims an empty frame, evicting an LRU victim if none is free.
    async fn take_frame(&self) -> Result<FrameId, BufferError> {
        {
            let mut state = self.state.lock();
            if let Some(frame_id) = state.free_list.pop() {
                return Ok(frame_id);
            }
        }

        loop {
            let (frame_id, victim_key, dirty) = {
                let mut state = self.state.lock();
                let frame_id = match state.replacer.evict() {
                    Some(id) => id,
                    None => return Err(BufferError::NoFreeFrames),
                };
                let meta = &state.meta[frame_id.index()];
                (frame_id, meta.key, meta.dirty)
            };

            // Write the victim back before reusing its frame. The file
            // table lock must not span the write, hence the binding.
            if let (Some(key), true) = (victim_key, dirty) {
                let victim_file = self.files.lock().get(&key.file).and_then(Weak::upgrade);
                match victim_file {
                    Some(victim_file) => {
                        let data = self.frames[frame_id.index()].data.read().await;
                        victim_file
                            .storage()
                            .write_page(key.page, data.as_slice())
                            .await?;
                    }
                    None => {
                        // The file was closed without a flush; its pages
                        // cannot be written back anymore.
                        warn!(
                            "dropping dirty page {} of closed file without write-back",
                            key.page
                        );
                    }
                }
            }

            let mut state = self.state.lock();

            // The frame may have been re-pinned while we wrote it back
            if state.meta[frame_id.index()].pin_count > 0 {
                continue;
            }

            if let Some(key) = state.meta[frame_id.index()].key {
                state.page_table.remove(&key);
            }
            state.meta[frame_id.index()].clear();
            return Ok(frame_id);
        }
    }

    /// Releases one pin. Called from [`PageGuard::drop`].
    pub(super) fn unpin(&self, frame_id: FrameId, dirty: bool) {
        let mut state = self.state.lock();

        debug_assert!(state.meta[frame_id.index()].pin_count > 0);
        if state.meta[frame_id.index()].pin_count == 0 {
            return;
        }

        state.meta[frame_id.index()].pin_count -= 1;
        if dirty {
            state.meta[frame_id.index()].dirty = true;
        }
        if state.meta[frame_id.index()].pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::Db;
    use crate::storage::io::{MemoryVfs, Vfs};
    use crate::storage::page::PAGE_SIZE;

    async fn open_test_file(db: &Db<MemoryVfs>, name: &str) -> FileHandle<crate::storage::MemoryStorage> {
        db.create_file(name).await.unwrap();
        db.open_file(name).await.unwrap()
    }

    #[tokio::test]
    async fn test_alloc_and_refetch() {
        let db = Db::new(MemoryVfs::new());
        let pool: BufferPool<crate::storage::MemoryStorage> = BufferPool::new(4);
        let file = open_test_file(&db, "t").await;

        let page_id = {
            let mut guard = pool.alloc_page(&file).await.unwrap();
            assert_eq!(guard.data().len(), PAGE_SIZE);
            guard.data_mut()[0] = 42;
            guard.mark_dirty();
            guard.page_id()
        };

        let guard = pool.fetch_page(&file, page_id).await.unwrap();
        assert_eq!(guard.data()[0], 42);
    }

    #[tokio::test]
    async fn test_pin_accounting() {
        let db = Db::new(MemoryVfs::new());
        let pool: BufferPool<crate::storage::MemoryStorage> = BufferPool::new(4);
        let file = open_test_file(&db, "t").await;

        assert_eq!(pool.pinned_frames(), 0);
        let guard = pool.alloc_page(&file).await.unwrap();
        assert_eq!(pool.pinned_frames(), 1);
        drop(guard);
        assert_eq!(pool.pinned_frames(), 0);
        assert_eq!(pool.cached_pages(), 1);
    }

    #[tokio::test]
    async fn test_fetch_missing_page() {
        let db = Db::new(MemoryVfs::new());
        let pool: BufferPool<crate::storage::MemoryStorage> = BufferPool::new(4);
        let file = open_test_file(&db, "t").await;

        let result = pool.fetch_page(&file, PageId::new(9)).await;
        assert!(matches!(result, Err(BufferError::Storage(_))));
        // The frame claimed for the failed read must be recycled
        assert_eq!(pool.pinned_frames(), 0);
    }

    #[tokio::test]
    async fn test_no_free_frames_when_all_pinned() {
        let db = Db::new(MemoryVfs::new());
        let pool: BufferPool<crate::storage::MemoryStorage> = BufferPool::new(2);
        let file = open_test_file(&db, "t").await;

        let _g0 = pool.alloc_page(&file).await.unwrap();
        let _g1 = pool.alloc_page(&file).await.unwrap();
        assert!(matches!(
            pool.alloc_page(&file).await,
            Err(BufferError::NoFreeFrames)
        ));
    }

    #[tokio::test]
    async fn test_eviction_writes_dirty_victim_back() {
        let db = Db::new(MemoryVfs::new());
        let pool: BufferPool<crate::storage::MemoryStorage> = BufferPool::new(2);
        let file = open_test_file(&db, "t").await;

        let page_id = {
            let mut guard = pool.alloc_page(&file).await.unwrap();
            guard.data_mut()[0] = 77;
            guard.mark_dirty();
            guard.page_id()
        };

        // Fill the pool with other pages, evicting the dirty one
        for _ in 0..2 {
            let guard = pool.alloc_page(&file).await.unwrap();
            drop(guard);
        }

        let guard = pool.fetch_page(&file, page_id).await.unwrap();
        assert_eq!(guard.data()[0], 77);
    }

    #[tokio::test]
    async fn test_clean_unpin_not_written_back() {
        let db = Db::new(MemoryVfs::new());
        let pool: BufferPool<crate::storage::MemoryStorage> = BufferPool::new(2);
        let file = open_test_file(&db, "t").await;

        let page_id = {
            let mut guard = pool.alloc_page(&file).await.unwrap();
            // Mutate but do not mark dirty: the change is not durable
            guard.data_mut()[0] = 5;
            guard.page_id()
        };

        for _ in 0..2 {
            drop(pool.alloc_page(&file).await.unwrap());
        }

        let guard = pool.fetch_page(&file, page_id).await.unwrap();
        assert_eq!(guard.data()[0], 0);
    }

    #[tokio::test]
    async fn test_flush_file_persists_dirty_pages() {
        let vfs = MemoryVfs::new();
        vfs.create("t").await.unwrap();
        let db = Db::new(vfs);
        let pool: BufferPool<crate::storage::MemoryStorage> = BufferPool::new(4);
        let file = db.open_file("t").await.unwrap();

        let page_id = {
            let mut guard = pool.alloc_page(&file).await.unwrap();
            guard.data_mut()[3] = 9;
            guard.mark_dirty();
            guard.page_id()
        };

        pool.flush_file(&file).await.unwrap();

        // Bypass the pool: the backing file must hold the bytes
        let mut buf = vec![0u8; PAGE_SIZE];
        file.storage().read_page(page_id, &mut buf).await.unwrap();
        assert_eq!(buf[3], 9);
    }

    #[tokio::test]
    async fn test_pages_of_two_files_do_not_alias() {
        let db = Db::new(MemoryVfs::new());
        let pool: BufferPool<crate::storage::MemoryStorage> = BufferPool::new(4);
        let file_a = open_test_file(&db, "a").await;
        let file_b = open_test_file(&db, "b").await;

        {
            let mut guard = pool.alloc_page(&file_a).await.unwrap();
            guard.data_mut()[0] = 1;
            guard.mark_dirty();
        }
        {
            let mut guard = pool.alloc_page(&file_b).await.unwrap();
            guard.data_mut()[0] = 2;
            guard.mark_dirty();
        }

        let a = pool.fetch_page(&file_a, PageId::new(0)).await.unwrap();
        assert_eq!(a.data()[0], 1);
        drop(a);
        let b = pool.fetch_page(&file_b, PageId::new(0)).await.unwrap();
        assert_eq!(b.data()[0], 2);
    }
}
