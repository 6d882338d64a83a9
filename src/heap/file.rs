//! Heap file creation, destruction, and random record access.

use log::{debug, warn};

use super::error::HeapError;
use super::header::FileHeader;
use super::page::{DataPage, RecordId};
use crate::storage::{BufferPool, Db, FileHandle, PageGuard, PageId, Storage, Vfs};

/// Creates an empty heap file: a header page plus one empty data page.
///
/// # Errors
///
/// `HeapError::FileExists` if a file of this name already opens
/// successfully. Any later failure leaves no pins behind (guards drop on
/// every exit path); the half-created file itself is left for the caller
/// to destroy.
pub async fn create_heap_file<V: Vfs>(
    db: &Db<V>,
    pool: &BufferPool<V::File>,
    name: &str,
) -> Result<(), HeapError> {
    if db.open_file(name).await.is_ok() {
        return Err(HeapError::FileExists(name.to_string()));
    }

    db.create_file(name).await?;
    let file = db.open_file(name).await?;

    {
        // Page 0 becomes the header page, page 1 the first data page
        let mut header_guard = pool.alloc_page(&file).await?;
        let mut data_guard = pool.alloc_page(&file).await?;

        DataPage::new(data_guard.data_mut()).init();
        data_guard.mark_dirty();

        let header = FileHeader::new(name, data_guard.page_id());
        header_guard.data_mut().fill(0);
        header.write_to(header_guard.data_mut());
        header_guard.mark_dirty();
    }

    pool.flush_file(&file).await?;
    debug!("created heap file {:?}", name);
    Ok(())
}

/// Removes a heap file from the file layer.
pub async fn destroy_heap_file<V: Vfs>(db: &Db<V>, name: &str) -> Result<(), HeapError> {
    db.destroy_file(name).await?;
    Ok(())
}

/// An open heap file.
///
/// Holds at most two pins for its whole lifetime: the header page,
/// pinned from open to close, and one current data page. Both pins are
/// [`PageGuard`]s, so they are released exactly once no matter how the
/// file goes away, carrying whatever dirty state accumulated.
///
/// Header mutations go through [`write_header`](Self::write_header),
/// which re-encodes the cached [`FileHeader`] into the pinned header
/// page and marks it dirty.
pub struct HeapFile<'p, F: Storage> {
    pub(super) pool: &'p BufferPool<F>,
    pub(super) file: FileHandle<F>,
    pub(super) header_guard: PageGuard<'p, F>,
    pub(super) header: FileHeader,
    /// The currently pinned data page, if any.
    pub(super) cur: Option<PageGuard<'p, F>>,
    /// Cursor: the record most recently touched on the current page.
    pub(super) cur_rec: Option<RecordId>,
}

impl<'p, F: Storage> HeapFile<'p, F> {
    /// Opens a heap file: pins the header page and the first data page.
    ///
    /// On failure, pins acquired so far unwind via guard drops and the
    /// file handle drop closes the file.
    pub async fn open<V: Vfs<File = F>>(
        db: &Db<V>,
        pool: &'p BufferPool<F>,
        name: &str,
    ) -> Result<Self, HeapError> {
        debug!("opening heap file {:?}", name);
        let file = db.open_file(name).await?;

        let header_page_id = file.first_page().await?;
        let header_guard = pool.fetch_page(&file, header_page_id).await?;
        let header = FileHeader::read_from(header_guard.data());

        let first_page = header.first_page.ok_or_else(|| {
            HeapError::Corrupted(format!("heap file {:?} has no data pages", name))
        })?;
        let cur = pool.fetch_page(&file, first_page).await?;

        Ok(Self {
            pool,
            file,
            header_guard,
            header,
            cur: Some(cur),
            cur_rec: None,
        })
    }

    /// Name recorded in the file header.
    pub fn name(&self) -> &str {
        &self.header.file_name
    }

    /// Number of live records in the file.
    pub fn rec_count(&self) -> u32 {
        self.header.rec_cnt
    }

    /// Number of pages in the file, header page included.
    pub fn page_count(&self) -> u32 {
        self.header.page_cnt
    }

    /// Returns the record stored at `rid`.
    ///
    /// If the record lives on a different page than the one currently
    /// pinned, the current page is unpinned (with its dirty state) and
    /// the target page pinned in its place. On success the cursor moves
    /// to `rid`.
    pub async fn record(&mut self, rid: RecordId) -> Result<&[u8], HeapError> {
        if self.cur.as_ref().map(PageGuard::page_id) != Some(rid.page_id) {
            self.move_to(rid.page_id).await?;
        }

        let guard = self.cur.as_ref().ok_or(HeapError::RecordNotFound(rid))?;
        match DataPage::new(guard.data()).into_record(rid.slot_id) {
            Some(rec) => {
                self.cur_rec = Some(rid);
                Ok(rec)
            }
            None => Err(HeapError::RecordNotFound(rid)),
        }
    }

    /// Swaps the current pin over to `page_id`, resetting the cursor.
    pub(super) async fn move_to(&mut self, page_id: PageId) -> Result<(), HeapError> {
        // Release the old pin first so its frame can serve the fetch
        self.cur = None;
        self.cur_rec = None;
        let guard = self.pool.fetch_page(&self.file, page_id).await?;
        self.cur = Some(guard);
        Ok(())
    }

    /// Re-encodes the cached header into the pinned header page.
    pub(super) fn write_header(&mut self) {
        self.header.write_to(self.header_guard.data_mut());
        self.header_guard.mark_dirty();
    }

    /// Closes the file: unpins both pages, flushes, and drops the handle.
    ///
    /// Dropping a `HeapFile` without calling this still releases every
    /// pin, but modified pages then reach disk only via buffer pool
    /// write-back, not an explicit flush.
    pub async fn close(self) -> Result<(), HeapError> {
        let HeapFile {
            pool,
            file,
            header_guard,
            cur,
            ..
        } = self;
        drop(cur);
        drop(header_guard);

        if let Err(e) = pool.flush_file(&file).await {
            warn!("flush of heap file {:?} on close failed: {}", file.name(), e);
            return Err(e.into());
        }
        Ok(())
    }
}
