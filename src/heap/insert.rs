//! Appending records to a heap file.

use super::error::HeapError;
use super::file::HeapFile;
use super::page::{DataPage, RecordId, MAX_RECORD_SIZE};
use crate::storage::{BufferPool, Db, PageGuard, Storage, Vfs};

/// Appends records at the tail of a heap file, growing the page chain
/// when the tail fills up.
pub struct InsertFileScan<'p, F: Storage> {
    file: HeapFile<'p, F>,
}

impl<'p, F: Storage> InsertFileScan<'p, F> {
    /// Opens a heap file for appending, with the tail page pinned.
    ///
    /// A failure to swap the pin from the first page to the tail is
    /// fatal: the scan is not constructed and all pins unwind.
    pub async fn open<V: Vfs<File = F>>(
        db: &Db<V>,
        pool: &'p BufferPool<F>,
        name: &str,
    ) -> Result<Self, HeapError> {
        let mut file = HeapFile::open(db, pool, name).await?;

        let last = file.header.last_page.ok_or_else(|| {
            HeapError::Corrupted(format!("heap file {:?} has no tail page", name))
        })?;
        if file.cur.as_ref().map(PageGuard::page_id) != Some(last) {
            file.move_to(last).await?;
        }

        Ok(Self { file })
    }

    /// The underlying heap file.
    pub fn file(&self) -> &HeapFile<'p, F> {
        &self.file
    }

    /// Appends a record and returns its id.
    ///
    /// Tries the pinned tail page first; when it is full, allocates a
    /// new page, links it at the end of the chain, updates the header
    /// (tail pointer, page count), and inserts there. The retry cannot
    /// run out of space: the length check guarantees the record fits an
    /// empty page.
    ///
    /// # Errors
    ///
    /// `HeapError::InvalidRecordLength` when the record exceeds
    /// [`MAX_RECORD_SIZE`]; buffer pool and storage errors propagate.
    pub async fn insert_record(&mut self, rec: &[u8]) -> Result<RecordId, HeapError> {
        if rec.len() > MAX_RECORD_SIZE {
            return Err(HeapError::InvalidRecordLength {
                length: rec.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        if self.file.cur.is_none() {
            let last = self.file.header.last_page.ok_or_else(|| {
                HeapError::Corrupted("heap file has no tail page".to_string())
            })?;
            self.file.move_to(last).await?;
        }

        let (page_id, first_try) = {
            let guard = self.file.cur.as_mut().ok_or(HeapError::NoCurrentRecord)?;
            let result = DataPage::new(guard.data_mut()).insert(rec);
            if result.is_ok() {
                guard.mark_dirty();
            }
            (guard.page_id(), result)
        };

        match first_try {
            Ok(slot_id) => {
                self.file.header.rec_cnt += 1;
                self.file.write_header();
                Ok(RecordId::new(page_id, slot_id))
            }
            Err(HeapError::PageFull { .. }) => self.append_page_and_insert(rec).await,
            Err(e) => Err(e),
        }
    }

    /// Grows the chain by one page and inserts the record there.
    async fn append_page_and_insert(&mut self, rec: &[u8]) -> Result<RecordId, HeapError> {
        let mut new_guard = self.file.pool.alloc_page(&self.file.file).await?;
        let new_page_id = new_guard.page_id();
        DataPage::new(new_guard.data_mut()).init();
        new_guard.mark_dirty();

        // Link the old tail forward
        {
            let old = self.file.cur.as_mut().ok_or(HeapError::NoCurrentRecord)?;
            DataPage::new(old.data_mut()).set_next_page(Some(new_page_id));
            old.mark_dirty();
        }

        self.file.header.last_page = Some(new_page_id);
        self.file.header.page_cnt += 1;
        self.file.write_header();

        let slot_id = DataPage::new(new_guard.data_mut()).insert(rec)?;
        self.file.header.rec_cnt += 1;
        self.file.write_header();

        // The new tail becomes the current page; the old pin drops here,
        // carrying its dirty flag
        self.file.cur = Some(new_guard);
        self.file.cur_rec = None;

        Ok(RecordId::new(new_page_id, slot_id))
    }

    /// Closes the underlying file, unpinning the tail page.
    pub async fn close(self) -> Result<(), HeapError> {
        self.file.close().await
    }
}
