//! Filtered iteration over a heap file.

use super::error::HeapError;
use super::file::HeapFile;
use super::page::{DataPage, RecordId};
use crate::datum::{CompOp, Datatype, NUMERIC_WIDTH};
use crate::storage::{BufferPool, Db, PageGuard, PageId, Storage, Vfs};

/// A scan filter: compares one byte window of each record against a
/// constant.
///
/// The window is `[offset, offset + length)` of the record, interpreted
/// per `datatype`. The filter value is copied into the predicate at
/// construction, so there is no buffer to keep alive across the scan.
/// Records too short to contain the window never match.
#[derive(Debug, Clone)]
pub struct Predicate {
    offset: usize,
    length: usize,
    datatype: Datatype,
    value: Vec<u8>,
    op: CompOp,
}

impl Predicate {
    /// Builds a predicate, validating the parameter combination.
    ///
    /// # Errors
    ///
    /// `HeapError::BadScanParam` when `length` is zero, when a numeric
    /// datatype does not use a 4-byte window, or when the filter value is
    /// shorter than the window it is compared against.
    pub fn new(
        offset: usize,
        length: usize,
        datatype: Datatype,
        value: &[u8],
        op: CompOp,
    ) -> Result<Self, HeapError> {
        if length < 1 {
            return Err(HeapError::BadScanParam("length must be at least 1".into()));
        }
        if matches!(datatype, Datatype::Integer | Datatype::Float) && length != NUMERIC_WIDTH {
            return Err(HeapError::BadScanParam(format!(
                "{:?} filters require a {}-byte window, got {}",
                datatype, NUMERIC_WIDTH, length
            )));
        }
        if value.len() < length {
            return Err(HeapError::BadScanParam(format!(
                "filter value has {} bytes, window needs {}",
                value.len(),
                length
            )));
        }

        Ok(Self {
            offset,
            length,
            datatype,
            value: value[..length].to_vec(),
            op,
        })
    }

    /// Whether a record matches.
    pub fn matches(&self, rec: &[u8]) -> bool {
        if self.offset + self.length > rec.len() {
            return false;
        }
        let window = &rec[self.offset..self.offset + self.length];

        let ord = match self.datatype {
            Datatype::Integer => {
                let attr = i32::from_le_bytes(window.try_into().unwrap());
                let filter = i32::from_le_bytes(self.value[..].try_into().unwrap());
                attr.cmp(&filter)
            }
            Datatype::Float => {
                let attr = f32::from_le_bytes(window.try_into().unwrap());
                let filter = f32::from_le_bytes(self.value[..].try_into().unwrap());
                match attr.partial_cmp(&filter) {
                    Some(ord) => ord,
                    // NaN has no ordering; nothing matches it
                    None => return false,
                }
            }
            Datatype::Text => window.cmp(&self.value[..]),
        };

        self.op.matches(ord)
    }
}

/// Scan checkpoint: the page and cursor position at mark time.
#[derive(Debug, Clone, Copy)]
struct Mark {
    page_id: Option<PageId>,
    rec: Option<RecordId>,
}

/// A cursor over the records of a heap file, optionally filtered.
///
/// The scan walks the data page chain, keeping exactly one data page
/// pinned while positioned on it. Reaching the end of the chain unpins
/// the last page and latches the scan at end-of-file; further
/// [`scan_next`](Self::scan_next) calls keep returning `Ok(None)`.
pub struct HeapFileScan<'p, F: Storage> {
    file: HeapFile<'p, F>,
    predicate: Option<Predicate>,
    marked: Option<Mark>,
    at_eof: bool,
}

impl<'p, F: Storage> HeapFileScan<'p, F> {
    /// Opens a heap file for scanning.
    pub async fn open<V: Vfs<File = F>>(
        db: &Db<V>,
        pool: &'p BufferPool<F>,
        name: &str,
    ) -> Result<Self, HeapError> {
        Ok(Self {
            file: HeapFile::open(db, pool, name).await?,
            predicate: None,
            marked: None,
            at_eof: false,
        })
    }

    /// The underlying heap file.
    pub fn file(&self) -> &HeapFile<'p, F> {
        &self.file
    }

    /// Positions the scan before the first record and installs the
    /// filter; `None` scans unconditionally.
    ///
    /// Parameter validation happens in [`Predicate::new`].
    pub fn start_scan(&mut self, predicate: Option<Predicate>) {
        self.predicate = predicate;
        self.file.cur = None;
        self.file.cur_rec = None;
        self.at_eof = false;
    }

    /// Advances to the next matching record and returns its id.
    ///
    /// Returns `Ok(None)` once the file is exhausted; the scan then
    /// stays at end-of-file until the next [`start_scan`](Self::start_scan)
    /// or [`reset`](Self::reset).
    pub async fn scan_next(&mut self) -> Result<Option<RecordId>, HeapError> {
        if self.at_eof {
            return Ok(None);
        }

        // First call (or first after a reset to the start): pin the head
        // of the data page chain.
        if self.file.cur.is_none() {
            match self.file.header.first_page {
                None => {
                    self.at_eof = true;
                    return Ok(None);
                }
                Some(first) => self.file.move_to(first).await?,
            }
        }

        enum Step {
            Advance(RecordId, bool),
            Hop(PageId),
            Eof,
        }

        loop {
            // Examine the pinned page in a scope of its own, so the page
            // borrow ends before the cursor moves or the pin swaps.
            let step = match self.file.cur.as_ref() {
                None => Step::Eof,
                Some(guard) => {
                    let page = DataPage::new(guard.data());

                    // Candidate: first record of a freshly pinned page, or
                    // the successor of the cursor. A deleted cursor record
                    // is fine; next_slot yields the following live slot
                    // either way.
                    let candidate = match self.file.cur_rec {
                        None => page.first_slot(),
                        Some(rid) => page.next_slot(rid.slot_id),
                    };

                    match candidate {
                        Some(slot_id) => {
                            let rid = RecordId::new(guard.page_id(), slot_id);
                            let matched = match page.read(slot_id) {
                                Some(rec) => {
                                    self.predicate.as_ref().map_or(true, |p| p.matches(rec))
                                }
                                None => false,
                            };
                            Step::Advance(rid, matched)
                        }
                        // Page exhausted (or empty): hop along the chain
                        None => match page.next_page() {
                            Some(next) => Step::Hop(next),
                            None => Step::Eof,
                        },
                    }
                }
            };

            match step {
                Step::Advance(rid, matched) => {
                    self.file.cur_rec = Some(rid);
                    if matched {
                        return Ok(Some(rid));
                    }
                }
                Step::Hop(next) => self.file.move_to(next).await?,
                Step::Eof => {
                    self.file.cur = None;
                    self.file.cur_rec = None;
                    self.at_eof = true;
                    return Ok(None);
                }
            }
        }
    }

    /// Returns the record under the cursor.
    ///
    /// # Errors
    ///
    /// `HeapError::NoCurrentRecord` before the first successful
    /// [`scan_next`](Self::scan_next) or after the cursor was cleared.
    pub fn record(&self) -> Result<&[u8], HeapError> {
        let rid = self.file.cur_rec.ok_or(HeapError::NoCurrentRecord)?;
        let guard = self.file.cur.as_ref().ok_or(HeapError::NoCurrentRecord)?;
        DataPage::new(guard.data())
            .into_record(rid.slot_id)
            .ok_or(HeapError::RecordNotFound(rid))
    }

    /// Deletes the record under the cursor.
    ///
    /// The cursor does not advance: the next [`scan_next`](Self::scan_next)
    /// resumes from the deleted position and yields the following live
    /// record. The current page and the header (record count) are marked
    /// dirty.
    pub fn delete_record(&mut self) -> Result<(), HeapError> {
        let rid = self.file.cur_rec.ok_or(HeapError::NoCurrentRecord)?;
        {
            let guard = self.file.cur.as_mut().ok_or(HeapError::NoCurrentRecord)?;
            DataPage::new(guard.data_mut()).delete(rid.slot_id)?;
            guard.mark_dirty();
        }
        self.file.header.rec_cnt -= 1;
        self.file.write_header();
        Ok(())
    }

    /// Snapshots the scan position for a later [`reset`](Self::reset).
    pub fn mark(&mut self) {
        self.marked = Some(Mark {
            page_id: self.file.cur.as_ref().map(PageGuard::page_id),
            rec: self.file.cur_rec,
        });
    }

    /// Restores the position of the last [`mark`](Self::mark).
    ///
    /// If the marked page differs from the one currently pinned, the
    /// current page is unpinned and the marked page pinned again; on the
    /// same page only the cursor is restored. Without a prior mark the
    /// scan rewinds to the start; pin bookkeeping stays intact either
    /// way.
    pub async fn reset(&mut self) -> Result<(), HeapError> {
        let mark = self.marked.unwrap_or(Mark {
            page_id: None,
            rec: None,
        });

        if self.file.cur.as_ref().map(PageGuard::page_id) != mark.page_id {
            self.file.cur = None;
            if let Some(page_id) = mark.page_id {
                self.file.move_to(page_id).await?;
            }
        }
        self.file.cur_rec = mark.rec;
        self.at_eof = false;
        Ok(())
    }

    /// Marks the current data page dirty, for callers that mutated the
    /// record bytes in place.
    pub fn mark_dirty(&mut self) -> Result<(), HeapError> {
        let guard = self.file.cur.as_mut().ok_or(HeapError::NoCurrentRecord)?;
        guard.mark_dirty();
        Ok(())
    }

    /// Ends the scan: unpins the current page (with its dirty state) and
    /// clears the cursor. Safe to call repeatedly.
    pub fn end_scan(&mut self) {
        self.file.cur = None;
        self.file.cur_rec = None;
    }

    /// Ends the scan and closes the underlying file.
    pub async fn close(mut self) -> Result<(), HeapError> {
        self.end_scan();
        self.file.close().await
    }
}
