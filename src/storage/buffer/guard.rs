//! Scoped pin on a buffered page.

use tokio::sync::RwLockWriteGuard;

use super::frame::FrameId;
use super::pool::BufferPool;
use crate::storage::io::Storage;
use crate::storage::page::{PageData, PageId};

/// A pinned page.
///
/// The guard is the unit of the pin protocol: fetching a page pins it,
/// dropping the guard unpins it, exactly once, on every exit path. The
/// dirty flag travels with the guard — callers record mutations with
/// [`mark_dirty`](Self::mark_dirty), and the accumulated flag is folded
/// into the frame's dirty bit at unpin time.
///
/// The guard also holds the frame's data lock, so page bytes cannot
/// change underneath a pin.
pub struct PageGuard<'a, F: Storage> {
    pool: &'a BufferPool<F>,
    frame_id: FrameId,
    page_id: PageId,
    data: RwLockWriteGuard<'a, PageData>,
    dirty: bool,
}

impl<'a, F: Storage> PageGuard<'a, F> {
    pub(super) fn new(
        pool: &'a BufferPool<F>,
        frame_id: FrameId,
        page_id: PageId,
        data: RwLockWriteGuard<'a, PageData>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            data,
            dirty: false,
        }
    }

    /// Number of the pinned page within its file.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// The page bytes.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// The page bytes, mutably.
    ///
    /// Mutating through this method does NOT set the dirty flag; callers
    /// decide what counts as a durable modification via `mark_dirty`.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }

    /// Records that the page was modified under this pin.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether a modification was recorded under this pin.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl<F: Storage> Drop for PageGuard<'_, F> {
    fn drop(&mut self) {
        // Unpin is synchronous bookkeeping, safe from Drop. The data lock
        // is released right after, when the field itself drops.
        self.pool.unpin(self.frame_id, self.dirty);
    }
}
