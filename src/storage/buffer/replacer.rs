//! LRU victim selection for frame eviction.

use std::collections::{HashSet, VecDeque};

use super::frame::FrameId;

/// Tracks which frames are evictable (pin count zero) and picks victims
/// in least-recently-unpinned order.
///
/// The membership set is the source of truth; the queue may hold stale
/// entries for frames that were re-pinned after being queued. Stale
/// entries are discarded lazily during [`evict`](Self::evict), which
/// keeps [`pin`](Self::pin) and [`unpin`](Self::unpin) O(1) at the cost
/// of approximate ordering for frames that cycle between pinned and
/// unpinned.
pub(super) struct LruReplacer {
    /// Candidate victims, oldest at the front. May contain stale entries.
    queue: VecDeque<FrameId>,
    /// Frames currently evictable.
    evictable: HashSet<FrameId>,
}

impl LruReplacer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            evictable: HashSet::with_capacity(capacity),
        }
    }

    /// Picks and removes the oldest evictable frame, or `None` if every
    /// frame is pinned.
    pub fn evict(&mut self) -> Option<FrameId> {
        while let Some(frame_id) = self.queue.pop_front() {
            if self.evictable.remove(&frame_id) {
                return Some(frame_id);
            }
        }
        None
    }

    /// Marks a frame non-evictable. Called when its pin count leaves zero.
    pub fn pin(&mut self, frame_id: FrameId) {
        self.evictable.remove(&frame_id);
    }

    /// Marks a frame evictable. Called when its pin count reaches zero.
    pub fn unpin(&mut self, frame_id: FrameId) {
        if self.evictable.insert(frame_id) {
            self.queue.push_back(frame_id);
        }
    }

    /// Number of evictable frames.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.evictable.len()
    }
}
