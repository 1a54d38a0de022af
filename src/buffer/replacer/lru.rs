//! LRU (Least Recently Used) replacement policy.

use parking_lot::RwLock;

use super::Replacer;
use crate::common::FrameId;

struct LruState {
    /// Access stamp per frame; `None` until the frame is first used.
    stamps: Vec<Option<u64>>,
    evictable: Vec<bool>,
    tick: u64,
    size: usize,
}

impl LruState {
    fn touch(&mut self, index: usize) {
        self.stamps[index] = Some(self.tick);
        self.tick += 1;
    }

    fn untrack(&mut self, index: usize) {
        if self.evictable[index] {
            self.evictable[index] = false;
            self.size -= 1;
        }
    }
}

/// Evicts the evictable frame with the oldest access stamp.
///
/// Frames are stamped when pinned and again when they become evictable, so
/// frames unpinned in the order A, B, C are evicted in that order. Ties are
/// broken by lowest frame index.
pub struct LruReplacer {
    state: RwLock<LruState>,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            state: RwLock::new(LruState {
                stamps: vec![None; num_frames],
                evictable: vec![false; num_frames],
                tick: 0,
                size: 0,
            }),
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.write();

        let index = (0..state.stamps.len())
            .filter(|&i| state.evictable[i])
            .filter_map(|i| state.stamps[i].map(|stamp| (stamp, i)))
            .min()
            .map(|(_, i)| i)?;

        state.untrack(index);
        state.stamps[index] = None;
        Some(FrameId::new(index))
    }

    fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.write();
        let index = frame_id.index();
        if index >= state.stamps.len() {
            return;
        }
        state.untrack(index);
        state.touch(index);
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.write();
        let index = frame_id.index();
        if index >= state.stamps.len() || state.evictable[index] {
            return;
        }
        state.evictable[index] = true;
        state.size += 1;
        state.touch(index);
    }

    fn size(&self) -> usize {
        self.state.read().size
    }

    fn reset(&self, frame_id: FrameId) {
        let mut state = self.state.write();
        let index = frame_id.index();
        if index >= state.stamps.len() {
            return;
        }
        state.untrack(index);
        state.stamps[index] = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(i: usize) -> FrameId {
        FrameId::new(i)
    }

    #[test]
    fn test_victims_follow_unpin_order() {
        let replacer = LruReplacer::new(4);
        for i in 0..3 {
            replacer.pin(f(i));
        }
        replacer.unpin(f(2));
        replacer.unpin(f(0));
        replacer.unpin(f(1));

        assert_eq!(replacer.size(), 3);
        assert_eq!(replacer.victim(), Some(f(2)));
        assert_eq!(replacer.victim(), Some(f(0)));
        assert_eq!(replacer.victim(), Some(f(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_removes_from_candidates() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(f(0));
        replacer.unpin(f(1));
        replacer.pin(f(0));

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(f(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_repin_refreshes_recency() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(f(0));
        replacer.unpin(f(1));
        replacer.pin(f(0));
        replacer.unpin(f(0));

        assert_eq!(replacer.victim(), Some(f(1)));
        assert_eq!(replacer.victim(), Some(f(0)));
    }

    #[test]
    fn test_duplicate_unpin_counts_once() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(f(3));
        replacer.unpin(f(3));
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_reset_and_out_of_range() {
        let replacer = LruReplacer::new(2);
        replacer.unpin(f(0));
        replacer.reset(f(0));
        replacer.unpin(f(9));
        replacer.pin(f(9));

        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }
}
