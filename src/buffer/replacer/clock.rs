//! CLOCK (second chance) replacement policy.

use parking_lot::RwLock;

use super::Replacer;
use crate::common::FrameId;

struct ClockState {
    tracked: Vec<bool>,
    referenced: Vec<bool>,
    hand: usize,
    size: usize,
}

impl ClockState {
    fn untrack(&mut self, index: usize) {
        if self.tracked[index] {
            self.tracked[index] = false;
            self.size -= 1;
        }
        self.referenced[index] = false;
    }
}

/// Sweeps a clock hand over the frames. A tracked frame with its reference
/// bit set gets the bit cleared and is skipped once; a tracked frame without
/// it is the victim. Newly unpinned frames start referenced.
pub struct ClockReplacer {
    state: RwLock<ClockState>,
}

impl ClockReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            state: RwLock::new(ClockState {
                tracked: vec![false; num_frames],
                referenced: vec![false; num_frames],
                hand: 0,
                size: 0,
            }),
        }
    }
}

impl Replacer for ClockReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.write();
        if state.size == 0 {
            return None;
        }

        let num_frames = state.tracked.len();
        // Two full sweeps always suffice: the first clears every reference bit.
        for _ in 0..2 * num_frames {
            let index = state.hand;
            state.hand = (state.hand + 1) % num_frames;

            if !state.tracked[index] {
                continue;
            }
            if state.referenced[index] {
                state.referenced[index] = false;
            } else {
                state.untrack(index);
                return Some(FrameId::new(index));
            }
        }
        None
    }

    fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.write();
        let index = frame_id.index();
        if index < state.tracked.len() {
            state.untrack(index);
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.write();
        let index = frame_id.index();
        if index >= state.tracked.len() {
            return;
        }
        if !state.tracked[index] {
            state.tracked[index] = true;
            state.size += 1;
        }
        state.referenced[index] = true;
    }

    fn size(&self) -> usize {
        self.state.read().size
    }

    fn reset(&self, frame_id: FrameId) {
        self.pin(frame_id);
    }
}
