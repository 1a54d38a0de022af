//! Eviction policy implementations (replacers).
//!
//! A replacer tracks which frames may be evicted and picks the victim when
//! the buffer pool runs out of free frames:
//! - [`LruReplacer`] - Least Recently Used
//! - [`ClockReplacer`] - CLOCK (second chance)
//!
//! Both guard their state with an internal lock so the buffer pool can share
//! one instance behind `&self`.

mod clock;
mod lru;

pub use clock::ClockReplacer;
pub use lru::LruReplacer;

use crate::common::FrameId;

/// Victim selection over frames `0..num_frames`.
///
/// A frame is *tracked* (eligible for eviction) between an `unpin` and the
/// next `pin`, `reset` or its selection as victim.
pub trait Replacer: Send + Sync {
    /// Select and stop tracking one evictable frame.
    fn victim(&self) -> Option<FrameId>;

    /// The frame is in use and must not be evicted.
    fn pin(&self, frame_id: FrameId);

    /// The frame's pin count dropped to zero; it may be evicted.
    fn unpin(&self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;

    /// Forget the frame entirely (its page was deleted).
    fn reset(&self, frame_id: FrameId);
}

/// Replacement policy selector.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReplacerKind {
    #[default]
    Lru,
    Clock,
}

impl ReplacerKind {
    /// Build a replacer of this kind for `num_frames` frames.
    pub fn build(self, num_frames: usize) -> Box<dyn Replacer> {
        match self {
            ReplacerKind::Lru => Box::new(LruReplacer::new(num_frames)),
            ReplacerKind::Clock => Box::new(ClockReplacer::new(num_frames)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_each_kind() {
        for kind in [ReplacerKind::Lru, ReplacerKind::Clock] {
            let replacer = kind.build(4);
            assert_eq!(replacer.size(), 0);
            replacer.unpin(FrameId::new(2));
            assert_eq!(replacer.size(), 1);
            assert_eq!(replacer.victim(), Some(FrameId::new(2)));
            assert_eq!(replacer.victim(), None);
        }
    }

    #[test]
    fn test_default_is_lru() {
        assert_eq!(ReplacerKind::default(), ReplacerKind::Lru);
    }
}
