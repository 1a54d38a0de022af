//! Pinned-page handles and latch guards.
//!
//! - [`PageHandle`] - A pinned page; latch it on demand with `read`/`write`
//! - [`PageReadGuard`] - Pin plus shared latch for its whole lifetime
//! - [`PageWriteGuard`] - Pin plus exclusive latch; marks the page dirty
//!
//! All three unpin the page when dropped.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

/// A page pinned in the buffer pool.
///
/// Returned by [`BufferPoolManager::fetch_page`] and
/// [`BufferPoolManager::new_page`]. Dropping the handle unpins the page,
/// reporting it dirty if [`write`](Self::write) or
/// [`mark_dirty`](Self::mark_dirty) was called.
///
/// # Example
/// ```ignore
/// let mut handle = bpm.new_page()?;
/// handle.write().as_mut_slice()[0] = 0xAB;
/// let page_id = handle.page_id();
/// drop(handle); // unpinned, dirty
/// ```
pub struct PageHandle<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    dirty: bool,
}

impl<'a> PageHandle<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame_id: FrameId, page_id: PageId) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            dirty: false,
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Take the shared page latch.
    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.bpm.frame(self.frame_id).page()
    }

    /// Take the exclusive page latch. The page will be unpinned dirty.
    pub fn write(&mut self) -> RwLockWriteGuard<'_, Page> {
        self.dirty = true;
        self.bpm.frame(self.frame_id).page_mut()
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Unpin now, OR-ing in `is_dirty`.
    pub fn unpin(mut self, is_dirty: bool) {
        self.dirty |= is_dirty;
    }

    /// Keep the pin and hand back the page id. The caller must release it
    /// with [`BufferPoolManager::unpin_page`].
    pub fn detach(self) -> PageId {
        if self.dirty {
            self.bpm.frame(self.frame_id).mark_dirty();
        }
        let page_id = self.page_id;
        std::mem::forget(self);
        page_id
    }
}

impl Drop for PageHandle<'_> {
    fn drop(&mut self) {
        self.bpm.release_frame(self.frame_id, self.dirty);
    }
}

/// Pinned page with the shared latch held.
///
/// Multiple `PageReadGuard`s can exist for the same page simultaneously.
pub struct PageReadGuard<'a> {
    // Declared first: the latch is released before the page is unpinned.
    lock: RwLockReadGuard<'a, Page>,
    handle: PageHandle<'a>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(handle: PageHandle<'a>, lock: RwLockReadGuard<'a, Page>) -> Self {
        Self { lock, handle }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.handle.page_id()
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.handle.frame_id()
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

/// Pinned page with the exclusive latch held.
///
/// The page is unpinned dirty when the guard drops.
pub struct PageWriteGuard<'a> {
    lock: RwLockWriteGuard<'a, Page>,
    handle: PageHandle<'a>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(mut handle: PageHandle<'a>, lock: RwLockWriteGuard<'a, Page>) -> Self {
        handle.mark_dirty();
        Self { lock, handle }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.handle.page_id()
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.handle.frame_id()
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        &mut self.lock
    }
}
