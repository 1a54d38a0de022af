//! Buffer Pool Manager - the page cache between the B+ tree and the disk.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory
//! - Pin-based reference counting
//! - Dirty page write-back on eviction
//! - Pluggable eviction policies ([`ReplacerKind`])

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;

use log::{debug, error};
use parking_lot::Mutex;

use crate::buffer::replacer::{Replacer, ReplacerKind};
use crate::buffer::{BufferPoolStats, Frame, PageHandle, PageReadGuard, PageWriteGuard};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::DiskManager;

/// Page table and free list. Both change together, so one lock guards them.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    /// Frames that hold no page, handed out front first.
    free_list: VecDeque<FrameId>,
}

/// Manages a pool of buffer frames for caching disk pages.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌──────────────────────────┐  ┌────────────────────────┐   │
/// │  │ state (Mutex)            │  │   frames: Vec<Frame>   │   │
/// │  │  page_table PageId → Fid │─▶│ [Frame0] [Frame1] ...  │   │
/// │  │  free_list               │  └────────────────────────┘   │
/// │  └──────────────────────────┘                               │
/// │  ┌──────────────────────┐  ┌──────────────────────────┐     │
/// │  │ replacer (LRU/CLOCK) │  │ disk_manager (Mutex)     │     │
/// │  └──────────────────────┘  └──────────────────────────┘     │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Pinning
/// A page with a non-zero pin count is never evicted. `fetch_page` and
/// `new_page` return the page pinned once; the returned [`PageHandle`]
/// unpins it on drop. Callers that want the raw protocol call
/// [`PageHandle::detach`] and later [`unpin_page`](Self::unpin_page).
///
/// # Locking
/// Locks are taken in the order: pool state, replacer, disk manager, page
/// latch. Do not call [`flush_page`](Self::flush_page) or
/// [`delete_page`](Self::delete_page) while holding a latch on that page.
///
/// # Usage
/// ```ignore
/// let dm = DiskManager::create("test.db")?;
/// let bpm = BufferPoolManager::new(10, dm);
///
/// let page_id = {
///     let mut guard = bpm.new_page_write()?;
///     guard.as_mut_slice()[0] = 0xAB;
///     guard.page_id()
/// };
///
/// let guard = bpm.fetch_page_read(page_id)?;
/// assert_eq!(guard.as_slice()[0], 0xAB);
/// ```
pub struct BufferPoolManager {
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    replacer: Box<dyn Replacer>,
    disk_manager: Mutex<DiskManager>,
    stats: BufferPoolStats,
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a buffer pool with an LRU replacer.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        Self::with_replacer(pool_size, disk_manager, ReplacerKind::default())
    }

    /// Create a buffer pool with the given replacement policy.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn with_replacer(pool_size: usize, disk_manager: DiskManager, kind: ReplacerKind) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        Self {
            frames: (0..pool_size).map(|_| Frame::new()).collect(),
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list: (0..pool_size).map(FrameId::new).collect(),
            }),
            replacer: kind.build(pool_size),
            disk_manager: Mutex::new(disk_manager),
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Pin a page, reading it from disk if it is not resident.
    ///
    /// # Errors
    /// - `Error::InvalidPageId` for the sentinel or out-of-range ids
    /// - `Error::NoFreeFrames` if every frame is pinned
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageHandle<'_>> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(PageHandle::new(self, frame_id, page_id))
    }

    /// Pin a page and hold its shared latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let handle = self.fetch_page(page_id)?;
        let lock = self.frames[handle.frame_id().index()].page();
        Ok(PageReadGuard::new(handle, lock))
    }

    /// Pin a page and hold its exclusive latch. The page is unpinned dirty.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let handle = self.fetch_page(page_id)?;
        let lock = self.frames[handle.frame_id().index()].page_mut();
        Ok(PageWriteGuard::new(handle, lock))
    }

    // ========================================================================
    // Public API: Create and delete pages
    // ========================================================================

    /// Allocate a fresh page on disk and pin it in a zeroed frame.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if every frame is pinned
    /// - `Error::OutOfPages` if the disk has no page ids left
    pub fn new_page(&self) -> Result<PageHandle<'_>> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = match self.disk_manager.lock().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                state.free_list.push_front(frame_id);
                return Err(e);
            }
        };

        let frame = &self.frames[frame_id.index()];
        frame.page_mut().reset();
        frame.set_page_id(Some(page_id));
        frame.set_pin_count(1);
        // The id may be recycled; the zeroed bytes must reach disk.
        frame.mark_dirty();

        self.replacer.pin(frame_id);
        state.page_table.insert(page_id, frame_id);
        self.stats.allocations.fetch_add(1, Ordering::Relaxed);

        Ok(PageHandle::new(self, frame_id, page_id))
    }

    /// [`new_page`](Self::new_page) with the exclusive latch held.
    pub fn new_page_write(&self) -> Result<PageWriteGuard<'_>> {
        let handle = self.new_page()?;
        let lock = self.frames[handle.frame_id().index()].page_mut();
        Ok(PageWriteGuard::new(handle, lock))
    }

    /// Drop a page from the pool and release its id on disk.
    ///
    /// The id is deallocated on disk whether or not the page is resident.
    ///
    /// # Errors
    /// - `Error::PagePinned` if the page is resident and pinned
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.index()];
            if frame.is_pinned() {
                return Err(Error::PagePinned(page_id.0));
            }

            state.page_table.remove(&page_id);
            self.replacer.reset(frame_id);
            frame.reset();
            state.free_list.push_back(frame_id);
        }

        self.disk_manager.lock().deallocate_page(page_id)?;
        self.stats.deallocations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    // ========================================================================
    // Public API: Unpin and flush
    // ========================================================================

    /// Release one pin on a resident page, OR-ing in `is_dirty`.
    ///
    /// Returns `false` if the page is not resident. Unpinning a page whose
    /// pin count is already zero leaves it at zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        match state.page_table.get(&page_id) {
            Some(&frame_id) => {
                self.unpin_frame(frame_id, is_dirty);
                true
            }
            None => false,
        }
    }

    /// Write a resident page to disk, dirty or not.
    ///
    /// Returns `false` if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.state.lock();
        match state.page_table.get(&page_id) {
            Some(&frame_id) => {
                self.write_frame(frame_id, page_id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();
        for (&page_id, &frame_id) in state.page_table.iter() {
            self.write_frame(frame_id, page_id)?;
        }
        Ok(())
    }

    /// Whether the disk allocator considers `page_id` unallocated.
    pub fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        self.disk_manager.lock().is_page_free(page_id)
    }

    // ========================================================================
    // Public API: Stats and introspection
    // ========================================================================

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of resident pages.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Number of frames the replacer may evict.
    pub fn evictable_count(&self) -> usize {
        self.replacer.size()
    }

    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id.index()].pin_count())
    }

    /// Whether every frame has a pin count of zero.
    pub fn check_all_unpinned(&self) -> bool {
        let _state = self.state.lock();
        self.frames.iter().all(|frame| !frame.is_pinned())
    }

    // ========================================================================
    // Internal: called by page handles
    // ========================================================================

    #[inline]
    pub(crate) fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.index()]
    }

    pub(crate) fn release_frame(&self, frame_id: FrameId, is_dirty: bool) {
        let _state = self.state.lock();
        self.unpin_frame(frame_id, is_dirty);
    }

    /// Caller holds the state lock.
    fn unpin_frame(&self, frame_id: FrameId, is_dirty: bool) {
        let frame = &self.frames[frame_id.index()];
        if is_dirty {
            frame.mark_dirty();
        }
        if frame.pin_count() == 0 {
            return;
        }
        if frame.unpin() == 0 {
            self.replacer.unpin(frame_id);
        }
    }

    // ========================================================================
    // Internal: fetch, eviction and write-back
    // ========================================================================

    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.frames[frame_id.index()].pin();
            self.replacer.pin(frame_id);
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(frame_id);
        }

        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
        let frame_id = self.acquire_frame(&mut state)?;

        let page = match self.disk_manager.lock().read_page(page_id) {
            Ok(page) => page,
            Err(e) => {
                state.free_list.push_front(frame_id);
                return Err(e);
            }
        };
        self.stats.pages_read.fetch_add(1, Ordering::Relaxed);

        let frame = &self.frames[frame_id.index()];
        frame.page_mut().copy_from(&page);
        frame.set_page_id(Some(page_id));
        frame.set_pin_count(1);
        frame.clear_dirty();

        self.replacer.pin(frame_id);
        state.page_table.insert(page_id, frame_id);
        Ok(frame_id)
    }

    /// An empty frame: from the free list, otherwise by evicting a victim.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(Error::NoFreeFrames)?;
        let frame = &self.frames[frame_id.index()];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                if let Err(e) = self.write_frame(frame_id, old_page_id) {
                    self.replacer.unpin(frame_id);
                    return Err(e);
                }
            }
            state.page_table.remove(&old_page_id);
            debug!("evicted {} from {}", old_page_id, frame_id);
        }

        frame.set_page_id(None);
        frame.clear_dirty();
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        Ok(frame_id)
    }

    fn write_frame(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id.index()];
        let page = frame.page();
        self.disk_manager.lock().write_page(page_id, &page)?;
        drop(page);

        frame.clear_dirty();
        self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            error!("flushing buffer pool on shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_bpm(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("test.db")).unwrap();
        (BufferPoolManager::new(pool_size, dm), dir)
    }

    #[test]
    fn test_new_page_is_pinned_once() {
        let (bpm, _dir) = create_test_bpm(10);

        let handle = bpm.new_page().unwrap();
        let page_id = handle.page_id();
        assert_eq!(page_id, PageId::new(0));
        assert_eq!(bpm.get_pin_count(page_id), Some(1));

        drop(handle);
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
        assert_eq!(bpm.evictable_count(), 1);
    }

    #[test]
    fn test_free_list_is_fifo() {
        let (bpm, _dir) = create_test_bpm(4);

        let a = bpm.new_page().unwrap();
        let b = bpm.new_page().unwrap();
        assert_eq!(a.frame_id(), FrameId::new(0));
        assert_eq!(b.frame_id(), FrameId::new(1));
    }

    #[test]
    fn test_detach_and_unpin_page() {
        let (bpm, _dir) = create_test_bpm(4);

        let page_id = bpm.new_page().unwrap().detach();
        assert_eq!(bpm.get_pin_count(page_id), Some(1));

        assert!(bpm.unpin_page(page_id, true));
        assert_eq!(bpm.get_pin_count(page_id), Some(0));

        // Clamped at zero.
        assert!(bpm.unpin_page(page_id, false));
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
        assert_eq!(bpm.evictable_count(), 1);

        assert!(!bpm.unpin_page(PageId::new(77), false));
    }

    #[test]
    fn test_write_then_read_guard() {
        let (bpm, _dir) = create_test_bpm(10);

        let page_id = {
            let mut guard = bpm.new_page_write().unwrap();
            guard.as_mut_slice()[0] = 0xAB;
            guard.page_id()
        };

        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.as_slice()[0], 0xAB);
        assert_eq!(bpm.stats().snapshot().cache_hits, 1);
    }

    #[test]
    fn test_dirty_page_written_back_on_eviction() {
        let (bpm, _dir) = create_test_bpm(1);

        let first = {
            let mut guard = bpm.new_page_write().unwrap();
            guard.as_mut_slice()[0] = 0x42;
            guard.page_id()
        };

        // Evicts `first`, writing it back.
        drop(bpm.new_page().unwrap());
        assert!(!bpm.contains_page(first));

        let guard = bpm.fetch_page_read(first).unwrap();
        assert_eq!(guard.as_slice()[0], 0x42);
        assert_eq!(bpm.stats().snapshot().evictions, 2);
    }

    #[test]
    fn test_delete_page() {
        let (bpm, _dir) = create_test_bpm(10);
        let page_id = bpm.new_page().unwrap().page_id();

        bpm.delete_page(page_id).unwrap();

        assert!(!bpm.contains_page(page_id));
        assert_eq!(bpm.free_frame_count(), 10);
        assert_eq!(bpm.evictable_count(), 0);
        assert!(bpm.is_page_free(page_id).unwrap());

        // The id is handed out again.
        assert_eq!(bpm.new_page().unwrap().page_id(), page_id);
    }

    #[test]
    fn test_delete_pinned_page_fails() {
        let (bpm, _dir) = create_test_bpm(10);
        let handle = bpm.new_page().unwrap();

        assert!(matches!(
            bpm.delete_page(handle.page_id()),
            Err(Error::PagePinned(_))
        ));
        assert!(bpm.contains_page(handle.page_id()));
    }

    #[test]
    fn test_flush_page_is_unconditional() {
        let (bpm, _dir) = create_test_bpm(10);
        let page_id = bpm.new_page().unwrap().page_id();

        assert!(bpm.flush_page(page_id).unwrap());
        assert!(bpm.flush_page(page_id).unwrap());
        assert!(!bpm.flush_page(PageId::new(500)).unwrap());
        assert_eq!(bpm.stats().snapshot().pages_written, 2);
    }

    #[test]
    fn test_no_free_frames() {
        let (bpm, _dir) = create_test_bpm(2);
        let _a = bpm.new_page().unwrap();
        let _b = bpm.new_page().unwrap();

        assert!(matches!(bpm.new_page(), Err(Error::NoFreeFrames)));
        // The failed call must not leak a disk allocation or a frame.
        assert_eq!(bpm.page_count(), 2);
    }

    #[test]
    fn test_invalid_page_id() {
        let (bpm, _dir) = create_test_bpm(2);
        assert!(matches!(
            bpm.fetch_page(PageId::INVALID),
            Err(Error::InvalidPageId(_))
        ));
        assert_eq!(bpm.free_frame_count(), 2);
    }

    #[test]
    fn test_clock_replacer_pool() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("test.db")).unwrap();
        let bpm = BufferPoolManager::with_replacer(2, dm, ReplacerKind::Clock);

        let ids: Vec<PageId> = (0..5).map(|_| bpm.new_page().unwrap().page_id()).collect();
        assert_eq!(ids.len(), 5);
        assert_eq!(bpm.page_count(), 2);
        assert!(bpm.check_all_unpinned());
    }

    #[test]
    fn test_concurrent_reads() {
        use std::sync::Arc;
        use std::thread;

        let (bpm, _dir) = create_test_bpm(10);
        let bpm = Arc::new(bpm);

        let page_id = {
            let mut guard = bpm.new_page_write().unwrap();
            guard.as_mut_slice()[0] = 0x42;
            guard.page_id()
        };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bpm = Arc::clone(&bpm);
                thread::spawn(move || {
                    let guard = bpm.fetch_page_read(page_id).unwrap();
                    assert_eq!(guard.as_slice()[0], 0x42);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(bpm.check_all_unpinned());
    }
}
