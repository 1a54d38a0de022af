//! Access to the index roots page through the buffer pool.

use log::{debug, warn};

use crate::buffer::BufferPoolManager;
use crate::common::config::INDEX_ROOTS_PAGE_ID;
use crate::common::{Error, PageId, Result};
use crate::storage::page::IndexRootsPage;

/// Make sure the registry exists at [`INDEX_ROOTS_PAGE_ID`].
///
/// In a fresh file the registry is the first page ever allocated.
pub(crate) fn ensure_roots_page(bpm: &BufferPoolManager) -> Result<()> {
    if bpm.is_page_free(INDEX_ROOTS_PAGE_ID)? {
        let mut guard = bpm.new_page_write()?;
        let page_id = guard.page_id();
        if page_id != INDEX_ROOTS_PAGE_ID {
            drop(guard);
            bpm.delete_page(page_id)?;
            return Err(Error::Corrupted(format!(
                "index roots page: allocator returned {} instead of {}",
                page_id, INDEX_ROOTS_PAGE_ID
            )));
        }
        IndexRootsPage::new(guard.as_mut_slice()).init();
        debug!("initialized index roots page");
        return Ok(());
    }

    let mut guard = bpm.fetch_page_write(INDEX_ROOTS_PAGE_ID)?;
    if IndexRootsPage::new(guard.as_slice()).is_initialized() {
        return Ok(());
    }
    // Only a page nobody ever wrote may be formatted in place.
    if guard.as_slice().iter().any(|&b| b != 0) {
        return Err(Error::Corrupted(format!(
            "index roots page: {} is in use by other data",
            INDEX_ROOTS_PAGE_ID
        )));
    }
    warn!("index roots page was allocated but never formatted");
    IndexRootsPage::new(guard.as_mut_slice()).init();
    Ok(())
}

/// Root recorded for `index_id`.
pub(crate) fn load_root(bpm: &BufferPoolManager, index_id: u32) -> Result<Option<PageId>> {
    let guard = bpm.fetch_page_read(INDEX_ROOTS_PAGE_ID)?;
    let root = IndexRootsPage::new(guard.as_slice()).get_root_id(index_id);
    Ok(root)
}

/// Record `root` for `index_id`; an invalid root removes the record.
pub(crate) fn store_root(bpm: &BufferPoolManager, index_id: u32, root: PageId) -> Result<()> {
    let mut guard = bpm.fetch_page_write(INDEX_ROOTS_PAGE_ID)?;
    let mut roots = IndexRootsPage::new(guard.as_mut_slice());

    if !root.is_valid() {
        roots.delete(index_id);
    } else if !roots.update(index_id, root) && !roots.insert(index_id, root) {
        return Err(Error::IndexRootsFull);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskManager;
    use tempfile::tempdir;

    #[test]
    fn test_bootstrap_and_records() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("test.db")).unwrap();
        let bpm = BufferPoolManager::new(4, dm);

        ensure_roots_page(&bpm).unwrap();
        assert!(!bpm.is_page_free(INDEX_ROOTS_PAGE_ID).unwrap());
        // Idempotent.
        ensure_roots_page(&bpm).unwrap();

        assert_eq!(load_root(&bpm, 1).unwrap(), None);
        store_root(&bpm, 1, PageId::new(5)).unwrap();
        store_root(&bpm, 1, PageId::new(6)).unwrap();
        assert_eq!(load_root(&bpm, 1).unwrap(), Some(PageId::new(6)));

        store_root(&bpm, 1, PageId::INVALID).unwrap();
        assert_eq!(load_root(&bpm, 1).unwrap(), None);
        assert!(bpm.check_all_unpinned());
    }

    #[test]
    fn test_foreign_page_zero_is_left_alone() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("test.db")).unwrap();
        let bpm = BufferPoolManager::new(4, dm);

        {
            let mut guard = bpm.new_page_write().unwrap();
            assert_eq!(guard.page_id(), INDEX_ROOTS_PAGE_ID);
            guard.as_mut_slice()[100] = 0xAB;
        }

        assert!(matches!(ensure_roots_page(&bpm), Err(Error::Corrupted(_))));
        let guard = bpm.fetch_page_read(INDEX_ROOTS_PAGE_ID).unwrap();
        assert_eq!(guard.as_slice()[100], 0xAB);
        assert!(!IndexRootsPage::new(guard.as_slice()).is_initialized());
    }

    #[test]
    fn test_blank_allocated_page_zero_is_formatted() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("test.db")).unwrap();
        let bpm = BufferPoolManager::new(4, dm);
        assert_eq!(bpm.new_page().unwrap().page_id(), INDEX_ROOTS_PAGE_ID);

        ensure_roots_page(&bpm).unwrap();
        store_root(&bpm, 3, PageId::new(9)).unwrap();
        assert_eq!(load_root(&bpm, 3).unwrap(), Some(PageId::new(9)));
        assert!(bpm.check_all_unpinned());
    }
}
