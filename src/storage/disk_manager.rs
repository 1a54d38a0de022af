//! Disk Manager - page I/O and extent-based page allocation.
//!
//! The [`DiskManager`] owns the database file. It maps logical page ids to
//! physical offsets and keeps free-space state in per-extent bitmap pages
//! summarized by a meta page.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, error, trace, warn};

use crate::common::config::{BITMAP_SIZE, MAX_EXTENTS, MAX_VALID_PAGE_ID, META_PAGE_ID, PAGE_SIZE};
use crate::common::{Error, PageId, Result};
use crate::storage::page::{BitmapPage, DiskMetaPage, Page};

type ExtentBitmap = BitmapPage<PAGE_SIZE>;

/// Manages disk I/O and page allocation for a single database file.
///
/// # File Layout
/// ```text
/// ┌──────┬──────────┬────────────────────┬──────────┬────────────────────┬─────
/// │ Meta │ Bitmap 0 │ BITMAP_SIZE pages  │ Bitmap 1 │ BITMAP_SIZE pages  │ ...
/// └──────┴──────────┴────────────────────┴──────────┴────────────────────┴─────
/// ```
///
/// Physical page 0 holds the [`DiskMetaPage`]. Extent `e` starts with its
/// bitmap at physical page `e * (BITMAP_SIZE + 1) + 1`, followed by its data
/// pages. Logical page `id` therefore lives at physical page
/// `id + id / BITMAP_SIZE + 2`.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The `BufferPoolManager` serializes
/// access to it.
///
/// # Durability
/// Every write is followed by `sync_data()`. There is no write buffering
/// below this layer.
pub struct DiskManager {
    file: File,
    /// Cached copy of physical page 0.
    meta: DiskMetaPage,
}

impl DiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;

        let mut dm = Self {
            file,
            meta: DiskMetaPage::new(),
        };
        dm.write_meta()?;
        debug!("created database file {}", path.as_ref().display());
        Ok(dm)
    }

    /// Open an existing database file.
    ///
    /// An empty file is initialized as a fresh database.
    ///
    /// # Errors
    /// Returns `Error::Corrupted` if the meta page has the wrong magic
    /// number or a bad checksum.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

        let mut dm = Self {
            file,
            meta: DiskMetaPage::new(),
        };

        let mut buf = Page::new();
        dm.read_physical(META_PAGE_ID, buf.as_mut_slice())?;
        let meta = DiskMetaPage::from_bytes(buf.as_slice());

        if meta.is_blank() {
            dm.write_meta()?;
        } else if meta.is_valid() {
            dm.meta = meta;
        } else {
            return Err(Error::Corrupted(format!(
                "disk meta page in {}",
                path.as_ref().display()
            )));
        }

        debug!(
            "opened database file {} ({} extents, {} pages allocated)",
            path.as_ref().display(),
            dm.meta.num_extents(),
            dm.meta.allocated_pages()
        );
        Ok(dm)
    }

    /// Open an existing database file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Persist the meta page and sync the file.
    pub fn close(mut self) -> Result<()> {
        self.write_meta()?;
        self.file.sync_all()?;
        Ok(())
    }

    // ========================================================================
    // Page I/O
    // ========================================================================

    /// Read a logical page.
    ///
    /// Pages beyond the current end of file read back as zeros.
    ///
    /// # Errors
    /// Returns `Error::InvalidPageId` for ids outside the addressable range.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        let physical = Self::physical_page(page_id)?;
        let mut page = Page::new();
        if !self.read_physical(physical, page.as_mut_slice())? {
            warn!("{} read before it was ever written", page_id);
        }
        Ok(page)
    }

    /// Write a logical page and sync it to disk.
    ///
    /// # Errors
    /// Returns `Error::InvalidPageId` for ids outside the addressable range.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let physical = Self::physical_page(page_id)?;
        self.write_physical(physical, page.as_slice())
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate a logical page id.
    ///
    /// Picks the first extent with a free slot, creating a new extent when
    /// all existing ones are full. The bitmap and meta page are persisted
    /// before the id is returned. If either write fails the cached meta
    /// page is left as it was before the call.
    ///
    /// # Errors
    /// Returns `Error::OutOfPages` once every addressable page is in use.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if self.meta.allocated_pages() >= MAX_VALID_PAGE_ID {
            return Err(Error::OutOfPages);
        }

        let saved = self.meta.clone();
        let result = self.allocate_in_extent();
        if result.is_err() {
            self.meta = saved;
        }
        result
    }

    fn allocate_in_extent(&mut self) -> Result<PageId> {
        let num_extents = self.meta.num_extents();
        let existing = (0..num_extents).find(|&e| self.meta.extent_used_pages(e) < BITMAP_SIZE);

        let (extent, mut bitmap) = match existing {
            Some(extent) => (extent, self.read_bitmap(extent)?),
            None => {
                if num_extents >= MAX_EXTENTS {
                    return Err(Error::OutOfPages);
                }
                debug!("creating extent {}", num_extents);
                self.meta.set_num_extents(num_extents + 1);
                (num_extents, ExtentBitmap::new())
            }
        };

        let offset = bitmap.allocate_page().ok_or_else(|| {
            Error::Corrupted(format!(
                "bitmap of extent {} is full but meta page counts {} used",
                extent,
                self.meta.extent_used_pages(extent)
            ))
        })?;

        self.meta
            .set_extent_used_pages(extent, self.meta.extent_used_pages(extent) + 1);
        self.meta.set_allocated_pages(self.meta.allocated_pages() + 1);

        self.write_bitmap(extent, &mut bitmap)?;
        self.write_meta()?;

        let page_id = PageId::new(extent * BITMAP_SIZE + offset);
        trace!("allocated {}", page_id);
        Ok(page_id)
    }

    /// Release a logical page id for reuse.
    ///
    /// Ids outside the allocated extents are ignored. Freeing an id that is
    /// already free only logs a warning.
    pub fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        if page_id.0 >= MAX_VALID_PAGE_ID {
            return Ok(());
        }
        let extent = page_id.0 / BITMAP_SIZE;
        if extent >= self.meta.num_extents() {
            return Ok(());
        }

        let mut bitmap = self.read_bitmap(extent)?;
        if !bitmap.deallocate_page(page_id.0 % BITMAP_SIZE) {
            warn!("{} deallocated while already free", page_id);
            return Ok(());
        }

        let saved = self.meta.clone();
        self.meta.set_extent_used_pages(
            extent,
            self.meta.extent_used_pages(extent).saturating_sub(1),
        );
        self.meta
            .set_allocated_pages(self.meta.allocated_pages().saturating_sub(1));

        if let Err(e) = self
            .write_bitmap(extent, &mut bitmap)
            .and_then(|_| self.write_meta())
        {
            self.meta = saved;
            return Err(e);
        }
        trace!("deallocated {}", page_id);
        Ok(())
    }

    /// Whether `page_id` is currently unallocated.
    ///
    /// Ids outside the addressable range report `false`. Ids in extents that
    /// do not exist yet report `true`.
    pub fn is_page_free(&mut self, page_id: PageId) -> Result<bool> {
        if page_id.0 >= MAX_VALID_PAGE_ID {
            return Ok(false);
        }
        let extent = page_id.0 / BITMAP_SIZE;
        if extent >= self.meta.num_extents() {
            return Ok(true);
        }
        let bitmap = self.read_bitmap(extent)?;
        Ok(bitmap.is_page_free(page_id.0 % BITMAP_SIZE))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of logical pages currently allocated.
    #[inline]
    pub fn num_allocated_pages(&self) -> u32 {
        self.meta.allocated_pages()
    }

    #[inline]
    pub fn num_extents(&self) -> u32 {
        self.meta.num_extents()
    }

    /// Used pages in `extent`, or 0 if the extent does not exist.
    pub fn extent_used_pages(&self, extent: u32) -> u32 {
        if extent < self.meta.num_extents() {
            self.meta.extent_used_pages(extent)
        } else {
            0
        }
    }

    /// Current size of the database file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn physical_page(page_id: PageId) -> Result<u32> {
        if page_id.0 >= MAX_VALID_PAGE_ID {
            return Err(Error::InvalidPageId(page_id.0));
        }
        Ok(page_id.0 + page_id.0 / BITMAP_SIZE + 2)
    }

    #[inline]
    fn bitmap_physical_page(extent: u32) -> u32 {
        extent * (BITMAP_SIZE + 1) + 1
    }

    fn read_bitmap(&mut self, extent: u32) -> Result<ExtentBitmap> {
        let mut buf = Page::new();
        self.read_physical(Self::bitmap_physical_page(extent), buf.as_mut_slice())?;
        let bitmap = ExtentBitmap::from_bytes(buf.as_slice());
        if !bitmap.is_valid() {
            return Err(Error::Corrupted(format!("bitmap page of extent {}", extent)));
        }
        Ok(bitmap)
    }

    fn write_bitmap(&mut self, extent: u32, bitmap: &mut ExtentBitmap) -> Result<()> {
        bitmap.update_checksum();
        self.write_physical(Self::bitmap_physical_page(extent), bitmap.as_bytes())
    }

    fn write_meta(&mut self) -> Result<()> {
        self.meta.update_checksum();
        let Self { file, meta } = self;
        Self::write_at(file, META_PAGE_ID, meta.as_bytes())
    }

    /// Fill `buf` from physical page `physical`. Returns `false` if the page
    /// lies wholly or partly past the end of the file; missing bytes are
    /// zeroed.
    fn read_physical(&mut self, physical: u32, buf: &mut [u8]) -> Result<bool> {
        let offset = physical as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("read of physical page {} failed: {}", physical, e);
                    return Err(e.into());
                }
            }
        }
        buf[filled..].fill(0);
        Ok(filled == buf.len())
    }

    fn write_physical(&mut self, physical: u32, data: &[u8]) -> Result<()> {
        Self::write_at(&mut self.file, physical, data)
    }

    fn write_at(file: &mut File, physical: u32, data: &[u8]) -> Result<()> {
        let offset = physical as u64 * PAGE_SIZE as u64;
        let result = file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(data))
            .and_then(|_| file.sync_data());

        if let Err(e) = result {
            error!("write of physical page {} failed: {}", physical, e);
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_writes_meta_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = DiskManager::create(&path).unwrap();
        assert_eq!(dm.num_allocated_pages(), 0);
        assert_eq!(dm.num_extents(), 0);
        assert_eq!(dm.file_size().unwrap(), PAGE_SIZE as u64);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        DiskManager::create(&path).unwrap();
        assert!(DiskManager::create(&path).is_err());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let dir = tempdir().unwrap();
        assert!(DiskManager::open(dir.path().join("missing.db")).is_err());
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::fs::write(&path, vec![0xABu8; PAGE_SIZE]).unwrap();

        assert!(matches!(DiskManager::open(&path), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_open_empty_file_initializes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        File::create(&path).unwrap();

        let mut dm = DiskManager::open(&path).unwrap();
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(0));
    }

    #[test]
    fn test_sequential_allocation() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::create(dir.path().join("test.db")).unwrap();

        for i in 0..10 {
            assert_eq!(dm.allocate_page().unwrap(), PageId::new(i));
        }
        assert_eq!(dm.num_allocated_pages(), 10);
        assert_eq!(dm.num_extents(), 1);
        assert_eq!(dm.extent_used_pages(0), 10);
        assert_eq!(dm.extent_used_pages(5), 0);
    }

    #[test]
    fn test_deallocate_then_reuse() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::create(dir.path().join("test.db")).unwrap();

        for _ in 0..5 {
            dm.allocate_page().unwrap();
        }
        dm.deallocate_page(PageId::new(2)).unwrap();
        assert!(dm.is_page_free(PageId::new(2)).unwrap());
        assert_eq!(dm.num_allocated_pages(), 4);

        assert_eq!(dm.allocate_page().unwrap(), PageId::new(2));
        assert!(!dm.is_page_free(PageId::new(2)).unwrap());
    }

    #[test]
    fn test_double_free_is_ignored() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::create(dir.path().join("test.db")).unwrap();
        let page_id = dm.allocate_page().unwrap();

        dm.deallocate_page(page_id).unwrap();
        dm.deallocate_page(page_id).unwrap();
        assert_eq!(dm.num_allocated_pages(), 0);
    }

    #[test]
    fn test_out_of_range_ids() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::create(dir.path().join("test.db")).unwrap();

        assert!(!dm.is_page_free(PageId::INVALID).unwrap());
        assert!(!dm.is_page_free(PageId::new(MAX_VALID_PAGE_ID)).unwrap());
        // Extent that does not exist yet
        assert!(dm.is_page_free(PageId::new(BITMAP_SIZE * 3)).unwrap());

        dm.deallocate_page(PageId::INVALID).unwrap();
        assert!(matches!(
            dm.read_page(PageId::INVALID),
            Err(Error::InvalidPageId(_))
        ));
    }

    #[test]
    fn test_read_unwritten_page_is_zeroed() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::create(dir.path().join("test.db")).unwrap();
        let page_id = dm.allocate_page().unwrap();

        let page = dm.read_page(page_id).unwrap();
        assert!(page.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_read_uses_physical_mapping() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::create(dir.path().join("test.db")).unwrap();
        let page_id = dm.allocate_page().unwrap();

        let mut page = Page::new();
        page.as_mut_slice()[0] = 0xAB;
        page.as_mut_slice()[4095] = 0xEF;
        dm.write_page(page_id, &page).unwrap();

        // Meta page, bitmap page, then logical page 0.
        assert_eq!(dm.file_size().unwrap(), 3 * PAGE_SIZE as u64);

        let read_back = dm.read_page(page_id).unwrap();
        assert_eq!(read_back.as_slice()[0], 0xAB);
        assert_eq!(read_back.as_slice()[4095], 0xEF);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut dm = DiskManager::create(&path).unwrap();
            for _ in 0..3 {
                dm.allocate_page().unwrap();
            }
            let mut page = Page::new();
            page.as_mut_slice()[0] = 0x42;
            dm.write_page(PageId::new(1), &page).unwrap();
            dm.deallocate_page(PageId::new(0)).unwrap();
            dm.close().unwrap();
        }

        let mut dm = DiskManager::open(&path).unwrap();
        assert_eq!(dm.num_allocated_pages(), 2);
        assert!(dm.is_page_free(PageId::new(0)).unwrap());
        assert_eq!(dm.read_page(PageId::new(1)).unwrap().as_slice()[0], 0x42);
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(0));
    }

    #[test]
    fn test_open_or_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut dm = DiskManager::open_or_create(&path).unwrap();
            dm.allocate_page().unwrap();
        }

        let dm = DiskManager::open_or_create(&path).unwrap();
        assert_eq!(dm.num_allocated_pages(), 1);
    }

    /// Swap in a read-only handle so every write fails.
    fn make_read_only(dm: &mut DiskManager, path: &Path) {
        dm.file = File::open(path).unwrap();
    }

    fn make_writable(dm: &mut DiskManager, path: &Path) {
        dm.file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    }

    #[test]
    fn test_failed_extent_creation_leaves_meta_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut dm = DiskManager::create(&path).unwrap();

        make_read_only(&mut dm, &path);
        assert!(matches!(dm.allocate_page(), Err(Error::Io(_))));
        assert_eq!(dm.num_extents(), 0);
        assert_eq!(dm.num_allocated_pages(), 0);

        make_writable(&mut dm, &path);
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(0));
        assert_eq!(dm.num_extents(), 1);
        assert_eq!(dm.extent_used_pages(0), 1);
    }

    #[test]
    fn test_failed_deallocate_leaves_meta_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut dm = DiskManager::create(&path).unwrap();
        for _ in 0..3 {
            dm.allocate_page().unwrap();
        }

        make_read_only(&mut dm, &path);
        assert!(dm.deallocate_page(PageId::new(1)).is_err());
        assert_eq!(dm.num_allocated_pages(), 3);
        assert_eq!(dm.extent_used_pages(0), 3);
        assert!(!dm.is_page_free(PageId::new(1)).unwrap());

        make_writable(&mut dm, &path);
        dm.deallocate_page(PageId::new(1)).unwrap();
        assert_eq!(dm.num_allocated_pages(), 2);
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(1));
    }
}
