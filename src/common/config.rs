//! Configuration constants for extentdb.

use crate::common::PageId;
use crate::storage::page::{BitmapPage, DiskMetaPage};

/// Size of a page in bytes (4KB).
///
/// Every physical page in the database file (meta page, bitmap pages and
/// data pages alike) has exactly this size.
///
/// # Alignment
/// Pages are aligned to 4096 bytes for efficient Direct I/O (O_DIRECT).
pub const PAGE_SIZE: usize = 4096;

/// Number of data pages tracked by one extent's bitmap page.
pub const BITMAP_SIZE: u32 = BitmapPage::<PAGE_SIZE>::MAX_PAGES as u32;

/// Maximum number of extents the disk meta page can describe.
pub const MAX_EXTENTS: u32 = DiskMetaPage::MAX_EXTENTS as u32;

/// Upper bound (exclusive) on logical page ids the disk manager hands out.
pub const MAX_VALID_PAGE_ID: u32 = MAX_EXTENTS * BITMAP_SIZE;

/// Physical page holding the disk meta page.
pub const META_PAGE_ID: u32 = 0;

/// Logical page holding the index-id → root-page-id registry.
///
/// It is the first page allocated in a fresh database file.
pub const INDEX_ROOTS_PAGE_ID: PageId = PageId(0);

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Magic number stamped into the disk meta page ("EXTD").
pub const DISK_META_MAGIC: u32 = 0x4558_5444;
