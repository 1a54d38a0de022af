//! Disk meta page: physical page 0 of every database file.

use crate::common::config::{DISK_META_MAGIC, PAGE_SIZE};

use super::page_header::{PageHeader, PageType};
use super::{read_u32, write_u32};

/// Bookkeeping for the extent allocator.
///
/// # Layout
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       13    PageHeader (type = DiskMeta)
/// 13      4     magic
/// 17      4     total allocated data pages
/// 21      4     number of extents
/// 25      4*E   used-page count of each extent
/// ```
#[derive(Clone)]
pub struct DiskMetaPage {
    bytes: [u8; PAGE_SIZE],
}

impl DiskMetaPage {
    const OFFSET_MAGIC: usize = PageHeader::SIZE;
    const OFFSET_ALLOCATED: usize = PageHeader::SIZE + 4;
    const OFFSET_NUM_EXTENTS: usize = PageHeader::SIZE + 8;
    const OFFSET_EXTENTS: usize = PageHeader::SIZE + 12;

    /// Number of extent counters that fit in one page.
    pub const MAX_EXTENTS: usize = (PAGE_SIZE - Self::OFFSET_EXTENTS) / 4;

    /// Meta page for an empty file.
    pub fn new() -> Self {
        let mut bytes = [0u8; PAGE_SIZE];
        PageHeader::new(PageType::DiskMeta).write_to(&mut bytes);
        write_u32(&mut bytes, Self::OFFSET_MAGIC, DISK_META_MAGIC);
        Self { bytes }
    }

    /// Load from raw page bytes.
    ///
    /// # Panics
    /// Panics if `data` is shorter than a page.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut bytes = [0u8; PAGE_SIZE];
        bytes.copy_from_slice(&data[..PAGE_SIZE]);
        Self { bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// A page that was never written.
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    /// Checks type tag, magic and checksum.
    pub fn is_valid(&self) -> bool {
        let header = PageHeader::from_bytes(&self.bytes);
        header.page_type == PageType::DiskMeta
            && read_u32(&self.bytes, Self::OFFSET_MAGIC) == DISK_META_MAGIC
            && self.num_extents() as usize <= Self::MAX_EXTENTS
            && header.verify_checksum(&self.bytes)
    }

    pub fn allocated_pages(&self) -> u32 {
        read_u32(&self.bytes, Self::OFFSET_ALLOCATED)
    }

    pub fn set_allocated_pages(&mut self, count: u32) {
        write_u32(&mut self.bytes, Self::OFFSET_ALLOCATED, count);
    }

    pub fn num_extents(&self) -> u32 {
        read_u32(&self.bytes, Self::OFFSET_NUM_EXTENTS)
    }

    pub fn set_num_extents(&mut self, count: u32) {
        write_u32(&mut self.bytes, Self::OFFSET_NUM_EXTENTS, count);
    }

    /// Used-page count of `extent`.
    ///
    /// # Panics
    /// Panics if `extent >= MAX_EXTENTS`.
    pub fn extent_used_pages(&self, extent: u32) -> u32 {
        read_u32(&self.bytes, Self::extent_offset(extent))
    }

    pub fn set_extent_used_pages(&mut self, extent: u32, count: u32) {
        write_u32(&mut self.bytes, Self::extent_offset(extent), count);
    }

    #[inline]
    fn extent_offset(extent: u32) -> usize {
        assert!((extent as usize) < Self::MAX_EXTENTS, "extent out of range");
        Self::OFFSET_EXTENTS + 4 * extent as usize
    }

    pub fn update_checksum(&mut self) {
        PageHeader::stamp_checksum(&mut self.bytes);
    }
}

impl Default for DiskMetaPage {
    fn default() -> Self {
        Self::new()
    }
}
