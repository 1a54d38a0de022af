//! Extent free-space bitmap.
//!
//! Each extent of the database file starts with one [`BitmapPage`] that
//! records, one bit per page, which of the extent's data pages are in use.

use super::page_header::{PageHeader, PageType};
use super::{read_u32, write_u32};

/// Bitmap tracking allocation state of the pages in one extent.
///
/// Generic over the page size `N` so small bitmaps can be exercised in tests.
///
/// # Layout
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       13    PageHeader (type = Bitmap)
/// 13      4     allocated page count
/// 17      4     next-free hint
/// 21      ..    bits, MSB-first within each byte
/// ```
///
/// Bit `i` lives in byte `i / 8` at mask `0x80 >> (i % 8)`. A set bit means
/// the page is allocated.
pub struct BitmapPage<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> BitmapPage<N> {
    const OFFSET_ALLOCATED: usize = PageHeader::SIZE;
    const OFFSET_NEXT_FREE: usize = PageHeader::SIZE + 4;

    /// Bytes in front of the bit array.
    pub const HEADER_SIZE: usize = PageHeader::SIZE + 8;

    /// Number of pages one bitmap can track.
    pub const MAX_PAGES: usize = 8 * (N - Self::HEADER_SIZE);

    /// An empty bitmap: nothing allocated, hint at offset 0.
    pub fn new() -> Self {
        let mut bytes = [0u8; N];
        PageHeader::new(PageType::Bitmap).write_to(&mut bytes);
        Self { bytes }
    }

    /// Load a bitmap from raw page bytes.
    ///
    /// # Panics
    /// Panics if `data` is shorter than `N`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&data[..N]);
        Self { bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of pages currently marked allocated.
    #[inline]
    pub fn allocated_pages(&self) -> u32 {
        read_u32(&self.bytes, Self::OFFSET_ALLOCATED)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.allocated_pages() as usize >= Self::MAX_PAGES
    }

    #[inline]
    fn next_free_hint(&self) -> u32 {
        read_u32(&self.bytes, Self::OFFSET_NEXT_FREE)
    }

    #[inline]
    fn locate(offset: u32) -> (usize, u8) {
        let byte = Self::HEADER_SIZE + (offset as usize >> 3);
        (byte, 0x80u8 >> (offset & 7))
    }

    /// Returns `true` if `offset` is inside this bitmap and its bit is clear.
    pub fn is_page_free(&self, offset: u32) -> bool {
        if offset as usize >= Self::MAX_PAGES {
            return false;
        }
        let (byte, mask) = Self::locate(offset);
        self.bytes[byte] & mask == 0
    }

    fn find_free_from(&self, start: u32) -> Option<u32> {
        let max = Self::MAX_PAGES as u32;
        (start..max)
            .chain(0..start.min(max))
            .find(|&i| self.is_page_free(i))
    }

    /// Claim a free page and return its offset within the extent.
    ///
    /// Returns `None` when every bit is set.
    pub fn allocate_page(&mut self) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let offset = self.find_free_from(self.next_free_hint())?;
        let (byte, mask) = Self::locate(offset);
        self.bytes[byte] |= mask;

        let allocated = self.allocated_pages() + 1;
        write_u32(&mut self.bytes, Self::OFFSET_ALLOCATED, allocated);

        let hint = self
            .find_free_from(offset + 1)
            .unwrap_or(Self::MAX_PAGES as u32);
        write_u32(&mut self.bytes, Self::OFFSET_NEXT_FREE, hint);

        Some(offset)
    }

    /// Release the page at `offset`.
    ///
    /// Returns `false` if the offset is out of range or already free.
    pub fn deallocate_page(&mut self, offset: u32) -> bool {
        if offset as usize >= Self::MAX_PAGES || self.is_page_free(offset) {
            return false;
        }

        let (byte, mask) = Self::locate(offset);
        self.bytes[byte] &= !mask;

        let allocated = self.allocated_pages().saturating_sub(1);
        write_u32(&mut self.bytes, Self::OFFSET_ALLOCATED, allocated);

        if offset < self.next_free_hint() {
            write_u32(&mut self.bytes, Self::OFFSET_NEXT_FREE, offset);
        }
        true
    }

    /// Stamp a CRC32 over the page before it goes to disk.
    pub fn update_checksum(&mut self) {
        PageHeader::stamp_checksum(&mut self.bytes);
    }

    /// Checks type tag and checksum.
    pub fn is_valid(&self) -> bool {
        let header = PageHeader::from_bytes(&self.bytes);
        header.page_type == PageType::Bitmap && header.verify_checksum(&self.bytes)
    }
}

impl<const N: usize> Default for BitmapPage<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
