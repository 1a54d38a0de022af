//! Registry page mapping index ids to their B+ tree root pages.

use crate::common::config::PAGE_SIZE;
use crate::common::PageId;

use super::page_header::{PageHeader, PageType};
use super::{read_u32, write_u32};

/// View over the index roots page.
///
/// # Layout
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       13    PageHeader (type = IndexRoots)
/// 13      4     entry count
/// 17      8*n   (index_id u32, root page id u32) pairs
/// ```
pub struct IndexRootsPage<B> {
    data: B,
}

const OFFSET_COUNT: usize = PageHeader::SIZE;
const OFFSET_ENTRIES: usize = PageHeader::SIZE + 4;
const ENTRY_SIZE: usize = 8;

impl<B: AsRef<[u8]>> IndexRootsPage<B> {
    /// Maximum number of indexes one registry page can hold.
    pub const MAX_ENTRIES: usize = (PAGE_SIZE - OFFSET_ENTRIES) / ENTRY_SIZE;

    pub fn new(data: B) -> Self {
        Self { data }
    }

    /// Whether the page carries the registry type tag.
    pub fn is_initialized(&self) -> bool {
        PageHeader::page_type_of(self.data.as_ref()) == PageType::IndexRoots
    }

    pub fn len(&self) -> usize {
        read_u32(self.data.as_ref(), OFFSET_COUNT) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index_id_at(&self, slot: usize) -> u32 {
        read_u32(self.data.as_ref(), OFFSET_ENTRIES + slot * ENTRY_SIZE)
    }

    fn find(&self, index_id: u32) -> Option<usize> {
        (0..self.len()).find(|&slot| self.index_id_at(slot) == index_id)
    }

    /// Root page recorded for `index_id`.
    pub fn get_root_id(&self, index_id: u32) -> Option<PageId> {
        self.find(index_id).map(|slot| {
            PageId::new(read_u32(
                self.data.as_ref(),
                OFFSET_ENTRIES + slot * ENTRY_SIZE + 4,
            ))
        })
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> IndexRootsPage<B> {
    /// Format the page as an empty registry.
    pub fn init(&mut self) {
        let data = self.data.as_mut();
        data.fill(0);
        PageHeader::new(PageType::IndexRoots).write_to(data);
    }

    fn write_entry(&mut self, slot: usize, index_id: u32, root: PageId) {
        let offset = OFFSET_ENTRIES + slot * ENTRY_SIZE;
        let data = self.data.as_mut();
        write_u32(data, offset, index_id);
        write_u32(data, offset + 4, root.0);
    }

    /// Add a record. Returns `false` if `index_id` is already present or the
    /// page is full.
    pub fn insert(&mut self, index_id: u32, root: PageId) -> bool {
        let len = self.len();
        if self.find(index_id).is_some() || len >= Self::MAX_ENTRIES {
            return false;
        }
        self.write_entry(len, index_id, root);
        write_u32(self.data.as_mut(), OFFSET_COUNT, len as u32 + 1);
        true
    }

    /// Change an existing record. Returns `false` if `index_id` is absent.
    pub fn update(&mut self, index_id: u32, root: PageId) -> bool {
        match self.find(index_id) {
            Some(slot) => {
                self.write_entry(slot, index_id, root);
                true
            }
            None => false,
        }
    }

    /// Drop a record. Returns `false` if `index_id` is absent.
    pub fn delete(&mut self, index_id: u32) -> bool {
        let Some(slot) = self.find(index_id) else {
            return false;
        };
        let len = self.len();
        let start = OFFSET_ENTRIES + (slot + 1) * ENTRY_SIZE;
        let end = OFFSET_ENTRIES + len * ENTRY_SIZE;
        let data = self.data.as_mut();
        data.copy_within(start..end, start - ENTRY_SIZE);
        data[end - ENTRY_SIZE..end].fill(0);
        write_u32(data, OFFSET_COUNT, len as u32 - 1);
        true
    }
}
