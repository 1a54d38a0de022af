//! Shared header of B+ tree nodes.
//!
//! Leaf and internal nodes both start with the same header. [`BTreePage`]
//! reads it without caring which kind of node it is looking at, which is all
//! the tree needs for re-parenting children and for underflow checks.

use crate::common::PageId;

use super::page_header::{PageHeader, PageType};
use super::{read_u32, write_u32};

/// Which kind of node a B+ tree page holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Internal,
}

impl NodeKind {
    pub fn page_type(self) -> PageType {
        match self {
            NodeKind::Leaf => PageType::BTreeLeaf,
            NodeKind::Internal => PageType::BTreeInternal,
        }
    }
}

pub(super) const OFFSET_PAGE_ID: usize = PageHeader::SIZE;
pub(super) const OFFSET_PARENT: usize = PageHeader::SIZE + 4;
pub(super) const OFFSET_KEY_SIZE: usize = PageHeader::SIZE + 8;
pub(super) const OFFSET_MAX_SIZE: usize = PageHeader::SIZE + 12;
pub(super) const OFFSET_SIZE: usize = PageHeader::SIZE + 16;

/// Read-write view over the common B+ tree node header.
///
/// # Layout
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       13    PageHeader (type = BTreeLeaf | BTreeInternal)
/// 13      4     page id
/// 17      4     parent page id (INVALID for the root)
/// 21      4     key size
/// 25      4     max size
/// 29      4     current size
/// ```
pub struct BTreePage<B> {
    pub(super) data: B,
}

impl<B: AsRef<[u8]>> BTreePage<B> {
    /// Bytes taken by the common header.
    pub const HEADER_SIZE: usize = PageHeader::SIZE + 20;

    pub fn new(data: B) -> Self {
        Self { data }
    }

    /// Kind of node, or `None` if the page is not a tree node.
    pub fn node_kind(&self) -> Option<NodeKind> {
        match PageHeader::page_type_of(self.data.as_ref()) {
            PageType::BTreeLeaf => Some(NodeKind::Leaf),
            PageType::BTreeInternal => Some(NodeKind::Internal),
            _ => None,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.node_kind() == Some(NodeKind::Leaf)
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId::new(read_u32(self.data.as_ref(), OFFSET_PAGE_ID))
    }

    #[inline]
    pub fn parent_page_id(&self) -> PageId {
        PageId::new(read_u32(self.data.as_ref(), OFFSET_PARENT))
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        !self.parent_page_id().is_valid()
    }

    #[inline]
    pub fn key_size(&self) -> usize {
        read_u32(self.data.as_ref(), OFFSET_KEY_SIZE) as usize
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        read_u32(self.data.as_ref(), OFFSET_MAX_SIZE) as usize
    }

    /// Smallest size a non-root node may shrink to.
    #[inline]
    pub fn min_size(&self) -> usize {
        self.max_size() / 2
    }

    #[inline]
    pub fn size(&self) -> usize {
        read_u32(self.data.as_ref(), OFFSET_SIZE) as usize
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BTreePage<B> {
    /// Write a fresh header. Everything after the header is zeroed.
    pub fn init(
        &mut self,
        kind: NodeKind,
        page_id: PageId,
        parent_id: PageId,
        key_size: usize,
        max_size: usize,
    ) {
        let data = self.data.as_mut();
        data.fill(0);
        PageHeader::new(kind.page_type()).write_to(data);
        write_u32(data, OFFSET_PAGE_ID, page_id.0);
        write_u32(data, OFFSET_PARENT, parent_id.0);
        write_u32(data, OFFSET_KEY_SIZE, key_size as u32);
        write_u32(data, OFFSET_MAX_SIZE, max_size as u32);
        write_u32(data, OFFSET_SIZE, 0);
    }

    #[inline]
    pub fn set_parent_page_id(&mut self, parent_id: PageId) {
        write_u32(self.data.as_mut(), OFFSET_PARENT, parent_id.0);
    }

    #[inline]
    pub(super) fn set_size(&mut self, size: usize) {
        write_u32(self.data.as_mut(), OFFSET_SIZE, size as u32);
    }
}
