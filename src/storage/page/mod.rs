//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - The raw 4KB data container
//! - [`PageHeader`] - Metadata at the start of every page
//! - [`PageType`] - Discriminator for different page formats
//! - [`BitmapPage`] / [`DiskMetaPage`] - Allocator pages owned by the disk manager
//! - [`IndexRootsPage`] - Index id → root page registry
//! - [`BTreePage`], [`LeafPage`], [`InternalPage`] - B+ tree node views
//!
//! Typed views wrap any `B: AsRef<[u8]>` (plus `AsMut<[u8]>` for mutation), so
//! the same code works over a guarded buffer-pool page or a plain array.

mod bitmap_page;
mod btree_internal_page;
mod btree_leaf_page;
mod btree_page;
mod disk_meta_page;
mod index_roots_page;
#[allow(clippy::module_inception)]
mod page;
mod page_header;

pub use bitmap_page::BitmapPage;
pub use btree_internal_page::InternalPage;
pub use btree_leaf_page::LeafPage;
pub use btree_page::{BTreePage, NodeKind};
pub use disk_meta_page::DiskMetaPage;
pub use index_roots_page::IndexRootsPage;
pub use page::Page;
pub use page_header::{PageHeader, PageType};

#[inline]
pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
