//! Index structures built on the buffer pool.
//!
//! - [`btree`] - Disk-resident B+ tree mapping fixed-size keys to [`RowId`]s
//!
//! [`RowId`]: crate::common::RowId

pub mod btree;

pub use btree::{BPlusTree, BytewiseComparator, I64Comparator, IndexIterator, KeyComparator};
