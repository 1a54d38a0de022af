//! B+ tree index.
//!
//! Every node is a buffer-pool page; the tree never owns page bytes. The
//! root of each tree is recorded in the index roots page under the tree's
//! index id, so a tree can be reopened after the pool is dropped.

mod iterator;
mod key;
pub(crate) mod roots;
mod tree;

pub use iterator::IndexIterator;
pub use key::{encode_i64_key, BytewiseComparator, I64Comparator, KeyComparator};
pub use tree::BPlusTree;
