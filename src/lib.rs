//! extentdb - A single-file storage engine with a disk-resident B+ tree.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           extentdb                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Database (database.rs)                    │   │
//! │  │          owns the pool, bootstraps index roots           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                 Index Layer (index/)                     │   │
//! │  │       BPlusTree + IndexIterator + roots registry         │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Buffer Pool (buffer/)                     │   │
//! │  │   BufferPoolManager + Frame + guards + Statistics        │   │
//! │  │          Replacement policies: LRU | CLOCK               │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Storage Layer (storage/)                   │   │
//! │  │   DiskManager (extents + bitmaps) + page formats         │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, RowId, Error, config)
//! - [`storage`] - Disk I/O, page allocation and page formats
//! - [`buffer`] - Buffer pool management and replacement policies
//! - [`index`] - B+ tree index
//! - [`database`] - The context object tying them together
//!
//! # Quick Start
//! ```no_run
//! use extentdb::index::btree::encode_i64_key;
//! use extentdb::{Database, I64Comparator, PageId, ReplacerKind, RowId};
//!
//! let db = Database::open("my_database.db", 64, ReplacerKind::Lru).unwrap();
//! let mut index = db.open_index(1, 8, I64Comparator).unwrap();
//!
//! index.insert(&encode_i64_key(7, 8), RowId::new(PageId::new(12), 3)).unwrap();
//! assert!(index.get_value(&encode_i64_key(7, 8)).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod database;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, FrameId, PageId, Result, RowId};

pub use buffer::{
    BufferPoolManager, BufferPoolStats, Frame, PageHandle, PageReadGuard, PageWriteGuard, ReplacerKind,
    StatsSnapshot,
};
pub use database::Database;
pub use index::{BPlusTree, BytewiseComparator, I64Comparator, IndexIterator, KeyComparator};
pub use storage::page::{Page, PageHeader, PageType};
pub use storage::DiskManager;
