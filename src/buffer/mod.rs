//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache between the B+ tree and the disk
//! manager. It manages a fixed pool of frames, each holding one page.
//!
//! # Components
//! - [`BufferPoolManager`] - The page cache
//! - [`Frame`] - A slot holding a page plus pin/dirty metadata
//! - [`PageHandle`], [`PageReadGuard`], [`PageWriteGuard`] - RAII pins
//! - [`BufferPoolStats`] - Hit/miss/eviction counters
//! - [`replacer`] - Eviction policies

mod buffer_pool_manager;
mod frame;
mod page_guard;
pub mod replacer;
mod stats;

pub use buffer_pool_manager::BufferPoolManager;
pub use frame::Frame;
pub use page_guard::{PageHandle, PageReadGuard, PageWriteGuard};
pub use replacer::ReplacerKind;
pub use stats::{BufferPoolStats, StatsSnapshot};
