//! Error types for extentdb.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in extentdb.
///
/// Exhaustion (no frame, no page id) and invariant violations (deleting a
/// pinned page, corrupted metadata) are both reported here. Plain not-found
/// outcomes are not errors; they come back as `Option`/`bool`.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The provided page ID is invalid (the sentinel, or past the last extent).
    #[error("Invalid page ID: {0}")]
    InvalidPageId(u32),

    /// Buffer pool has no free frames and cannot evict any pages.
    ///
    /// This happens when all frames are pinned.
    #[error("No free frames available in buffer pool")]
    NoFreeFrames,

    /// Every extent is full and the meta page cannot describe another one.
    #[error("Disk has no free pages left")]
    OutOfPages,

    /// Attempted to delete a page that is still pinned.
    #[error("Page {0} is pinned")]
    PagePinned(u32),

    /// On-disk metadata failed validation (magic number or checksum).
    #[error("Corrupted {0}")]
    Corrupted(String),

    /// A B+ tree traversal reached a page that is not a tree node.
    #[error("Page {0} is not a B+ tree page")]
    NotTreePage(u32),

    /// The index roots registry has no room for another index.
    #[error("Index roots page is full")]
    IndexRootsFull,

    /// A key passed to an index has the wrong length.
    #[error("Key is {actual} bytes, index expects {expected}")]
    KeySizeMismatch { expected: usize, actual: usize },

    /// Rejected construction parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
