//! Database context.
//!
//! A [`Database`] owns the shared buffer pool for one database file and is
//! the entry point for opening indexes. There is no global state; pass the
//! `Database` (or its buffer pool) to whatever needs storage.

use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::buffer::{BufferPoolManager, ReplacerKind};
use crate::common::{Error, Result};
use crate::index::btree::{roots, BPlusTree, KeyComparator};
use crate::storage::DiskManager;

/// An open database file.
///
/// # Example
/// ```no_run
/// use extentdb::{Database, I64Comparator, ReplacerKind};
///
/// let db = Database::open("my.db", 64, ReplacerKind::Lru)?;
/// let tree = db.open_index(1, 8, I64Comparator)?;
/// assert!(tree.is_empty());
/// drop(tree);
/// db.close()?;
/// # Ok::<(), extentdb::Error>(())
/// ```
pub struct Database {
    bpm: Arc<BufferPoolManager>,
}

impl Database {
    /// Open `path`, creating it if needed, with a pool of `pool_size` frames.
    ///
    /// The index roots page is created on first open.
    pub fn open<P: AsRef<Path>>(path: P, pool_size: usize, replacer: ReplacerKind) -> Result<Self> {
        if pool_size == 0 {
            return Err(Error::InvalidConfig("pool size must be positive".into()));
        }

        let path = path.as_ref();
        let disk_manager = DiskManager::open_or_create(path)?;
        let bpm = Arc::new(BufferPoolManager::with_replacer(pool_size, disk_manager, replacer));
        roots::ensure_roots_page(&bpm)?;

        info!(
            "opened {} ({} frames, {:?} replacer)",
            path.display(),
            pool_size,
            replacer
        );
        Ok(Self { bpm })
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    /// Open (or start) the B+ tree recorded under `index_id`.
    pub fn open_index<C: KeyComparator>(
        &self,
        index_id: u32,
        key_size: usize,
        comparator: C,
    ) -> Result<BPlusTree<C>> {
        BPlusTree::new(index_id, Arc::clone(&self.bpm), comparator, key_size)
    }

    /// Flush every resident page.
    ///
    /// Trees opened from this database keep the pool alive through their own
    /// handle; pages they dirty afterwards are flushed when the last of them
    /// drops.
    pub fn close(self) -> Result<()> {
        self.bpm.flush_all_pages()?;
        info!("closed database ({})", self.bpm.stats().snapshot());
        Ok(())
    }
}
