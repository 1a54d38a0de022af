//! B+ tree over buffer-pool pages.

use std::cmp::Ordering;
use std::sync::Arc;

use log::debug;

use crate::buffer::{BufferPoolManager, PageHandle};
use crate::common::{Error, PageId, Result, RowId};
use crate::storage::page::{BTreePage, InternalPage, LeafPage, NodeKind};

use super::iterator::IndexIterator;
use super::key::KeyComparator;
use super::roots;

/// Disk-resident B+ tree mapping unique fixed-size keys to [`RowId`]s.
///
/// # Structure
/// ```text
///                 ┌──────────────────┐
///                 │ internal (root)  │   keys: [_, 20, 40]
///                 └──┬──────┬──────┬─┘
///          ┌─────────┘      │      └─────────┐
///     ┌────▼────┐      ┌────▼────┐      ┌────▼────┐
///     │  leaf   │ ───▶ │  leaf   │ ───▶ │  leaf   │   next-leaf chain
///     └─────────┘      └─────────┘      └─────────┘
/// ```
///
/// A leaf splits when it reaches `leaf_max_size` entries and an internal node
/// when it reaches `internal_max_size` children. A non-root node that drops
/// below half of its max size borrows one entry from a sibling, or merges
/// with it when both fit in one node.
///
/// Every method unpins every page it pins before returning. Node pages are
/// only ever accessed through [`BufferPoolManager`] guards.
///
/// # Example
/// ```ignore
/// let mut tree = BPlusTree::new(1, bpm, I64Comparator, 8)?;
/// tree.insert(&encode_i64_key(42, 8), RowId::new(PageId::new(3), 0))?;
/// assert!(tree.get_value(&encode_i64_key(42, 8))?.is_some());
/// ```
pub struct BPlusTree<C> {
    index_id: u32,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    key_size: usize,
    leaf_max_size: usize,
    internal_max_size: usize,
    root_page_id: PageId,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Open the tree recorded under `index_id`, or an empty one.
    ///
    /// Node fan-out is derived from `key_size` so that a full node still
    /// fits in one page.
    pub fn new(index_id: u32, bpm: Arc<BufferPoolManager>, comparator: C, key_size: usize) -> Result<Self> {
        let leaf_max_size = LeafPage::<&[u8]>::capacity(key_size).saturating_sub(1);
        let internal_max_size = InternalPage::<&[u8]>::capacity(key_size).saturating_sub(1);
        Self::with_node_sizes(
            index_id,
            bpm,
            comparator,
            key_size,
            leaf_max_size,
            internal_max_size,
        )
    }

    /// Like [`new`](Self::new) with explicit node sizes.
    ///
    /// # Errors
    /// `Error::InvalidConfig` unless `key_size > 0`, `leaf_max_size >= 2`,
    /// `internal_max_size >= 4`, and both sizes stay below what fits in a
    /// page. Also rejected when the stored tree uses a different key size.
    pub fn with_node_sizes(
        index_id: u32,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        key_size: usize,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        if key_size == 0 {
            return Err(Error::InvalidConfig("key size must be positive".into()));
        }
        let leaf_capacity = LeafPage::<&[u8]>::capacity(key_size);
        if leaf_max_size < 2 || leaf_max_size >= leaf_capacity {
            return Err(Error::InvalidConfig(format!(
                "leaf max size {} outside 2..{} for {}-byte keys",
                leaf_max_size, leaf_capacity, key_size
            )));
        }
        let internal_capacity = InternalPage::<&[u8]>::capacity(key_size);
        if internal_max_size < 4 || internal_max_size >= internal_capacity {
            return Err(Error::InvalidConfig(format!(
                "internal max size {} outside 4..{} for {}-byte keys",
                internal_max_size, internal_capacity, key_size
            )));
        }

        roots::ensure_roots_page(&bpm)?;
        let root_page_id = roots::load_root(&bpm, index_id)?.unwrap_or(PageId::INVALID);

        if root_page_id.is_valid() {
            let guard = bpm.fetch_page_read(root_page_id)?;
            let stored = BTreePage::new(guard.as_slice()).key_size();
            if stored != key_size {
                return Err(Error::InvalidConfig(format!(
                    "index {} stores {}-byte keys, opened with {}",
                    index_id, stored, key_size
                )));
            }
        }

        Ok(Self {
            index_id,
            bpm,
            comparator,
            key_size,
            leaf_max_size,
            internal_max_size,
            root_page_id,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn index_id(&self) -> u32 {
        self.index_id
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    #[inline]
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    #[inline]
    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    #[inline]
    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    #[inline]
    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.root_page_id.is_valid()
    }

    /// Number of levels; 0 for an empty tree, 1 for a single leaf.
    pub fn height(&self) -> Result<usize> {
        let mut height = 0;
        let mut page_id = self.root_page_id;
        while page_id.is_valid() {
            height += 1;
            let guard = self.bpm.fetch_page_read(page_id)?;
            page_id = match BTreePage::new(guard.as_slice()).node_kind() {
                Some(NodeKind::Internal) => InternalPage::new(guard.as_slice()).value_at(0),
                Some(NodeKind::Leaf) => PageId::INVALID,
                None => return Err(Error::NotTreePage(page_id.0)),
            };
        }
        Ok(height)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Row location stored under `key`.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<RowId>> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(None);
        }

        let comparator = &self.comparator;
        let cmp = |a: &[u8], b: &[u8]| comparator.compare(a, b);
        let handle = find_leaf(&self.bpm, self.root_page_id, Some(key), &cmp)?;
        let page = handle.read();
        let value = LeafPage::new(page.as_slice()).lookup(key, &cmp);
        Ok(value)
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert a unique key. Returns `false` if the key already exists.
    pub fn insert(&mut self, key: &[u8], value: RowId) -> Result<bool> {
        self.check_key(key)?;
        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }
        self.insert_into_leaf(key, value)
    }

    fn start_new_tree(&mut self, key: &[u8], value: RowId) -> Result<()> {
        let comparator = &self.comparator;
        let cmp = |a: &[u8], b: &[u8]| comparator.compare(a, b);
        let mut guard = self.bpm.new_page_write()?;
        let root_id = guard.page_id();

        let mut leaf = LeafPage::new(guard.as_mut_slice());
        leaf.init(root_id, PageId::INVALID, self.key_size, self.leaf_max_size);
        leaf.insert(key, value, &cmp);
        drop(guard);

        debug!("index {}: new tree rooted at {}", self.index_id, root_id);
        self.set_root(root_id)
    }

    fn insert_into_leaf(&mut self, key: &[u8], value: RowId) -> Result<bool> {
        let comparator = &self.comparator;
        let cmp = |a: &[u8], b: &[u8]| comparator.compare(a, b);
        let mut handle = find_leaf(&self.bpm, self.root_page_id, Some(key), &cmp)?;
        let leaf_id = handle.page_id();

        {
            let page = handle.read();
            if LeafPage::new(page.as_slice()).lookup(key, &cmp).is_some() {
                return Ok(false);
            }
        }

        let (size, max_size) = {
            let mut page = handle.write();
            let mut leaf = LeafPage::new(page.as_mut_slice());
            let size = leaf.insert(key, value, &cmp);
            (size, leaf.max_size())
        };
        if size < max_size {
            return Ok(true);
        }

        let mut sibling = self.bpm.new_page()?;
        let sibling_id = sibling.page_id();
        let (separator, parent_id) = {
            let mut page = handle.write();
            let mut sibling_page = sibling.write();
            let mut leaf = LeafPage::new(page.as_mut_slice());
            let mut right = LeafPage::new(sibling_page.as_mut_slice());

            right.init(sibling_id, leaf.parent_page_id(), self.key_size, leaf.max_size());
            leaf.move_half_to(&mut right);
            right.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(sibling_id);

            (right.key_at(0).to_vec(), leaf.parent_page_id())
        };
        drop(sibling);
        drop(handle);

        debug!("index {}: split leaf {} into {}", self.index_id, leaf_id, sibling_id);
        self.insert_into_parent(leaf_id, parent_id, &separator, sibling_id)?;
        Ok(true)
    }

    /// Link `right_id` (split off `left_id`) into the parent under `key`,
    /// splitting upward as needed.
    fn insert_into_parent(
        &mut self,
        left_id: PageId,
        parent_id: PageId,
        key: &[u8],
        right_id: PageId,
    ) -> Result<()> {
        if !parent_id.is_valid() {
            let root_id = {
                let mut guard = self.bpm.new_page_write()?;
                let root_id = guard.page_id();
                let mut root = InternalPage::new(guard.as_mut_slice());
                root.init(root_id, PageId::INVALID, self.key_size, self.internal_max_size);
                root.populate_new_root(left_id, key, right_id);
                root_id
            };
            self.set_parent(left_id, root_id)?;
            self.set_parent(right_id, root_id)?;
            debug!("index {}: grew new root {}", self.index_id, root_id);
            return self.set_root(root_id);
        }

        let mut guard = self.bpm.fetch_page_write(parent_id)?;
        let (size, max_size, grandparent_id) = {
            let mut parent = InternalPage::new(guard.as_mut_slice());
            let size = parent
                .insert_node_after(left_id, key, right_id)
                .ok_or_else(|| Error::Corrupted(format!("{} is not a child of {}", left_id, parent_id)))?;
            (size, parent.max_size(), parent.parent_page_id())
        };
        if size < max_size {
            return Ok(());
        }

        let mut sibling = self.bpm.new_page_write()?;
        let sibling_id = sibling.page_id();
        let (separator, moved) = {
            let mut parent = InternalPage::new(guard.as_mut_slice());
            let mut right = InternalPage::new(sibling.as_mut_slice());
            right.init(sibling_id, grandparent_id, self.key_size, max_size);
            let moved = parent.move_half_to(&mut right);
            (right.key_at(0).to_vec(), moved)
        };
        drop(sibling);
        drop(guard);

        for child in moved {
            self.set_parent(child, sibling_id)?;
        }
        debug!("index {}: split internal {} into {}", self.index_id, parent_id, sibling_id);
        self.insert_into_parent(parent_id, grandparent_id, &separator, sibling_id)
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove `key`. Returns `false` if it was not present.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(false);
        }

        let comparator = &self.comparator;
        let cmp = |a: &[u8], b: &[u8]| comparator.compare(a, b);
        let mut handle = find_leaf(&self.bpm, self.root_page_id, Some(key), &cmp)?;
        let leaf_id = handle.page_id();

        {
            let page = handle.read();
            if LeafPage::new(page.as_slice()).lookup(key, &cmp).is_none() {
                return Ok(false);
            }
        }
        {
            let mut page = handle.write();
            LeafPage::new(page.as_mut_slice()).remove_and_delete_record(key, &cmp);
        }
        drop(handle);

        self.rebalance(leaf_id)?;
        Ok(true)
    }

    /// Restore the size invariant of `node_id` after an entry left it.
    fn rebalance(&mut self, node_id: PageId) -> Result<()> {
        let (kind, size, min_size, parent_id) = {
            let guard = self.bpm.fetch_page_read(node_id)?;
            let node = BTreePage::new(guard.as_slice());
            let kind = node.node_kind().ok_or(Error::NotTreePage(node_id.0))?;
            (kind, node.size(), node.min_size(), node.parent_page_id())
        };

        if !parent_id.is_valid() {
            return self.adjust_root(node_id, kind, size);
        }
        if size >= min_size {
            return Ok(());
        }
        self.coalesce_or_redistribute(node_id, kind, parent_id)
    }

    /// Shrink the tree when the root empties out.
    fn adjust_root(&mut self, root_id: PageId, kind: NodeKind, size: usize) -> Result<()> {
        match kind {
            NodeKind::Leaf if size == 0 => {
                self.bpm.delete_page(root_id)?;
                debug!("index {}: tree is now empty", self.index_id);
                self.set_root(PageId::INVALID)
            }
            NodeKind::Internal if size == 1 => {
                let child = {
                    let mut guard = self.bpm.fetch_page_write(root_id)?;
                    InternalPage::new(guard.as_mut_slice()).remove_and_return_only_child()
                };
                self.bpm.delete_page(root_id)?;
                self.set_parent(child, PageId::INVALID)?;
                debug!("index {}: collapsed root {} into {}", self.index_id, root_id, child);
                self.set_root(child)
            }
            _ => Ok(()),
        }
    }

    fn coalesce_or_redistribute(&mut self, node_id: PageId, kind: NodeKind, parent_id: PageId) -> Result<()> {
        let (index, sibling_id) = {
            let guard = self.bpm.fetch_page_read(parent_id)?;
            let parent = InternalPage::new(guard.as_slice());
            let index = parent
                .value_index(node_id)
                .ok_or_else(|| Error::Corrupted(format!("{} is not a child of {}", node_id, parent_id)))?;
            let sibling_index = if index == 0 { 1 } else { index - 1 };
            (index, parent.value_at(sibling_index))
        };

        let (node_size, max_size) = {
            let guard = self.bpm.fetch_page_read(node_id)?;
            let node = BTreePage::new(guard.as_slice());
            (node.size(), node.max_size())
        };
        let sibling_size = {
            let guard = self.bpm.fetch_page_read(sibling_id)?;
            BTreePage::new(guard.as_slice()).size()
        };

        if node_size + sibling_size < max_size {
            // Always merge the right page into the left one.
            let (left_id, right_id, right_index) = if index == 0 {
                (node_id, sibling_id, 1)
            } else {
                (sibling_id, node_id, index)
            };
            self.coalesce(kind, left_id, right_id, parent_id, right_index)?;
            self.rebalance(parent_id)
        } else {
            self.redistribute(kind, node_id, sibling_id, parent_id, index)
        }
    }

    /// Move everything in `right_id` into `left_id`, drop the separator at
    /// `right_index` from the parent and delete the right page.
    fn coalesce(
        &self,
        kind: NodeKind,
        left_id: PageId,
        right_id: PageId,
        parent_id: PageId,
        right_index: usize,
    ) -> Result<()> {
        let moved = {
            let mut parent_guard = self.bpm.fetch_page_write(parent_id)?;
            let mut left_guard = self.bpm.fetch_page_write(left_id)?;
            let mut right_guard = self.bpm.fetch_page_write(right_id)?;
            let mut parent = InternalPage::new(parent_guard.as_mut_slice());

            let moved = match kind {
                NodeKind::Leaf => {
                    let mut left = LeafPage::new(left_guard.as_mut_slice());
                    LeafPage::new(right_guard.as_mut_slice()).move_all_to(&mut left);
                    Vec::new()
                }
                NodeKind::Internal => {
                    let middle = parent.key_at(right_index).to_vec();
                    let mut left = InternalPage::new(left_guard.as_mut_slice());
                    InternalPage::new(right_guard.as_mut_slice()).move_all_to(&mut left, &middle)
                }
            };
            parent.remove(right_index);
            moved
        };

        for child in moved {
            self.set_parent(child, left_id)?;
        }
        self.bpm.delete_page(right_id)?;
        debug!("index {}: merged {} into {}", self.index_id, right_id, left_id);
        Ok(())
    }

    /// Move one entry from `sibling_id` into `node_id` and rewrite the
    /// separator between them. `index` is the node's slot in the parent.
    fn redistribute(
        &self,
        kind: NodeKind,
        node_id: PageId,
        sibling_id: PageId,
        parent_id: PageId,
        index: usize,
    ) -> Result<()> {
        let moved_child = {
            let mut parent_guard = self.bpm.fetch_page_write(parent_id)?;
            let mut node_guard = self.bpm.fetch_page_write(node_id)?;
            let mut sibling_guard = self.bpm.fetch_page_write(sibling_id)?;
            let mut parent = InternalPage::new(parent_guard.as_mut_slice());

            match kind {
                NodeKind::Leaf => {
                    let mut node = LeafPage::new(node_guard.as_mut_slice());
                    let mut sibling = LeafPage::new(sibling_guard.as_mut_slice());
                    if index == 0 {
                        sibling.move_first_to_end_of(&mut node);
                        parent.set_key_at(1, sibling.key_at(0));
                    } else {
                        sibling.move_last_to_front_of(&mut node);
                        parent.set_key_at(index, node.key_at(0));
                    }
                    None
                }
                NodeKind::Internal => {
                    let mut node = InternalPage::new(node_guard.as_mut_slice());
                    let mut sibling = InternalPage::new(sibling_guard.as_mut_slice());
                    let child = if index == 0 {
                        let middle = parent.key_at(1).to_vec();
                        let child = sibling.move_first_to_end_of(&mut node, &middle);
                        parent.set_key_at(1, sibling.key_at(0));
                        child
                    } else {
                        let middle = parent.key_at(index).to_vec();
                        let child = sibling.move_last_to_front_of(&mut node, &middle);
                        parent.set_key_at(index, node.key_at(0));
                        child
                    };
                    Some(child)
                }
            }
        };

        if let Some(child) = moved_child {
            self.set_parent(child, node_id)?;
        }
        debug!("index {}: moved one entry from {} to {}", self.index_id, sibling_id, node_id);
        Ok(())
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator<'_>> {
        if self.is_empty() {
            return Ok(self.end());
        }
        let comparator = &self.comparator;
        let cmp = |a: &[u8], b: &[u8]| comparator.compare(a, b);
        let handle = find_leaf(&self.bpm, self.root_page_id, None, &cmp)?;
        IndexIterator::new(&self.bpm, handle, 0)
    }

    /// Iterator positioned at the first key `>= key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<IndexIterator<'_>> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(self.end());
        }
        let comparator = &self.comparator;
        let cmp = |a: &[u8], b: &[u8]| comparator.compare(a, b);
        let handle = find_leaf(&self.bpm, self.root_page_id, Some(key), &cmp)?;
        let index = {
            let page = handle.read();
            LeafPage::new(page.as_slice()).key_index(key, &cmp)
        };
        IndexIterator::new(&self.bpm, handle, index)
    }

    /// The past-the-end iterator.
    pub fn end(&self) -> IndexIterator<'_> {
        IndexIterator::end(&self.bpm)
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Delete every node page and drop the tree's registry record.
    pub fn destroy(&mut self) -> Result<()> {
        let mut pending = Vec::new();
        if self.root_page_id.is_valid() {
            pending.push(self.root_page_id);
        }

        while let Some(page_id) = pending.pop() {
            {
                let guard = self.bpm.fetch_page_read(page_id)?;
                if BTreePage::new(guard.as_slice()).node_kind() == Some(NodeKind::Internal) {
                    pending.extend(InternalPage::new(guard.as_slice()).children());
                }
            }
            self.bpm.delete_page(page_id)?;
        }

        debug!("index {}: destroyed", self.index_id);
        self.set_root(PageId::INVALID)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(Error::KeySizeMismatch {
                expected: self.key_size,
                actual: key.len(),
            });
        }
        Ok(())
    }

    fn set_parent(&self, child_id: PageId, parent_id: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(child_id)?;
        BTreePage::new(guard.as_mut_slice()).set_parent_page_id(parent_id);
        Ok(())
    }

    /// Change the root and record it in the index roots page.
    fn set_root(&mut self, root_id: PageId) -> Result<()> {
        self.root_page_id = root_id;
        roots::store_root(&self.bpm, self.index_id, root_id)
    }
}

/// Descend from `root_id` to the leaf that owns `key`, or to the leftmost
/// leaf when `key` is `None`. Each parent stays pinned until its child is.
fn find_leaf<'a, F>(
    bpm: &'a BufferPoolManager,
    root_id: PageId,
    key: Option<&[u8]>,
    cmp: &F,
) -> Result<PageHandle<'a>>
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    let mut handle = bpm.fetch_page(root_id)?;
    loop {
        let child_id = {
            let page = handle.read();
            match BTreePage::new(page.as_slice()).node_kind() {
                Some(NodeKind::Leaf) => None,
                Some(NodeKind::Internal) => {
                    let node = InternalPage::new(page.as_slice());
                    Some(match key {
                        Some(key) => node.lookup(key, cmp),
                        None => node.value_at(0),
                    })
                }
                None => return Err(Error::NotTreePage(handle.page_id().0)),
            }
        };

        match child_id {
            Some(child_id) => handle = bpm.fetch_page(child_id)?,
            None => return Ok(handle),
        }
    }
}
