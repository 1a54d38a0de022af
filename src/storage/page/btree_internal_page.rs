//! B+ tree internal node view.

use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};

use crate::common::config::PAGE_SIZE;
use crate::common::PageId;

use super::btree_page::{BTreePage, NodeKind};
use super::{read_u32, write_u32};

const OFFSET_ENTRIES: usize = BTreePage::<&[u8]>::HEADER_SIZE;

/// Internal node: `size` child pointers separated by `size - 1` keys.
///
/// Entry `i` is `(key_i, child_i)`. The key in slot 0 is never compared;
/// `child_i` holds the keys `k` with `key_i <= k < key_{i+1}`.
///
/// # Layout
/// ```text
/// Offset  Size            Field
/// ------  ----            -----
/// 0       33              common node header (see BTreePage)
/// 33      n*(key + 4)     entries: key bytes, then child page id
/// ```
///
/// Methods that move children between pages return the moved child ids;
/// the caller owns re-parenting them.
pub struct InternalPage<B> {
    node: BTreePage<B>,
}

impl<B> Deref for InternalPage<B> {
    type Target = BTreePage<B>;

    fn deref(&self) -> &BTreePage<B> {
        &self.node
    }
}

impl<B> DerefMut for InternalPage<B> {
    fn deref_mut(&mut self) -> &mut BTreePage<B> {
        &mut self.node
    }
}

impl<B: AsRef<[u8]>> InternalPage<B> {
    pub fn new(data: B) -> Self {
        Self {
            node: BTreePage::new(data),
        }
    }

    /// Entries that physically fit in one page for `key_size`-byte keys.
    pub fn capacity(key_size: usize) -> usize {
        (PAGE_SIZE - OFFSET_ENTRIES) / (key_size + PageId::SIZE)
    }

    #[inline]
    fn entry_size(&self) -> usize {
        self.key_size() + PageId::SIZE
    }

    #[inline]
    fn entry_offset(&self, index: usize) -> usize {
        OFFSET_ENTRIES + index * self.entry_size()
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.node.data.as_ref()[offset..offset + self.key_size()]
    }

    pub fn value_at(&self, index: usize) -> PageId {
        let offset = self.entry_offset(index) + self.key_size();
        PageId::new(read_u32(self.node.data.as_ref(), offset))
    }

    /// Slot holding `child`, if any.
    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child)
    }

    /// Child whose key range contains `key`.
    pub fn lookup<F>(&self, key: &[u8], cmp: &F) -> PageId
    where
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        // Last slot in 1..size whose key is <= `key`; slot 0 if none.
        let (mut lo, mut hi) = (1, self.size());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp(self.key_at(mid), key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        self.value_at(lo - 1)
    }

    /// Every child pointer, in key order.
    pub fn children(&self) -> Vec<PageId> {
        (0..self.size()).map(|i| self.value_at(i)).collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> InternalPage<B> {
    pub fn init(&mut self, page_id: PageId, parent_id: PageId, key_size: usize, max_size: usize) {
        self.node
            .init(NodeKind::Internal, page_id, parent_id, key_size, max_size);
    }

    pub fn set_key_at(&mut self, index: usize, key: &[u8]) {
        let offset = self.entry_offset(index);
        let key_size = self.key_size();
        self.node.data.as_mut()[offset..offset + key_size].copy_from_slice(&key[..key_size]);
    }

    pub fn set_value_at(&mut self, index: usize, child: PageId) {
        let offset = self.entry_offset(index) + self.key_size();
        write_u32(self.node.data.as_mut(), offset, child.0);
    }

    fn shift(&mut self, from: usize, delta: isize) {
        let size = self.size();
        let start = self.entry_offset(from);
        let end = self.entry_offset(size);
        let dest = (start as isize + delta * self.entry_size() as isize) as usize;
        self.node.data.as_mut().copy_within(start..end, dest);
    }

    fn append(&mut self, key: &[u8], child: PageId) {
        let size = self.size();
        self.set_key_at(size, key);
        self.set_value_at(size, child);
        self.node.set_size(size + 1);
    }

    /// Turn an empty page into a root with two children.
    pub fn populate_new_root(&mut self, left: PageId, key: &[u8], right: PageId) {
        self.set_value_at(0, left);
        self.set_key_at(1, key);
        self.set_value_at(1, right);
        self.node.set_size(2);
    }

    /// Insert `(key, new_child)` right after the slot holding `old_child`.
    /// Returns the new size, or `None` if `old_child` is not a child.
    pub fn insert_node_after(
        &mut self,
        old_child: PageId,
        key: &[u8],
        new_child: PageId,
    ) -> Option<usize> {
        let index = self.value_index(old_child)? + 1;
        self.shift(index, 1);
        self.set_key_at(index, key);
        self.set_value_at(index, new_child);
        let size = self.size() + 1;
        self.node.set_size(size);
        Some(size)
    }

    /// Drop the entry at `index`.
    pub fn remove(&mut self, index: usize) {
        self.shift(index + 1, -1);
        let size = self.size() - 1;
        self.node.set_size(size);
    }

    /// Empty a single-child root and return that child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        let child = self.value_at(0);
        self.node.set_size(0);
        child
    }

    /// Move the upper half of the entries to an empty `recipient`.
    ///
    /// Afterwards `recipient.key_at(0)` is the separator to push up.
    pub fn move_half_to<R>(&mut self, recipient: &mut InternalPage<R>) -> Vec<PageId>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let keep = size - size / 2;
        let mut moved = Vec::with_capacity(size - keep);
        for i in keep..size {
            recipient.append(self.key_at(i), self.value_at(i));
            moved.push(self.value_at(i));
        }
        self.node.set_size(keep);
        moved
    }

    /// Append every entry to `recipient`, pulling `middle_key` (the parent's
    /// separator) down as the key of this page's first child.
    pub fn move_all_to<R>(&mut self, recipient: &mut InternalPage<R>, middle_key: &[u8]) -> Vec<PageId>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        self.set_key_at(0, middle_key);
        let moved = self.children();
        for i in 0..self.size() {
            recipient.append(self.key_at(i), self.value_at(i));
        }
        self.node.set_size(0);
        moved
    }

    /// Move this page's first child to the end of `recipient` under
    /// `middle_key`. Afterwards `self.key_at(0)` is the new separator.
    pub fn move_first_to_end_of<R>(&mut self, recipient: &mut InternalPage<R>, middle_key: &[u8]) -> PageId
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let child = self.value_at(0);
        recipient.append(middle_key, child);
        self.remove(0);
        child
    }

    /// Move this page's last child to the front of `recipient`, whose old
    /// first child becomes keyed by `middle_key`. Afterwards
    /// `recipient.key_at(0)` is the new separator.
    pub fn move_last_to_front_of<R>(&mut self, recipient: &mut InternalPage<R>, middle_key: &[u8]) -> PageId
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let last = self.size() - 1;
        let child = self.value_at(last);

        recipient.shift(0, 1);
        let recipient_size = recipient.size() + 1;
        recipient.node.set_size(recipient_size);
        recipient.set_key_at(1, middle_key);
        recipient.set_key_at(0, self.key_at(last));
        recipient.set_value_at(0, child);

        self.node.set_size(last);
        child
    }
}
