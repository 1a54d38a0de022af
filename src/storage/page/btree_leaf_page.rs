//! B+ tree leaf node view.

use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, RowId};

use super::btree_page::{BTreePage, NodeKind};
use super::{read_u32, write_u32};

const OFFSET_NEXT: usize = BTreePage::<&[u8]>::HEADER_SIZE;
const OFFSET_ENTRIES: usize = OFFSET_NEXT + 4;

/// Leaf node: sorted `(key, RowId)` pairs plus a link to the right sibling.
///
/// # Layout
/// ```text
/// Offset  Size            Field
/// ------  ----            -----
/// 0       33              common node header (see BTreePage)
/// 33      4               next leaf page id (INVALID for the last leaf)
/// 37      n*(key + 8)     entries: key bytes, then RowId
/// ```
pub struct LeafPage<B> {
    node: BTreePage<B>,
}

impl<B> Deref for LeafPage<B> {
    type Target = BTreePage<B>;

    fn deref(&self) -> &BTreePage<B> {
        &self.node
    }
}

impl<B> DerefMut for LeafPage<B> {
    fn deref_mut(&mut self) -> &mut BTreePage<B> {
        &mut self.node
    }
}

impl<B: AsRef<[u8]>> LeafPage<B> {
    pub fn new(data: B) -> Self {
        Self {
            node: BTreePage::new(data),
        }
    }

    /// Entries that physically fit in one page for `key_size`-byte keys.
    pub fn capacity(key_size: usize) -> usize {
        (PAGE_SIZE - OFFSET_ENTRIES) / (key_size + RowId::SIZE)
    }

    #[inline]
    fn entry_size(&self) -> usize {
        self.key_size() + RowId::SIZE
    }

    #[inline]
    fn entry_offset(&self, index: usize) -> usize {
        OFFSET_ENTRIES + index * self.entry_size()
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(read_u32(self.node.data.as_ref(), OFFSET_NEXT))
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.node.data.as_ref()[offset..offset + self.key_size()]
    }

    pub fn value_at(&self, index: usize) -> RowId {
        let offset = self.entry_offset(index) + self.key_size();
        RowId::from_bytes(&self.node.data.as_ref()[offset..offset + RowId::SIZE])
    }

    /// First index whose key is `>= key`, or `size()` if there is none.
    pub fn key_index<F>(&self, key: &[u8], cmp: &F) -> usize
    where
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        let (mut lo, mut hi) = (0, self.size());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp(self.key_at(mid), key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Exact-match lookup.
    pub fn lookup<F>(&self, key: &[u8], cmp: &F) -> Option<RowId>
    where
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        let index = self.key_index(key, cmp);
        (index < self.size() && cmp(self.key_at(index), key) == Ordering::Equal)
            .then(|| self.value_at(index))
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> LeafPage<B> {
    pub fn init(&mut self, page_id: PageId, parent_id: PageId, key_size: usize, max_size: usize) {
        self.node
            .init(NodeKind::Leaf, page_id, parent_id, key_size, max_size);
        self.set_next_page_id(PageId::INVALID);
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        write_u32(self.node.data.as_mut(), OFFSET_NEXT, next.0);
    }

    fn write_entry(&mut self, index: usize, key: &[u8], value: RowId) {
        let offset = self.entry_offset(index);
        let key_size = self.key_size();
        let data = self.node.data.as_mut();
        data[offset..offset + key_size].copy_from_slice(&key[..key_size]);
        value.write_to(&mut data[offset + key_size..offset + key_size + RowId::SIZE]);
    }

    /// Shift entries `[from, size)` by `delta` slots (positive = right).
    fn shift(&mut self, from: usize, delta: isize) {
        let size = self.size();
        let start = self.entry_offset(from);
        let end = self.entry_offset(size);
        let dest = (start as isize + delta * self.entry_size() as isize) as usize;
        self.node.data.as_mut().copy_within(start..end, dest);
    }

    /// Insert in sorted position. Returns the new size.
    ///
    /// The caller guarantees the key is absent and the page has room.
    pub fn insert<F>(&mut self, key: &[u8], value: RowId, cmp: &F) -> usize
    where
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        let index = self.key_index(key, cmp);
        self.shift(index, 1);
        self.write_entry(index, key, value);
        let size = self.size() + 1;
        self.node.set_size(size);
        size
    }

    /// Delete the entry for `key`. Returns `false` if the key is absent.
    pub fn remove_and_delete_record<F>(&mut self, key: &[u8], cmp: &F) -> bool
    where
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        let index = self.key_index(key, cmp);
        if index >= self.size() || cmp(self.key_at(index), key) != Ordering::Equal {
            return false;
        }
        self.remove_at(index);
        true
    }

    fn remove_at(&mut self, index: usize) {
        self.shift(index + 1, -1);
        let size = self.size() - 1;
        self.node.set_size(size);
    }

    fn append(&mut self, key: &[u8], value: RowId) {
        let size = self.size();
        self.write_entry(size, key, value);
        self.node.set_size(size + 1);
    }

    /// Move the upper half of the entries to an empty `recipient`.
    pub fn move_half_to<R>(&mut self, recipient: &mut LeafPage<R>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let keep = size - size / 2;
        for i in keep..size {
            recipient.append(self.key_at(i), self.value_at(i));
        }
        self.node.set_size(keep);
    }

    /// Move every entry to the end of `recipient`, which takes over this
    /// page's next link.
    pub fn move_all_to<R>(&mut self, recipient: &mut LeafPage<R>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        for i in 0..self.size() {
            recipient.append(self.key_at(i), self.value_at(i));
        }
        recipient.set_next_page_id(self.next_page_id());
        self.node.set_size(0);
    }

    /// Move this page's first entry to the end of `recipient`.
    pub fn move_first_to_end_of<R>(&mut self, recipient: &mut LeafPage<R>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        recipient.append(self.key_at(0), self.value_at(0));
        self.remove_at(0);
    }

    /// Move this page's last entry to the front of `recipient`.
    pub fn move_last_to_front_of<R>(&mut self, recipient: &mut LeafPage<R>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let last = self.size() - 1;
        recipient.shift(0, 1);
        recipient.write_entry(0, self.key_at(last), self.value_at(last));
        let recipient_size = recipient.size() + 1;
        recipient.node.set_size(recipient_size);
        self.node.set_size(last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn key(v: u32) -> [u8; 4] {
        v.to_be_bytes()
    }

    fn rid(v: u32) -> RowId {
        RowId::new(PageId::new(v), v)
    }

    fn leaf_with(buf: &mut [u8], page_id: u32, keys: &[u32]) {
        let mut leaf = LeafPage::new(buf);
        leaf.init(PageId::new(page_id), PageId::INVALID, 4, 8);
        for &k in keys {
            leaf.insert(&key(k), rid(k), &cmp);
        }
    }

    fn keys_of(buf: &[u8]) -> Vec<u32> {
        let leaf = LeafPage::new(buf);
        (0..leaf.size())
            .map(|i| u32::from_be_bytes(leaf.key_at(i).try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_insert_keeps_sorted_order() {
        let mut buf = [0u8; PAGE_SIZE];
        leaf_with(&mut buf, 1, &[5, 1, 3, 4, 2]);

        assert_eq!(keys_of(&buf), vec![1, 2, 3, 4, 5]);
        let leaf = LeafPage::new(&buf[..]);
        assert_eq!(leaf.value_at(2), rid(3));
        assert_eq!(leaf.next_page_id(), PageId::INVALID);
    }

    #[test]
    fn test_lookup_and_key_index() {
        let mut buf = [0u8; PAGE_SIZE];
        leaf_with(&mut buf, 1, &[10, 20, 30]);
        let leaf = LeafPage::new(&buf[..]);

        assert_eq!(leaf.lookup(&key(20), &cmp), Some(rid(20)));
        assert_eq!(leaf.lookup(&key(25), &cmp), None);
        assert_eq!(leaf.key_index(&key(5), &cmp), 0);
        assert_eq!(leaf.key_index(&key(25), &cmp), 2);
        assert_eq!(leaf.key_index(&key(99), &cmp), 3);
    }

    #[test]
    fn test_remove() {
        let mut buf = [0u8; PAGE_SIZE];
        leaf_with(&mut buf, 1, &[1, 2, 3]);
        let mut leaf = LeafPage::new(&mut buf[..]);

        assert!(leaf.remove_and_delete_record(&key(2), &cmp));
        assert!(!leaf.remove_and_delete_record(&key(2), &cmp));
        assert_eq!(leaf.size(), 2);
        assert_eq!(keys_of(&buf), vec![1, 3]);
    }

    #[test]
    fn test_move_half_to() {
        let mut left = [0u8; PAGE_SIZE];
        let mut right = [0u8; PAGE_SIZE];
        leaf_with(&mut left, 1, &[1, 2, 3, 4, 5]);
        leaf_with(&mut right, 2, &[]);

        LeafPage::new(&mut left[..]).move_half_to(&mut LeafPage::new(&mut right[..]));

        assert_eq!(keys_of(&left), vec![1, 2, 3]);
        assert_eq!(keys_of(&right), vec![4, 5]);
    }

    #[test]
    fn test_move_all_to_takes_next_link() {
        let mut left = [0u8; PAGE_SIZE];
        let mut right = [0u8; PAGE_SIZE];
        leaf_with(&mut left, 1, &[1, 2]);
        leaf_with(&mut right, 2, &[3, 4]);
        LeafPage::new(&mut right[..]).set_next_page_id(PageId::new(9));

        LeafPage::new(&mut right[..]).move_all_to(&mut LeafPage::new(&mut left[..]));

        assert_eq!(keys_of(&left), vec![1, 2, 3, 4]);
        assert!(keys_of(&right).is_empty());
        assert_eq!(LeafPage::new(&left[..]).next_page_id(), PageId::new(9));
    }

    #[test]
    fn test_single_entry_moves() {
        let mut left = [0u8; PAGE_SIZE];
        let mut right = [0u8; PAGE_SIZE];
        leaf_with(&mut left, 1, &[1, 2, 3]);
        leaf_with(&mut right, 2, &[7, 8]);

        LeafPage::new(&mut right[..]).move_first_to_end_of(&mut LeafPage::new(&mut left[..]));
        assert_eq!(keys_of(&left), vec![1, 2, 3, 7]);
        assert_eq!(keys_of(&right), vec![8]);

        LeafPage::new(&mut left[..]).move_last_to_front_of(&mut LeafPage::new(&mut right[..]));
        LeafPage::new(&mut left[..]).move_last_to_front_of(&mut LeafPage::new(&mut right[..]));
        assert_eq!(keys_of(&left), vec![1, 2]);
        assert_eq!(keys_of(&right), vec![3, 7, 8]);
        assert_eq!(LeafPage::new(&right[..]).value_at(0), rid(3));
    }

    #[test]
    fn test_capacity() {
        assert_eq!(LeafPage::<&[u8]>::capacity(8), (PAGE_SIZE - 37) / 16);
    }
}
