//! Ordered scan over the B+ tree leaf chain.

use crate::buffer::{BufferPoolManager, PageHandle};
use crate::common::{PageId, Result, RowId};
use crate::storage::page::LeafPage;

/// Forward iterator over `(key, row id)` pairs in key order.
///
/// Holds a pin on the current leaf only; moving past its last entry unpins
/// it and pins the next leaf. The end iterator holds no pin.
///
/// Iteration yields `Err` if the next leaf cannot be fetched, after which
/// the iterator is at its end.
pub struct IndexIterator<'a> {
    bpm: &'a BufferPoolManager,
    handle: Option<PageHandle<'a>>,
    index: usize,
}

impl<'a> IndexIterator<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, handle: PageHandle<'a>, index: usize) -> Result<Self> {
        let mut iter = Self {
            bpm,
            handle: Some(handle),
            index,
        };
        iter.normalize()?;
        Ok(iter)
    }

    pub(crate) fn end(bpm: &'a BufferPoolManager) -> Self {
        Self {
            bpm,
            handle: None,
            index: 0,
        }
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.handle.is_none()
    }

    /// Leaf the iterator points into, `PageId::INVALID` at the end.
    pub fn page_id(&self) -> PageId {
        self.handle.as_ref().map_or(PageId::INVALID, |h| h.page_id())
    }

    /// Slot within the current leaf.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current entry without advancing.
    pub fn current(&self) -> Option<(Vec<u8>, RowId)> {
        let handle = self.handle.as_ref()?;
        let page = handle.read();
        let leaf = LeafPage::new(page.as_slice());
        let entry = (leaf.key_at(self.index).to_vec(), leaf.value_at(self.index));
        Some(entry)
    }

    /// A second iterator at the same position with its own pin.
    pub fn try_clone(&self) -> Result<Self> {
        let handle = match &self.handle {
            Some(handle) => Some(self.bpm.fetch_page(handle.page_id())?),
            None => None,
        };
        Ok(Self {
            bpm: self.bpm,
            handle,
            index: self.index,
        })
    }

    /// Skip exhausted leaves until the position names an entry or the end.
    fn normalize(&mut self) -> Result<()> {
        loop {
            let next_id = match &self.handle {
                None => return Ok(()),
                Some(handle) => {
                    let page = handle.read();
                    let leaf = LeafPage::new(page.as_slice());
                    if self.index < leaf.size() {
                        return Ok(());
                    }
                    leaf.next_page_id()
                }
            };

            self.index = 0;
            self.handle = None;
            if next_id.is_valid() {
                self.handle = Some(self.bpm.fetch_page(next_id)?);
            }
        }
    }
}

impl Iterator for IndexIterator<'_> {
    type Item = Result<(Vec<u8>, RowId)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.current()?;
        self.index += 1;
        match self.normalize() {
            Ok(()) => Some(Ok(entry)),
            Err(e) => Some(Err(e)),
        }
    }
}

impl PartialEq for IndexIterator<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.page_id() == other.page_id() && self.index == other.index
    }
}

impl std::fmt::Debug for IndexIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexIterator")
            .field("page_id", &self.page_id())
            .field("index", &self.index)
            .finish()
    }
}
