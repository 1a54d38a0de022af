//! Row location type.

use std::fmt;

use crate::common::PageId;

/// Location of a row in table-heap storage: page id plus slot number.
///
/// The B+ tree stores these as leaf values and hands them back on lookup.
/// It never dereferences them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId {
    pub page_id: PageId,
    pub slot: u32,
}

impl RowId {
    /// Size of the on-disk encoding in bytes.
    pub const SIZE: usize = 8;

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    /// Write the 8-byte little-endian encoding into `buf`.
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.page_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot.to_le_bytes());
    }

    /// Read a row id from the first 8 bytes of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Self {
        let page_id = PageId::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let slot = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Self { page_id, slot }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row({}, {})", self.page_id.0, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_id_byte_layout() {
        let rid = RowId::new(PageId::new(0x0403_0201), 0x0807_0605);
        let mut buf = [0u8; RowId::SIZE];
        rid.write_to(&mut buf);

        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(RowId::from_bytes(&buf), rid);
    }

    #[test]
    fn test_row_id_display() {
        assert_eq!(format!("{}", RowId::new(PageId::new(3), 7)), "Row(3, 7)");
    }
}
