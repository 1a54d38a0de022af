//! Key comparators.
//!
//! Keys are fixed-size byte strings. A [`KeyComparator`] gives them an
//! order; any `Fn(&[u8], &[u8]) -> Ordering` closure works as one.

use std::cmp::Ordering;

/// Total order over fixed-size keys.
pub trait KeyComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

impl<F> KeyComparator for F
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self(a, b)
    }
}

/// Lexicographic byte order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Orders keys by a little-endian `i64` in their first 8 bytes.
///
/// Keys shorter than 8 bytes fall back to byte order.
#[derive(Debug, Default, Clone, Copy)]
pub struct I64Comparator;

fn leading_i64(key: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = key.get(..8)?.try_into().ok()?;
    Some(i64::from_le_bytes(bytes))
}

impl KeyComparator for I64Comparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match (leading_i64(a), leading_i64(b)) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a[8..].cmp(&b[8..])),
            _ => a.cmp(b),
        }
    }
}

/// Encode `value` as a `key_size`-byte key for [`I64Comparator`].
///
/// The value occupies the first 8 bytes; the rest is zero padding.
///
/// # Panics
/// Panics if `key_size < 8`.
pub fn encode_i64_key(value: i64, key_size: usize) -> Vec<u8> {
    assert!(key_size >= 8, "i64 keys need at least 8 bytes");
    let mut key = vec![0u8; key_size];
    key[..8].copy_from_slice(&value.to_le_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i64_order_differs_from_bytes() {
        let neg = encode_i64_key(-1, 8);
        let pos = encode_i64_key(1, 8);
        let big = encode_i64_key(256, 8);

        assert_eq!(I64Comparator.compare(&neg, &pos), Ordering::Less);
        assert_eq!(I64Comparator.compare(&pos, &big), Ordering::Less);
        // Little-endian bytes sort 256 before 1.
        assert_eq!(BytewiseComparator.compare(&pos, &big), Ordering::Greater);
    }

    #[test]
    fn test_padding() {
        let key = encode_i64_key(7, 16);
        assert_eq!(key.len(), 16);
        assert!(key[8..].iter().all(|&b| b == 0));
        assert_eq!(I64Comparator.compare(&key, &encode_i64_key(7, 16)), Ordering::Equal);
    }

    #[test]
    fn test_closure_comparator() {
        let reverse = |a: &[u8], b: &[u8]| b.cmp(a);
        assert_eq!(reverse.compare(b"a", b"b"), Ordering::Greater);
    }

    #[test]
    fn test_short_keys_use_byte_order() {
        assert_eq!(I64Comparator.compare(b"ab", b"ac"), Ordering::Less);
    }
}
