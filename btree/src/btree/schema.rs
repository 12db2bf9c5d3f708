//! Per-tree key semantics.
//!
//! The engine only knows how to frame records. What a key means, how two
//! keys order, and whether record contents need their own byte-order
//! conversion is supplied by the owner of the tree.

use std::cmp::Ordering;

use crate::btree::endian::Direction;
use crate::btree::node::NodeKind;

/// Key comparison and record-content conversion for one tree.
pub trait KeySchema {
    /// Order `search_key` relative to `candidate_key`. Both are key bodies,
    /// without the length prefix.
    fn compare(&self, search_key: &[u8], candidate_key: &[u8]) -> Ordering;

    /// Convert the key body and payload of one record between on-disk and
    /// host order. The engine has already converted the key length and,
    /// for index records, the child pointer; `data` is empty for index
    /// records.
    ///
    /// Returning an error marks the node as corrupt.
    fn swap_record(
        &self,
        _kind: NodeKind,
        _key: &mut [u8],
        _data: &mut [u8],
        _direction: Direction,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Keys compared as raw bytes, contents stored verbatim.
///
/// Index keys padded to a fixed length would sort after their unpadded
/// leaf counterparts, so trees using this schema want variable-length index
/// keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseKeys;

impl KeySchema for BytewiseKeys {
    fn compare(&self, search_key: &[u8], candidate_key: &[u8]) -> Ordering {
        search_key.cmp(candidate_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytewise_order() {
        let keys = BytewiseKeys;
        assert_eq!(keys.compare(b"a", b"b"), Ordering::Less);
        assert_eq!(keys.compare(b"ab", b"a"), Ordering::Greater);
        assert_eq!(keys.compare(b"same", b"same"), Ordering::Equal);
    }

    #[test]
    fn test_default_swap_is_noop() {
        let mut key = [1, 2];
        let mut data = [3, 4];
        BytewiseKeys
            .swap_record(NodeKind::Leaf, &mut key, &mut data, Direction::ToHost)
            .unwrap();
        assert_eq!((key, data), ([1, 2], [3, 4]));
    }
}
