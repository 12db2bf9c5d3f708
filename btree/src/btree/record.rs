//! Key/data record layout.
//!
//! A record is a length-prefixed key followed by its payload. The prefix is
//! a u16 when the tree has big keys, a u8 otherwise. The key (prefix
//! included) is padded to an even length, and so is the payload, so every
//! record starts on an even offset.
//!
//! Leaf records carry caller data after the key. Index records carry a
//! 4-byte child node number. Without variable-length index keys, every
//! index key is padded out to the tree's maximum key length.

use crate::btree::endian::{host_u16, host_u32, set_host_u16, set_host_u32};
use crate::btree::header::TreeAttributes;
use crate::btree::node::{DESCRIPTOR_SIZE, OFFSET_SIZE};
use crate::storage::io::NodeNumber;

/// Size of the child pointer in an index record.
pub const CHILD_POINTER_SIZE: usize = 4;

#[must_use]
pub const fn round_even(n: usize) -> usize {
    n + (n & 1)
}

/// Largest record that may be stored in a node of `node_size` bytes.
///
/// Two such records, their offsets and the free-space offset always fit in
/// one node, which is what lets any split produce two legal halves.
#[must_use]
pub const fn max_inline(node_size: usize) -> usize {
    ((node_size - DESCRIPTOR_SIZE - 3 * OFFSET_SIZE) / 2) & !1
}

/// How keys are laid out in this tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    big_keys: bool,
    variable_index_keys: bool,
    max_key_length: u16,
}

impl RecordLayout {
    #[must_use]
    pub const fn new(attributes: TreeAttributes, max_key_length: u16) -> Self {
        Self {
            big_keys: attributes.contains(TreeAttributes::BIG_KEYS),
            variable_index_keys: attributes.contains(TreeAttributes::VARIABLE_INDEX_KEYS),
            max_key_length,
        }
    }

    #[must_use]
    pub const fn big_keys(&self) -> bool {
        self.big_keys
    }

    #[must_use]
    pub const fn variable_index_keys(&self) -> bool {
        self.variable_index_keys
    }

    #[must_use]
    pub const fn max_key_length(&self) -> u16 {
        self.max_key_length
    }

    /// Size of the key-length prefix.
    #[must_use]
    pub const fn prefix_size(&self) -> usize {
        if self.big_keys { 2 } else { 1 }
    }

    /// Padded size of a key of `key_len` bytes, prefix included.
    #[must_use]
    pub const fn key_size(&self, key_len: usize) -> usize {
        round_even(self.prefix_size() + key_len)
    }

    /// Bytes a record with this key and payload occupies in a node.
    #[must_use]
    pub const fn size_of(&self, key_len: usize, data_len: usize) -> usize {
        self.key_size(key_len) + round_even(data_len)
    }

    /// Key length as stored in a host-order record.
    #[must_use]
    pub fn key_len(&self, record: &[u8]) -> usize {
        if self.big_keys {
            usize::from(host_u16(record, 0))
        } else {
            usize::from(record[0])
        }
    }

    #[must_use]
    pub fn key<'r>(&self, record: &'r [u8]) -> &'r [u8] {
        let start = self.prefix_size();
        &record[start..start + self.key_len(record)]
    }

    /// Payload of a leaf record, padding included.
    #[must_use]
    pub fn data<'r>(&self, record: &'r [u8]) -> &'r [u8] {
        &record[self.key_size(self.key_len(record))..]
    }

    /// Child pointer of an index record.
    #[must_use]
    pub fn child(&self, record: &[u8]) -> NodeNumber {
        host_u32(record, self.key_size(self.key_len(record)))
    }

    #[must_use]
    pub fn build_leaf_record(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut record = vec![0u8; self.size_of(key.len(), data.len())];
        self.write_key(&mut record, key, key.len());
        let at = self.key_size(key.len());
        record[at..at + data.len()].copy_from_slice(data);
        record
    }

    #[must_use]
    pub fn build_index_record(&self, key: &[u8], child: NodeNumber) -> Vec<u8> {
        let stored_len = if self.variable_index_keys {
            key.len()
        } else {
            usize::from(self.max_key_length).max(key.len())
        };
        let mut record = vec![0u8; self.key_size(stored_len) + CHILD_POINTER_SIZE];
        self.write_key(&mut record, key, stored_len);
        set_host_u32(&mut record, self.key_size(stored_len), child);
        record
    }

    // Key lengths are checked against max_key_length before a record is built.
    #[allow(clippy::cast_possible_truncation)]
    fn write_key(&self, record: &mut [u8], key: &[u8], stored_len: usize) {
        if self.big_keys {
            set_host_u16(record, 0, stored_len as u16);
        } else {
            record[0] = stored_len as u8;
        }
        let start = self.prefix_size();
        record[start..start + key.len()].copy_from_slice(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big() -> RecordLayout {
        RecordLayout::new(
            TreeAttributes::BIG_KEYS | TreeAttributes::VARIABLE_INDEX_KEYS,
            32,
        )
    }

    #[test]
    fn test_max_inline() {
        assert_eq!(max_inline(512), 246);
        assert_eq!(max_inline(4096), 2038);
        // Two maximal records plus three offsets fit exactly.
        assert!(DESCRIPTOR_SIZE + 2 * max_inline(4096) + 3 * OFFSET_SIZE <= 4096);
    }

    #[test]
    fn test_size_of_pads_key_and_data() {
        let layout = big();
        assert_eq!(layout.size_of(3, 5), 6 + 6);
        assert_eq!(layout.size_of(4, 4), 6 + 4);

        let small = RecordLayout::new(TreeAttributes::default(), 10);
        assert_eq!(small.size_of(3, 0), 4);
        assert_eq!(small.size_of(4, 0), 6);
    }

    #[test]
    fn test_leaf_record_accessors() {
        let layout = big();
        let record = layout.build_leaf_record(b"abc", b"data");
        assert_eq!(record.len(), layout.size_of(3, 4));
        assert_eq!(layout.key_len(&record), 3);
        assert_eq!(layout.key(&record), b"abc");
        assert_eq!(layout.data(&record), b"data");
    }

    #[test]
    fn test_index_record_variable_keys() {
        let layout = big();
        let record = layout.build_index_record(b"key", 42);
        assert_eq!(layout.key(&record), b"key");
        assert_eq!(layout.child(&record), 42);
        assert_eq!(record.len(), 6 + CHILD_POINTER_SIZE);
    }

    #[test]
    fn test_index_record_fixed_keys_pad_to_max() {
        let layout = RecordLayout::new(TreeAttributes::default(), 9);
        let record = layout.build_index_record(b"ab", 7);
        assert_eq!(layout.key_len(&record), 9);
        assert_eq!(&layout.key(&record)[..2], b"ab");
        assert!(layout.key(&record)[2..].iter().all(|&b| b == 0));
        assert_eq!(layout.child(&record), 7);
    }
}
