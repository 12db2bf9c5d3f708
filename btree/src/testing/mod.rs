//! Helpers shared by the unit tests.

use std::cmp::Ordering;

use crate::btree::endian::Direction;
use crate::btree::header::TreeAttributes;
use crate::btree::node::NodeKind;
use crate::btree::schema::{BytewiseKeys, KeySchema};
use crate::btree::tree::{BTree, FormatOptions, OpenOptions};
use crate::storage::memory::MemoryProvider;

/// Big-endian key, so bytewise order matches numeric order.
pub fn u32_key(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

/// Payload derived from `n`, recognizable when read back.
pub fn value_for(n: u32) -> [u8; 8] {
    let mut value = [0u8; 8];
    value[..4].copy_from_slice(&n.to_le_bytes());
    value[4..].copy_from_slice(&(!n).to_le_bytes());
    value
}

/// Keys holding a native-endian `u32`, stored big-endian.
///
/// Exercises the record swap hook: in host form the key bytes differ from
/// the stored bytes on little-endian machines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeU32Keys;

impl NativeU32Keys {
    fn value(key: &[u8]) -> Option<u32> {
        key.try_into().ok().map(u32::from_ne_bytes)
    }
}

impl KeySchema for NativeU32Keys {
    fn compare(&self, search_key: &[u8], candidate_key: &[u8]) -> Ordering {
        match (Self::value(search_key), Self::value(candidate_key)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => search_key.cmp(candidate_key),
        }
    }

    fn swap_record(
        &self,
        _kind: NodeKind,
        key: &mut [u8],
        _data: &mut [u8],
        direction: Direction,
    ) -> Result<(), String> {
        let bytes: [u8; 4] = (&*key)
            .try_into()
            .map_err(|_| format!("expected a 4-byte key, got {} bytes", key.len()))?;
        let swapped = match direction {
            Direction::ToHost => u32::from_be_bytes(bytes).to_ne_bytes(),
            Direction::ToDisk => u32::from_ne_bytes(bytes).to_be_bytes(),
        };
        key.copy_from_slice(&swapped);
        Ok(())
    }
}

/// Freshly formatted in-memory tree with bytewise keys of up to 64 bytes.
pub fn format_tree(node_size: usize, total_nodes: u32) -> BTree<MemoryProvider> {
    let options = FormatOptions {
        node_size,
        max_key_length: 64,
        attributes: TreeAttributes::BIG_KEYS | TreeAttributes::VARIABLE_INDEX_KEYS,
        total_nodes,
        clump_size: 0,
        btree_type: 0,
        key_compare_type: 0,
    };
    BTree::format(
        MemoryProvider::new(42),
        Box::new(BytewiseKeys),
        options,
        OpenOptions::default(),
    )
    .expect("format test tree")
}

/// Close `tree` and open its storage again.
pub fn reopen(tree: BTree<MemoryProvider>) -> BTree<MemoryProvider> {
    let provider = tree.close().expect("close test tree");
    BTree::open(provider, Box::new(BytewiseKeys), OpenOptions::default()).expect("reopen test tree")
}
