//! Ordered iteration over leaf records.
//!
//! A cursor sits between two records. `next_record` returns the record after
//! the gap and moves past it, `prev_record` the one before. Leaves are
//! followed through their sibling links, so a cursor never touches the index
//! levels.

use crate::btree::store::Access;
use crate::btree::tree::{BTree, BTreeError};
use crate::storage::io::{BlockProvider, NodeNumber};

pub struct Cursor<'a, P: BlockProvider> {
    tree: &'a mut BTree<P>,
    node: NodeNumber,
    /// Index of the record after the gap.
    index: usize,
}

impl<'a, P: BlockProvider> Cursor<'a, P> {
    pub(super) const fn new(tree: &'a mut BTree<P>, node: NodeNumber, index: usize) -> Self {
        Self { tree, node, index }
    }

    /// Key and payload of the next record, or `None` at the end.
    pub fn next_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, BTreeError> {
        let limits = self.tree.control.limits();
        while self.node != 0 {
            let node = self.tree.store.acquire(self.node, limits, Access::Read)?;
            if self.index < usize::from(node.num_records()) {
                let record = node.record(self.index);
                self.index += 1;
                return Ok(Some((
                    limits.layout.key(record).to_vec(),
                    limits.layout.data(record).to_vec(),
                )));
            }
            let next = node.forward_link();
            if next == 0 {
                return Ok(None);
            }
            self.node = next;
            self.index = 0;
        }
        Ok(None)
    }

    /// Key and payload of the previous record, or `None` at the start.
    pub fn prev_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, BTreeError> {
        let limits = self.tree.control.limits();
        while self.node != 0 {
            if self.index > 0 {
                let node = self.tree.store.acquire(self.node, limits, Access::Read)?;
                self.index = self.index.min(usize::from(node.num_records()));
                if self.index > 0 {
                    self.index -= 1;
                    let record = node.record(self.index);
                    return Ok(Some((
                        limits.layout.key(record).to_vec(),
                        limits.layout.data(record).to_vec(),
                    )));
                }
            }
            let node = self.tree.store.acquire(self.node, limits, Access::Read)?;
            let previous = node.backward_link();
            if previous == 0 {
                return Ok(None);
            }
            let previous_node = self.tree.store.acquire(previous, limits, Access::Read)?;
            self.node = previous;
            self.index = usize::from(previous_node.num_records());
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{format_tree, u32_key, value_for};

    #[test]
    fn test_forward_iteration_visits_all_in_order() {
        let mut tree = format_tree(512, 64);
        for i in (0..200u32).rev() {
            tree.insert(&u32_key(i * 3), &value_for(i)).unwrap();
        }

        let mut cursor = tree.cursor_first();
        let mut seen = Vec::new();
        while let Some((key, data)) = cursor.next_record().unwrap() {
            let i = u32::from_be_bytes([key[0], key[1], key[2], key[3]]);
            assert_eq!(data, value_for(i / 3).to_vec());
            seen.push(i);
        }
        let expected: Vec<u32> = (0..200).map(|i| i * 3).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_cursor_from_missing_key_starts_at_successor() {
        let mut tree = format_tree(512, 64);
        for i in 0..200u32 {
            tree.insert(&u32_key(i * 2), &value_for(i)).unwrap();
        }

        let mut cursor = tree.cursor_from(&u32_key(101)).unwrap();
        let (key, _) = cursor.next_record().unwrap().unwrap();
        assert_eq!(key, u32_key(102).to_vec());
        let (key, _) = cursor.prev_record().unwrap().unwrap();
        assert_eq!(key, u32_key(102).to_vec());
        let (key, _) = cursor.prev_record().unwrap().unwrap();
        assert_eq!(key, u32_key(100).to_vec());
    }

    #[test]
    fn test_backward_iteration_from_end() {
        let mut tree = format_tree(512, 64);
        for i in 0..150u32 {
            tree.insert(&u32_key(i), &value_for(i)).unwrap();
        }

        let mut cursor = tree.cursor_last().unwrap();
        let mut count = 0u32;
        while let Some((key, _)) = cursor.prev_record().unwrap() {
            count += 1;
            assert_eq!(key, u32_key(150 - count).to_vec());
        }
        assert_eq!(count, 150);
    }

    #[test]
    fn test_cursor_on_empty_tree() {
        let mut tree = format_tree(512, 8);
        assert!(tree.cursor_first().next_record().unwrap().is_none());
        assert!(tree.cursor_last().unwrap().prev_record().unwrap().is_none());
    }
}
