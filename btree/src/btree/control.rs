//! In-memory control block for an open tree.
//!
//! The control block mirrors the header record and adds runtime state: the
//! search hint, a write counter that ages the hint, and statistics. Header
//! fields are only written back to node 0 when `flush` runs and the block
//! is dirty.

use crate::btree::header::{HEADER_RECORD_INDEX, HeaderRecord, TreeAttributes};
use crate::btree::node::{Node, NodeKind};
use crate::btree::record::RecordLayout;
use crate::btree::store::{Access, NodeStore, Writeback};
use crate::btree::tree::BTreeError;
use crate::btree::codec::NodeError;
use crate::storage::io::{BlockProvider, NodeNumber};

/// Cached position of the last record found or inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hint {
    pub node: NodeNumber,
    pub index: u16,
    /// Tree write count when the hint was taken.
    pub write_count: u64,
}

/// Tree parameters needed to decode and encode nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub node_size: usize,
    pub total_nodes: u32,
    pub layout: RecordLayout,
}

/// Search statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Searches that came with a hint worth trying.
    pub hint_checks: u64,
    /// Searches answered from the hinted leaf or one of its siblings.
    pub hint_hits: u64,
    /// Hinted searches that fell back to a full descent.
    pub hint_misses: u64,
    /// Hint hits that needed the sibling leaf.
    pub sibling_hits: u64,
    /// Full root-to-leaf descents.
    pub descents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBlock {
    pub node_size: usize,
    pub total_nodes: u32,
    pub free_nodes: u32,
    pub root_node: NodeNumber,
    pub leaf_records: u32,
    pub first_leaf: NodeNumber,
    pub last_leaf: NodeNumber,
    pub tree_depth: u16,
    pub max_key_length: u16,
    pub attributes: TreeAttributes,
    pub clump_size: u32,
    pub btree_type: u8,
    pub key_compare_type: u8,
    /// In-memory header fields differ from node 0.
    pub header_dirty: bool,
    pub hint: Option<Hint>,
    /// Bumped on every structural change.
    pub write_count: u64,
    pub stats: TreeStats,
}

impl ControlBlock {
    #[must_use]
    pub fn from_header(header: &HeaderRecord) -> Self {
        Self {
            node_size: usize::from(header.node_size),
            total_nodes: header.total_nodes,
            free_nodes: header.free_nodes,
            root_node: header.root_node,
            leaf_records: header.leaf_records,
            first_leaf: header.first_leaf,
            last_leaf: header.last_leaf,
            tree_depth: header.tree_depth,
            max_key_length: header.max_key_length,
            attributes: header.attributes,
            clump_size: header.clump_size,
            btree_type: header.btree_type,
            key_compare_type: header.key_compare_type,
            header_dirty: false,
            hint: None,
            write_count: 0,
            stats: TreeStats::default(),
        }
    }

    /// Copy the tracked fields into `header`, leaving reserved fields alone.
    #[allow(clippy::cast_possible_truncation)]
    pub fn apply_to(&self, header: &mut HeaderRecord) {
        header.tree_depth = self.tree_depth;
        header.root_node = self.root_node;
        header.leaf_records = self.leaf_records;
        header.first_leaf = self.first_leaf;
        header.last_leaf = self.last_leaf;
        // Node sizes are validated to at most 32768.
        header.node_size = self.node_size as u16;
        header.max_key_length = self.max_key_length;
        header.total_nodes = self.total_nodes;
        header.free_nodes = self.free_nodes;
        header.clump_size = self.clump_size;
        header.btree_type = self.btree_type;
        header.key_compare_type = self.key_compare_type;
        header.attributes = self.attributes;
    }

    #[must_use]
    pub const fn layout(&self) -> RecordLayout {
        RecordLayout::new(self.attributes, self.max_key_length)
    }

    #[must_use]
    pub const fn limits(&self) -> Limits {
        Limits {
            node_size: self.node_size,
            total_nodes: self.total_nodes,
            layout: self.layout(),
        }
    }

    /// Record a structural change.
    pub const fn mark_dirty(&mut self) {
        self.header_dirty = true;
        self.write_count += 1;
    }

    /// Rewrite the header record held in `node`, which must be node 0 in
    /// host form.
    pub fn write_header(&self, node: &mut Node) {
        let record = node.record_mut(HEADER_RECORD_INDEX);
        let mut header = HeaderRecord::from_host(record);
        self.apply_to(&mut header);
        header.write_host(record);
    }

    /// Write the header record back to node 0 if anything changed.
    ///
    /// Returns whether a write happened.
    pub fn flush<P: BlockProvider>(&mut self, store: &mut NodeStore<P>) -> Result<bool, BTreeError> {
        if !self.header_dirty {
            return Ok(false);
        }

        let limits = self.limits();
        let mut node = store.acquire(0, limits, Access::Read)?;
        check_header_node(&node)?;
        store.modify(&node)?;
        self.write_header(&mut node);
        store.release(node, limits, Writeback::Immediate)?;

        self.header_dirty = false;
        tracing::debug!(
            total_nodes = self.total_nodes,
            free_nodes = self.free_nodes,
            root = self.root_node,
            depth = self.tree_depth,
            "flushed header record"
        );
        Ok(true)
    }
}

/// Fail unless `node` is the header node.
pub fn check_header_node(node: &Node) -> Result<(), BTreeError> {
    if node.kind() != NodeKind::Header {
        return Err(BTreeError::Corruption(NodeError::UnexpectedKind {
            node: 0,
            expected: NodeKind::Header,
            found: node.kind(),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip_through_control_block() {
        let header = HeaderRecord {
            tree_depth: 3,
            root_node: 7,
            leaf_records: 42,
            first_leaf: 2,
            last_leaf: 9,
            node_size: 1024,
            max_key_length: 20,
            total_nodes: 32,
            free_nodes: 10,
            reserved1: 0xBEEF,
            reserved3: [5; 16],
            ..HeaderRecord::default()
        };
        let control = ControlBlock::from_header(&header);
        let mut written = HeaderRecord {
            reserved1: 0xBEEF,
            reserved3: [5; 16],
            ..HeaderRecord::default()
        };
        control.apply_to(&mut written);
        assert_eq!(written, header);
    }

    #[test]
    fn test_mark_dirty_bumps_write_count() {
        let mut control = ControlBlock::from_header(&HeaderRecord::default());
        assert!(!control.header_dirty);
        control.mark_dirty();
        control.mark_dirty();
        assert!(control.header_dirty);
        assert_eq!(control.write_count, 2);
    }
}
