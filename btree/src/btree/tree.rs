//! B-tree facade.
//!
//! `BTree` ties the node store, control block and allocation map together
//! and exposes the record operations. All mutations follow the same
//! discipline: acquire the node, announce the modification, change it,
//! release it for writing. Header fields change only in the control block
//! and reach node 0 on `flush_header_if_dirty`, or immediately when the
//! tree grows.

use crate::btree::allocator::{AllocationMap, header_map_bits};
use crate::btree::codec::{self, NodeError};
use crate::btree::control::{ControlBlock, Hint, TreeStats};
use crate::btree::cursor::Cursor;
use crate::btree::header::{
    HEADER_RECORD_INDEX, HeaderError, HeaderRecord, TreeAttributes,
    USER_DATA_INDEX, USER_DATA_SIZE, check_key_length, header_map_size,
};
use crate::btree::node::{MIN_NODE_SIZE, Node, NodeKind, OFFSET_SIZE, is_valid_node_size};
use crate::btree::record::max_inline;
use crate::btree::schema::KeySchema;
use crate::btree::search::{self, SearchResult, TreePath};
use crate::btree::store::{Access, NodeStore, StoreStats, Writeback};
use crate::storage::io::{BlockProvider, NodeNumber, StorageError};
use crate::storage::journal::Journal;

/// Parameters for a new tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub node_size: usize,
    pub max_key_length: u16,
    pub attributes: TreeAttributes,
    /// Initial size in nodes, header included.
    pub total_nodes: u32,
    pub clump_size: u32,
    pub btree_type: u8,
    pub key_compare_type: u8,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            node_size: 4096,
            max_key_length: 516,
            attributes: TreeAttributes::BIG_KEYS | TreeAttributes::VARIABLE_INDEX_KEYS,
            total_nodes: 2,
            clump_size: 4096 * 16,
            btree_type: 0,
            key_compare_type: 0,
        }
    }
}

/// Runtime attachments for an open tree.
#[derive(Default)]
pub struct OpenOptions {
    pub journal: Option<Box<dyn Journal>>,
}

impl OpenOptions {
    #[must_use]
    pub fn with_journal(mut self, journal: Box<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }
}

/// Summary of an open tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeInfo {
    pub node_size: usize,
    pub max_key_length: u16,
    pub attributes: TreeAttributes,
    pub total_nodes: u32,
    pub free_nodes: u32,
    pub root_node: NodeNumber,
    pub tree_depth: u16,
    pub leaf_records: u32,
    pub first_leaf: NodeNumber,
    pub last_leaf: NodeNumber,
    pub map_nodes: usize,
    pub stats: TreeStats,
    pub store: StoreStats,
}

pub struct BTree<P: BlockProvider> {
    pub(super) store: NodeStore<P>,
    pub(super) control: ControlBlock,
    pub(super) map: AllocationMap,
}

impl<P: BlockProvider> BTree<P> {
    /// Lay out an empty tree on `provider`.
    pub fn format(
        mut provider: P,
        schema: Box<dyn KeySchema>,
        options: FormatOptions,
        open: OpenOptions,
    ) -> Result<Self, BTreeError> {
        let node_size = options.node_size;
        if !is_valid_node_size(node_size) {
            return Err(BTreeError::InvalidHeader(HeaderError::NodeSize(node_size)));
        }
        let header = HeaderRecord {
            node_size: u16::try_from(node_size).map_err(|_| HeaderError::NodeSize(node_size))?,
            max_key_length: options.max_key_length,
            clump_size: options.clump_size,
            btree_type: options.btree_type,
            key_compare_type: options.key_compare_type,
            attributes: options.attributes,
            ..HeaderRecord::default()
        };
        check_key_length(header.layout(), node_size)?;

        let requested = options.total_nodes.max(1);
        // Start with what the header's own map can track; grow from there.
        #[allow(clippy::cast_possible_truncation)]
        let initial = u64::from(requested).min(header_map_bits(node_size)) as u32;
        let bytes = u64::from(initial) * node_size as u64;
        let granted = provider.extend_underlying_file(bytes)?;
        if granted < bytes {
            return Err(BTreeError::ExtendTooSmall {
                requested: bytes,
                granted,
            });
        }

        let header = HeaderRecord {
            total_nodes: initial,
            free_nodes: initial - 1,
            ..header
        };
        let control = ControlBlock::from_header(&header);
        let mut store = NodeStore::new(provider, schema, open.journal);
        let limits = control.limits();

        let mut node = store.acquire_fresh(0, limits, NodeKind::Header, 0)?;
        let mut map = vec![0u8; header_map_size(node_size)];
        map[0] = 0x80;
        let records = [header.to_host_bytes(), vec![0u8; USER_DATA_SIZE], map];
        for (index, record) in records.iter().enumerate() {
            if !node.insert_record(index, record) {
                return Err(BTreeError::NodeFull(0));
            }
        }
        store.release(node, limits, Writeback::Immediate)?;

        let map = AllocationMap::load(&mut store, &control)?;
        let mut tree = Self {
            store,
            control,
            map,
        };
        if requested > initial {
            tree.extend_by(u64::from(requested - initial) * node_size as u64)?;
        }

        tracing::info!(
            node_size,
            total_nodes = tree.control.total_nodes,
            max_key_length = options.max_key_length,
            "formatted tree"
        );
        Ok(tree)
    }

    /// Open an existing tree.
    ///
    /// Node 0 is read twice: first the smallest legal node, to learn the
    /// real node size from the header record, then the full node.
    pub fn open(provider: P, schema: Box<dyn KeySchema>, options: OpenOptions) -> Result<Self, BTreeError> {
        let mut store = NodeStore::new(provider, schema, options.journal);
        let storage_bytes = store.provider().size_bytes();

        let block = store.read_raw(0, MIN_NODE_SIZE)?;
        let header = codec::decode_header_only(block.data())?;
        drop(block);
        header.verify(storage_bytes)?;

        let mut control = ControlBlock::from_header(&header);
        let node = store.acquire(0, control.limits(), Access::Read)?;
        let header = HeaderRecord::from_host(node.record(HEADER_RECORD_INDEX));
        drop(node);
        control = ControlBlock::from_header(&header);

        let map = AllocationMap::load(&mut store, &control)?;
        tracing::info!(
            node_size = control.node_size,
            total_nodes = control.total_nodes,
            free_nodes = control.free_nodes,
            depth = control.tree_depth,
            leaf_records = control.leaf_records,
            "opened tree"
        );
        Ok(Self {
            store,
            control,
            map,
        })
    }

    #[must_use]
    pub const fn provider(&self) -> &P {
        self.store.provider()
    }

    pub const fn provider_mut(&mut self) -> &mut P {
        self.store.provider_mut()
    }

    /// Flush the header and give the provider back.
    pub fn close(mut self) -> Result<P, BTreeError> {
        self.flush_header_if_dirty()?;
        self.store.provider_mut().sync()?;
        Ok(self.store.into_provider())
    }

    /// Give the provider back without flushing.
    pub fn into_provider(self) -> P {
        self.store.into_provider()
    }

    pub fn journal_mut(&mut self) -> Option<&mut (dyn Journal + 'static)> {
        self.store.journal_mut()
    }

    #[must_use]
    pub fn info(&self) -> TreeInfo {
        let control = &self.control;
        TreeInfo {
            node_size: control.node_size,
            max_key_length: control.max_key_length,
            attributes: control.attributes,
            total_nodes: control.total_nodes,
            free_nodes: control.free_nodes,
            root_node: control.root_node,
            tree_depth: control.tree_depth,
            leaf_records: control.leaf_records,
            first_leaf: control.first_leaf,
            last_leaf: control.last_leaf,
            map_nodes: self.map.segments().len() - 1,
            stats: control.stats,
            store: self.store.stats(),
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<Hint> {
        self.control.hint
    }

    /// Whether `hint` is worth trying against this tree.
    #[must_use]
    pub const fn is_hint_valid(&self, hint: &Hint) -> bool {
        search::is_hint_valid(&self.control, hint)
    }

    /// Write the header record back if anything changed.
    pub fn flush_header_if_dirty(&mut self) -> Result<bool, BTreeError> {
        self.control.flush(&mut self.store)
    }

    /// Raw contents of the user-data record in the header node.
    pub fn user_data(&mut self) -> Result<Vec<u8>, BTreeError> {
        let node = self.store.acquire(0, self.control.limits(), Access::Read)?;
        Ok(node.record(USER_DATA_INDEX).to_vec())
    }

    pub fn allocate_node(&mut self) -> Result<NodeNumber, BTreeError> {
        self.map.allocate(&mut self.store, &mut self.control)
    }

    pub fn free_node(&mut self, number: NodeNumber) -> Result<(), BTreeError> {
        self.map.free(&mut self.store, &mut self.control, number)
    }

    /// Grow the tree by about `requested_bytes`. Returns the nodes added.
    pub fn extend_by(&mut self, requested_bytes: u64) -> Result<u32, BTreeError> {
        self.map
            .extend_by(&mut self.store, &mut self.control, requested_bytes)
    }

    /// Zero every free node not pinned by a transaction.
    pub fn zero_unused_nodes(&mut self) -> Result<u32, BTreeError> {
        self.map.zero_unused_nodes(&mut self.store, &self.control)
    }

    /// Find `key`, trying the cached hint first.
    pub fn search(&mut self, key: &[u8]) -> Result<SearchResult, BTreeError> {
        let hint = self.control.hint;
        self.search_with_hint(key, hint)
    }

    /// Find `key`, trying `hint` first.
    pub fn search_with_hint(&mut self, key: &[u8], hint: Option<Hint>) -> Result<SearchResult, BTreeError> {
        let result = search::locate(&mut self.store, &mut self.control, key, hint)?;
        self.remember(result.node, result.index);
        Ok(result)
    }

    /// Payload stored under `key`.
    ///
    /// Payloads are stored padded to an even length, so an odd-length
    /// payload comes back with a trailing zero byte.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, BTreeError> {
        let result = self.search(key)?;
        if !result.found {
            return Ok(None);
        }
        let limits = self.control.limits();
        let node = self.store.acquire(result.node, limits, Access::Read)?;
        Ok(Some(limits.layout.data(node.record(usize::from(result.index))).to_vec()))
    }

    fn remember(&mut self, node: NodeNumber, index: u16) {
        self.control.hint = if node == 0 {
            None
        } else {
            Some(Hint {
                node,
                index,
                write_count: self.control.write_count,
            })
        };
    }

    fn check_key(&self, key: &[u8]) -> Result<(), BTreeError> {
        if key.is_empty() {
            return Err(BTreeError::EmptyKey);
        }
        if key.len() > usize::from(self.control.max_key_length) {
            return Err(BTreeError::KeyTooLong {
                len: key.len(),
                max: self.control.max_key_length,
            });
        }
        Ok(())
    }

    fn leaf_record(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, BTreeError> {
        self.check_key(key)?;
        let record = self.control.layout().build_leaf_record(key, data);
        let max = max_inline(self.control.node_size);
        if record.len() > max {
            return Err(BTreeError::RecordTooLarge {
                size: record.len(),
                max,
            });
        }
        Ok(record)
    }

    /// Insert a new record. Fails with `DuplicateKey` if `key` exists.
    pub fn insert(&mut self, key: &[u8], data: &[u8]) -> Result<(), BTreeError> {
        let record = self.leaf_record(key, data)?;
        let result = search::descend(&mut self.store, &mut self.control, key)?;
        if result.found {
            return Err(BTreeError::DuplicateKey);
        }
        // A split at every level plus a new root must not run dry halfway.
        if self.control.free_nodes < u32::from(self.control.tree_depth) + 1 {
            tracing::debug!(
                free_nodes = self.control.free_nodes,
                depth = self.control.tree_depth,
                "not enough free nodes to insert"
            );
            return Err(BTreeError::TreeFull);
        }

        let (node, index) = if self.control.root_node == 0 {
            self.create_root_leaf(&record)?
        } else {
            self.insert_at(result.path, record)?
        };

        self.control.leaf_records += 1;
        self.control.mark_dirty();
        self.remember(node, index);
        tracing::trace!(node, index, "inserted record");
        Ok(())
    }

    fn create_root_leaf(&mut self, record: &[u8]) -> Result<(NodeNumber, u16), BTreeError> {
        let number = self.allocate_node()?;
        let limits = self.control.limits();
        let mut leaf = self.store.acquire_fresh(number, limits, NodeKind::Leaf, 1)?;
        if !leaf.insert_record(0, record) {
            return Err(BTreeError::NodeFull(number));
        }
        self.store.release(leaf, limits, Writeback::Deferred)?;

        self.control.root_node = number;
        self.control.first_leaf = number;
        self.control.last_leaf = number;
        self.control.tree_depth = 1;
        tracing::debug!(root = number, "created root leaf");
        Ok((number, 0))
    }

    /// Insert `record` at the leaf position at the end of `path`, splitting
    /// upward as far as needed. Returns where the leaf record landed.
    fn insert_at(&mut self, mut path: TreePath, record: Vec<u8>) -> Result<(NodeNumber, u16), BTreeError> {
        let layout = self.control.layout();
        let mut pending = Some((path.pop().ok_or(NodeError::MissingPath)?, record));
        let mut placed = None;

        while let Some((entry, record)) = pending.take() {
            let limits = self.control.limits();
            let mut node = self.store.acquire(entry.node, limits, Access::Read)?;
            self.store.modify(&node)?;
            let index = usize::from(entry.index);

            if node.insert_record(index, &record) {
                placed.get_or_insert((entry.node, entry.index));
                self.store.release(node, limits, Writeback::Deferred)?;
                break;
            }

            let height = node.height();
            let (left, right, position) = self.split_node(node, index, &record)?;
            placed.get_or_insert(position);
            let left_number = left.number();
            let right_number = right.number();
            let left_key = layout.key(left.record(0)).to_vec();
            let right_key = layout.key(right.record(0)).to_vec();
            self.store.release(left, limits, Writeback::Deferred)?;
            self.store.release(right, limits, Writeback::Deferred)?;

            match path.pop() {
                Some(parent) => {
                    pending = Some((
                        search::PathEntry {
                            node: parent.node,
                            index: parent.index + 1,
                        },
                        layout.build_index_record(&right_key, right_number),
                    ));
                }
                None => {
                    self.grow_root(height + 1, (&left_key, left_number), (&right_key, right_number))?;
                }
            }
        }

        placed.ok_or(BTreeError::Corruption(NodeError::MissingPath))
    }

    /// Split `left` in two around the insertion of `record` at `index`.
    ///
    /// Returns both halves, not yet released, and the position the new
    /// record ended up at.
    fn split_node(
        &mut self,
        mut left: Node,
        index: usize,
        record: &[u8],
    ) -> Result<(Node, Node, (NodeNumber, u16)), BTreeError> {
        let left_number = left.number();
        let right_number = self.allocate_node()?;
        let limits = self.control.limits();
        let mut right = self
            .store
            .acquire_fresh(right_number, limits, left.kind(), left.height())?;

        let mut records: Vec<Vec<u8>> = (0..usize::from(left.num_records()))
            .map(|i| left.record(i).to_vec())
            .collect();
        records.insert(index, record.to_vec());
        let split = split_point(&records);

        left.clear_records();
        for (i, record) in records[..split].iter().enumerate() {
            if !left.insert_record(i, record) {
                return Err(BTreeError::NodeFull(left_number));
            }
        }
        for (i, record) in records[split..].iter().enumerate() {
            if !right.insert_record(i, record) {
                return Err(BTreeError::NodeFull(right_number));
            }
        }

        let next = left.forward_link();
        right.set_forward_link(next);
        right.set_backward_link(left_number);
        left.set_forward_link(right_number);
        if next == 0 {
            if left.kind() == NodeKind::Leaf {
                self.control.last_leaf = right_number;
            }
        } else {
            let mut neighbor = self.store.acquire(next, limits, Access::Read)?;
            self.store.modify(&neighbor)?;
            neighbor.set_backward_link(right_number);
            self.store.release(neighbor, limits, Writeback::Deferred)?;
        }

        tracing::debug!(node = left_number, new_node = right_number, split, "split node");
        #[allow(clippy::cast_possible_truncation)]
        let position = if index < split {
            (left_number, index as u16)
        } else {
            (right_number, (index - split) as u16)
        };
        Ok((left, right, position))
    }

    fn grow_root(
        &mut self,
        height: u8,
        (left_key, left): (&[u8], NodeNumber),
        (right_key, right): (&[u8], NodeNumber),
    ) -> Result<(), BTreeError> {
        let number = self.allocate_node()?;
        let limits = self.control.limits();
        let layout = limits.layout;
        let mut root = self.store.acquire_fresh(number, limits, NodeKind::Index, height)?;
        let records = [
            layout.build_index_record(left_key, left),
            layout.build_index_record(right_key, right),
        ];
        for (i, record) in records.iter().enumerate() {
            if !root.insert_record(i, record) {
                return Err(BTreeError::NodeFull(number));
            }
        }
        self.store.release(root, limits, Writeback::Deferred)?;

        self.control.root_node = number;
        self.control.tree_depth += 1;
        tracing::debug!(root = number, depth = self.control.tree_depth, "grew new root");
        Ok(())
    }

    /// Remove the record stored under `key`.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), BTreeError> {
        let result = search::descend(&mut self.store, &mut self.control, key)?;
        if !result.found {
            return Err(BTreeError::RecordNotFound);
        }

        let limits = self.control.limits();
        let mut path = result.path;
        let entry = path.pop().ok_or(NodeError::MissingPath)?;
        let mut leaf = self.store.acquire(entry.node, limits, Access::Read)?;
        self.store.modify(&leaf)?;
        leaf.remove_record(usize::from(entry.index));

        self.control.leaf_records = self.control.leaf_records.saturating_sub(1);
        self.control.mark_dirty();

        if leaf.num_records() > 0 {
            let remaining = leaf.num_records();
            self.store.release(leaf, limits, Writeback::Deferred)?;
            self.remember(entry.node, entry.index.min(remaining - 1));
        } else {
            self.remove_empty(leaf, path)?;
        }
        tracing::trace!(node = entry.node, index = entry.index, "deleted record");
        Ok(())
    }

    /// Unlink, zero and free an emptied node, then drop its entry from the
    /// parent, cascading up while parents empty out.
    fn remove_empty(&mut self, node: Node, mut path: TreePath) -> Result<(), BTreeError> {
        let mut node = node;
        loop {
            let number = node.number();
            let kind = node.kind();
            let (previous, next) = (node.backward_link(), node.forward_link());
            drop(node);

            self.unlink(previous, next)?;
            if kind == NodeKind::Leaf {
                if self.control.first_leaf == number {
                    self.control.first_leaf = next;
                }
                if self.control.last_leaf == number {
                    self.control.last_leaf = previous;
                }
            }
            self.discard_node(number)?;

            let Some(parent) = path.pop() else {
                self.control.root_node = 0;
                self.control.tree_depth = 0;
                self.control.first_leaf = 0;
                self.control.last_leaf = 0;
                tracing::debug!("tree is empty");
                return Ok(());
            };

            let limits = self.control.limits();
            let mut parent_node = self.store.acquire(parent.node, limits, Access::Read)?;
            self.store.modify(&parent_node)?;
            parent_node.remove_record(usize::from(parent.index));
            if parent_node.num_records() == 0 {
                node = parent_node;
                continue;
            }
            self.store.release(parent_node, limits, Writeback::Deferred)?;
            if path.is_empty() {
                self.collapse_root()?;
            }
            return Ok(());
        }
    }

    fn unlink(&mut self, previous: NodeNumber, next: NodeNumber) -> Result<(), BTreeError> {
        let limits = self.control.limits();
        if previous != 0 {
            let mut node = self.store.acquire(previous, limits, Access::Read)?;
            self.store.modify(&node)?;
            node.set_forward_link(next);
            self.store.release(node, limits, Writeback::Deferred)?;
        }
        if next != 0 {
            let mut node = self.store.acquire(next, limits, Access::Read)?;
            self.store.modify(&node)?;
            node.set_backward_link(previous);
            self.store.release(node, limits, Writeback::Deferred)?;
        }
        Ok(())
    }

    /// While the root is an index node with a single child, make the child
    /// the root.
    fn collapse_root(&mut self) -> Result<(), BTreeError> {
        loop {
            let limits = self.control.limits();
            let root = self.store.acquire(self.control.root_node, limits, Access::Read)?;
            if root.kind() != NodeKind::Index || root.num_records() != 1 {
                return Ok(());
            }
            let child = limits.layout.child(root.record(0));
            let old_root = root.number();
            drop(root);

            self.discard_node(old_root)?;
            self.control.root_node = child;
            self.control.tree_depth = self.control.tree_depth.saturating_sub(1);
            tracing::debug!(root = child, depth = self.control.tree_depth, "collapsed root");
        }
    }

    fn discard_node(&mut self, number: NodeNumber) -> Result<(), BTreeError> {
        self.store.write_zeroed(number, self.control.node_size)?;
        self.free_node(number)?;
        if self.control.hint.is_some_and(|hint| hint.node == number) {
            self.control.hint = None;
        }
        Ok(())
    }

    /// Replace the payload stored under `key`.
    pub fn replace(&mut self, key: &[u8], data: &[u8]) -> Result<(), BTreeError> {
        let record = self.leaf_record(key, data)?;
        let result = search::descend(&mut self.store, &mut self.control, key)?;
        if !result.found {
            return Err(BTreeError::RecordNotFound);
        }

        let limits = self.control.limits();
        let mut node = self.store.acquire(result.node, limits, Access::Read)?;
        let index = usize::from(result.index);
        if record.len() > node.record(index).len() + node.free_space() {
            // Deleting never costs nodes, so this is the headroom the re-insert needs.
            if self.control.free_nodes < u32::from(self.control.tree_depth) + 1 {
                return Err(BTreeError::TreeFull);
            }
            let old = limits.layout.data(node.record(index)).to_vec();
            drop(node);
            self.delete(key)?;
            if let Err(e) = self.insert(key, data) {
                tracing::warn!(error = %e, "replace failed to move record, restoring old payload");
                self.insert(key, &old)?;
                return Err(e);
            }
            return Ok(());
        }

        self.store.modify(&node)?;
        node.remove_record(index);
        if !node.insert_record(index, &record) {
            return Err(BTreeError::NodeFull(result.node));
        }
        self.store.release(node, limits, Writeback::Deferred)?;
        self.control.mark_dirty();
        self.remember(result.node, result.index);
        Ok(())
    }

    /// Cursor positioned at `key`, or where it would be.
    pub fn cursor_from(&mut self, key: &[u8]) -> Result<Cursor<'_, P>, BTreeError> {
        let result = self.search(key)?;
        Ok(Cursor::new(self, result.node, usize::from(result.index)))
    }

    /// Cursor before the first record.
    pub fn cursor_first(&mut self) -> Cursor<'_, P> {
        let first = self.control.first_leaf;
        Cursor::new(self, first, 0)
    }

    /// Cursor after the last record.
    pub fn cursor_last(&mut self) -> Result<Cursor<'_, P>, BTreeError> {
        let last = self.control.last_leaf;
        let end = if last == 0 {
            0
        } else {
            let node = self.store.acquire(last, self.control.limits(), Access::Read)?;
            usize::from(node.num_records())
        };
        Ok(Cursor::new(self, last, end))
    }
}

/// Record count for the left half that keeps the fuller half smallest.
/// Both halves get at least one record.
fn split_point(records: &[Vec<u8>]) -> usize {
    let cost = |record: &Vec<u8>| record.len() + OFFSET_SIZE;
    let total: usize = records.iter().map(cost).sum();
    let mut best = (usize::MAX, 1);
    let mut prefix = 0;
    for (i, record) in records.iter().enumerate().take(records.len() - 1) {
        prefix += cost(record);
        let fuller = prefix.max(total - prefix);
        if fuller < best.0 {
            best = (fuller, i + 1);
        }
    }
    best.1
}

/// Errors returned by tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// The block provider failed.
    Storage(StorageError),
    /// A node failed validation.
    Corruption(NodeError),
    /// The header record is not usable.
    InvalidHeader(HeaderError),
    /// No free node below the tree's total.
    TreeFull,
    RecordNotFound,
    DuplicateKey,
    EmptyKey,
    /// Key longer than the tree maximum.
    KeyTooLong { len: usize, max: u16 },
    /// Record would exceed the inline limit for this node size.
    RecordTooLarge { size: usize, max: usize },
    /// Freeing a node whose bit is already clear.
    NodeAlreadyFree(NodeNumber),
    /// Node number outside the tree, or the header node.
    InvalidNodeNumber { node: NodeNumber, total_nodes: u32 },
    /// The provider could not grant even one more node.
    ExtendTooSmall { requested: u64, granted: u64 },
    /// A record that was sized to fit did not.
    NodeFull(NodeNumber),
}

impl BTreeError {
    /// Whether the error means on-disk structures are damaged.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_) | Self::InvalidHeader(_))
    }
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Corruption(e) => write!(f, "corruption detected: {e}"),
            Self::InvalidHeader(e) => write!(f, "invalid header: {e}"),
            Self::TreeFull => write!(f, "tree is full"),
            Self::RecordNotFound => write!(f, "record not found"),
            Self::DuplicateKey => write!(f, "duplicate key"),
            Self::EmptyKey => write!(f, "empty key"),
            Self::KeyTooLong { len, max } => write!(f, "key of {len} bytes exceeds {max}"),
            Self::RecordTooLarge { size, max } => {
                write!(f, "record of {size} bytes exceeds {max}")
            }
            Self::NodeAlreadyFree(node) => write!(f, "node {node} is already free"),
            Self::InvalidNodeNumber { node, total_nodes } => {
                write!(f, "invalid node {node} (total nodes: {total_nodes})")
            }
            Self::ExtendTooSmall { requested, granted } => write!(
                f,
                "requested {requested} more bytes but only {granted} were granted"
            ),
            Self::NodeFull(node) => write!(f, "node {node} has no room for the record"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Corruption(e) => Some(e),
            Self::InvalidHeader(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for BTreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NodeError> for BTreeError {
    fn from(e: NodeError) -> Self {
        Self::Corruption(e)
    }
}

impl From<HeaderError> for BTreeError {
    fn from(e: HeaderError) -> Self {
        Self::InvalidHeader(e)
    }
}
