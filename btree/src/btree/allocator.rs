//! Node allocation map.
//!
//! One bit per node, 1 = in use, most significant bit first within each
//! byte. The map is split into segments: the header node's map record
//! covers the first `(node_size - 256) * 8` nodes, and each map node
//! chained from the header's forward link adds `(node_size - 20) * 8` more.
//! The chain is walked once at open and cached here; the bits themselves
//! always live in the nodes and are read through the node store.
//!
//! Free-slot search runs over 16-bit big-endian words, so the first clear
//! bit found is the lowest-numbered free node.

// Bit positions are bounded by total_nodes, a u32, so narrowing them back to
// node numbers and slice indices cannot truncate.
#![allow(clippy::cast_possible_truncation)]

use std::ops::Range;

use crate::btree::codec::NodeError;
use crate::btree::control::{ControlBlock, Limits, check_header_node};
use crate::btree::header::{HEADER_MAP_INDEX, header_map_size};
use crate::btree::node::NodeKind;
use crate::btree::store::{Access, NodeStore, Writeback};
use crate::btree::tree::BTreeError;
use crate::storage::io::{BlockProvider, NodeNumber};

const BITS_PER_BYTE: u64 = 8;

/// Size of the single record in a map node.
#[must_use]
pub const fn map_record_size(node_size: usize) -> usize {
    node_size - 20
}

/// Nodes tracked by the header's map record.
#[must_use]
pub const fn header_map_bits(node_size: usize) -> u64 {
    header_map_size(node_size) as u64 * BITS_PER_BYTE
}

/// Nodes tracked by one map node.
#[must_use]
pub const fn map_node_bits(node_size: usize) -> u64 {
    map_record_size(node_size) as u64 * BITS_PER_BYTE
}

/// Map capacity, in bits, needed to track `total_nodes`: the header's
/// segment plus as many whole map nodes as it takes.
#[must_use]
pub const fn calc_map_bits(node_size: usize, total_nodes: u32) -> u64 {
    let mut bits = header_map_bits(node_size);
    while bits < total_nodes as u64 {
        bits += map_node_bits(node_size);
    }
    bits
}

/// Index of the first clear bit, scanning 16-bit words.
fn first_clear_bit(bytes: &[u8]) -> Option<usize> {
    let mut words = bytes.chunks_exact(2);
    for (i, word) in words.by_ref().enumerate() {
        let word = u16::from_be_bytes([word[0], word[1]]);
        if word != u16::MAX {
            return Some(i * 16 + (!word).leading_zeros() as usize);
        }
    }
    match words.remainder() {
        [last] if *last != u8::MAX => {
            Some((bytes.len() - 1) * 8 + (!*last).leading_zeros() as usize)
        }
        _ => None,
    }
}

fn bit_is_set(bytes: &[u8], bit: usize) -> bool {
    bytes[bit / 8] & (0x80 >> (bit % 8)) != 0
}

fn set_bit(bytes: &mut [u8], bit: usize) {
    bytes[bit / 8] |= 0x80 >> (bit % 8);
}

fn clear_bit(bytes: &mut [u8], bit: usize) {
    bytes[bit / 8] &= !(0x80 >> (bit % 8));
}

/// Set bits among the first `limit` bits.
fn count_set_bits(bytes: &[u8], limit: usize) -> u64 {
    let whole = limit / 8;
    let mut count: u64 = bytes[..whole].iter().map(|b| u64::from(b.count_ones())).sum();
    let rest = limit % 8;
    if rest > 0 {
        let mask = !(0xFFu8 >> rest);
        count += u64::from((bytes[whole] & mask).count_ones());
    }
    count
}

/// Clear the bits of `range` that `segment` tracks, then set those of
/// `used`. Returns whether the bitmap changed.
fn reset_bits(bitmap: &mut [u8], segment: &MapSegment, range: &Range<u64>, used: &[NodeNumber]) -> bool {
    let before = bitmap.to_vec();
    for number in range.start.max(segment.first_bit)..range.end.min(segment.end()) {
        clear_bit(bitmap, (number - segment.first_bit) as usize);
    }
    for bit in used.iter().filter_map(|&number| segment.bit_of(number)) {
        set_bit(bitmap, bit);
    }
    bitmap != before.as_slice()
}

/// Create map node `segment.node` with the bits of `used` already set.
fn write_map_node<P: BlockProvider>(
    store: &mut NodeStore<P>,
    limits: Limits,
    segment: &MapSegment,
    next: NodeNumber,
    used: &[NodeNumber],
) -> Result<(), BTreeError> {
    let mut bitmap = vec![0u8; map_record_size(limits.node_size)];
    for bit in used.iter().filter_map(|&number| segment.bit_of(number)) {
        set_bit(&mut bitmap, bit);
    }
    let mut node = store.acquire_fresh(segment.node, limits, NodeKind::Map, 0)?;
    if !node.insert_record(0, &bitmap) {
        return Err(BTreeError::NodeFull(segment.node));
    }
    node.set_forward_link(next);
    store.release(node, limits, Writeback::Immediate)?;
    tracing::debug!(node = segment.node, next, "wrote map node");
    Ok(())
}

/// Apply `reset_bits` to an existing map node and optionally relink it.
/// Writes nothing when neither changes.
fn update_segment<P: BlockProvider>(
    store: &mut NodeStore<P>,
    limits: Limits,
    segment: &MapSegment,
    range: &Range<u64>,
    used: &[NodeNumber],
    link: Option<NodeNumber>,
) -> Result<(), BTreeError> {
    let mut node = store.acquire(segment.node, limits, Access::Read)?;
    let mut bitmap = node.record(segment.record).to_vec();
    let changed = reset_bits(&mut bitmap, segment, range, used);
    if !changed && link.is_none_or(|link| link == node.forward_link()) {
        return Ok(());
    }
    store.modify(&node)?;
    node.record_mut(segment.record).copy_from_slice(&bitmap);
    if let Some(link) = link {
        node.set_forward_link(link);
    }
    store.release(node, limits, Writeback::Immediate)
}

/// One map record in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapSegment {
    /// Node holding the record.
    pub node: NodeNumber,
    /// Record index within that node.
    pub record: usize,
    /// Node number tracked by bit 0 of the record.
    pub first_bit: u64,
    pub bits: u64,
}

impl MapSegment {
    const fn end(&self) -> u64 {
        self.first_bit + self.bits
    }

    /// Bit index of `number` within this segment, if it is tracked here.
    fn bit_of(&self, number: NodeNumber) -> Option<usize> {
        let bit = u64::from(number);
        (bit >= self.first_bit && bit < self.end()).then(|| (bit - self.first_bit) as usize)
    }
}

/// Cached map chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationMap {
    segments: Vec<MapSegment>,
}

impl AllocationMap {
    /// Walk the map chain starting at the header node.
    pub fn load<P: BlockProvider>(store: &mut NodeStore<P>, control: &ControlBlock) -> Result<Self, BTreeError> {
        let limits = control.limits();
        let header = store.acquire(0, limits, Access::Read)?;
        check_header_node(&header)?;

        let mut segments = vec![MapSegment {
            node: 0,
            record: HEADER_MAP_INDEX,
            first_bit: 0,
            bits: header.record(HEADER_MAP_INDEX).len() as u64 * BITS_PER_BYTE,
        }];
        let mut next = header.forward_link();
        drop(header);

        while next != 0 {
            if segments.iter().any(|segment| segment.node == next) {
                return Err(BTreeError::Corruption(NodeError::MapChainCycle { node: next }));
            }
            let node = store.acquire(next, limits, Access::Read)?;
            if node.kind() != NodeKind::Map {
                return Err(BTreeError::Corruption(NodeError::UnexpectedKind {
                    node: next,
                    expected: NodeKind::Map,
                    found: node.kind(),
                }));
            }
            let first_bit = segments.last().map_or(0, MapSegment::end);
            segments.push(MapSegment {
                node: next,
                record: 0,
                first_bit,
                bits: node.record(0).len() as u64 * BITS_PER_BYTE,
            });
            next = node.forward_link();
        }

        let map = Self { segments };
        let capacity = map.capacity_bits();
        if capacity < u64::from(control.total_nodes) {
            tracing::warn!(capacity, total_nodes = control.total_nodes, "map chain too short");
            return Err(BTreeError::Corruption(NodeError::MapTooShort {
                node: capacity as NodeNumber,
            }));
        }
        tracing::debug!(segments = map.segments.len(), "loaded allocation map");
        Ok(map)
    }

    #[must_use]
    pub fn segments(&self) -> &[MapSegment] {
        &self.segments
    }

    /// Nodes the chain can track.
    #[must_use]
    pub fn capacity_bits(&self) -> u64 {
        self.segments.last().map_or(0, MapSegment::end)
    }

    fn locate(&self, number: NodeNumber) -> Result<(MapSegment, usize), BTreeError> {
        self.segments
            .iter()
            .find_map(|segment| segment.bit_of(number).map(|bit| (*segment, bit)))
            .ok_or(BTreeError::Corruption(NodeError::MapTooShort { node: number }))
    }

    /// Claim the lowest-numbered free node.
    pub fn allocate<P: BlockProvider>(
        &self,
        store: &mut NodeStore<P>,
        control: &mut ControlBlock,
    ) -> Result<NodeNumber, BTreeError> {
        let limits = control.limits();
        let total = u64::from(control.total_nodes);

        for segment in &self.segments {
            if segment.first_bit >= total {
                break;
            }
            let mut node = store.acquire(segment.node, limits, Access::Read)?;
            let Some(bit) = first_clear_bit(node.record(segment.record)) else {
                continue;
            };
            let number = segment.first_bit + bit as u64;
            if number >= total {
                break;
            }
            if control.free_nodes == 0 {
                return Err(BTreeError::Corruption(NodeError::FreeCountMismatch {
                    free_nodes: control.free_nodes,
                }));
            }

            store.modify(&node)?;
            set_bit(node.record_mut(segment.record), bit);
            store.release(node, limits, Writeback::Deferred)?;

            control.free_nodes -= 1;
            control.mark_dirty();
            tracing::debug!(node = number, free_nodes = control.free_nodes, "allocated node");
            return Ok(number as NodeNumber);
        }

        tracing::debug!(total_nodes = control.total_nodes, "no free nodes");
        Err(BTreeError::TreeFull)
    }

    /// Return a node to the free pool.
    pub fn free<P: BlockProvider>(
        &self,
        store: &mut NodeStore<P>,
        control: &mut ControlBlock,
        number: NodeNumber,
    ) -> Result<(), BTreeError> {
        if number == 0 || number >= control.total_nodes {
            return Err(BTreeError::InvalidNodeNumber {
                node: number,
                total_nodes: control.total_nodes,
            });
        }
        let limits = control.limits();
        let (segment, bit) = self.locate(number)?;

        let mut node = store.acquire(segment.node, limits, Access::Read)?;
        if !bit_is_set(node.record(segment.record), bit) {
            return Err(BTreeError::NodeAlreadyFree(number));
        }
        store.modify(&node)?;
        clear_bit(node.record_mut(segment.record), bit);
        store.release(node, limits, Writeback::Deferred)?;

        control.free_nodes += 1;
        control.mark_dirty();
        tracing::debug!(node = number, free_nodes = control.free_nodes, "freed node");
        Ok(())
    }

    /// Whether `number` is marked in use.
    pub fn is_allocated<P: BlockProvider>(
        &self,
        store: &mut NodeStore<P>,
        control: &ControlBlock,
        number: NodeNumber,
    ) -> Result<bool, BTreeError> {
        let (segment, bit) = self.locate(number)?;
        let node = store.acquire(segment.node, control.limits(), Access::Read)?;
        Ok(bit_is_set(node.record(segment.record), bit))
    }

    /// Number of in-use bits below `total_nodes`.
    pub fn count_allocated<P: BlockProvider>(
        &self,
        store: &mut NodeStore<P>,
        control: &ControlBlock,
    ) -> Result<u64, BTreeError> {
        let total = u64::from(control.total_nodes);
        let mut count = 0;
        for segment in &self.segments {
            if segment.first_bit >= total {
                break;
            }
            let limit = segment.bits.min(total - segment.first_bit) as usize;
            let node = store.acquire(segment.node, control.limits(), Access::Read)?;
            count += count_set_bits(node.record(segment.record), limit);
        }
        Ok(count)
    }

    /// Grow the tree by roughly `requested_bytes`.
    ///
    /// The provider may grant less than asked; whatever whole nodes the new
    /// size holds are taken. New map nodes are appended to the chain as
    /// needed and carved out of the new space. The extension becomes visible
    /// with one write of node 0; if that write fails the tree keeps its old
    /// size. Returns the number of nodes added.
    pub fn extend_by<P: BlockProvider>(
        &mut self,
        store: &mut NodeStore<P>,
        control: &mut ControlBlock,
        requested_bytes: u64,
    ) -> Result<u32, BTreeError> {
        let node_size = control.node_size as u64;
        let old_total = control.total_nodes;
        let current_bytes = u64::from(old_total) * node_size;
        let wanted = current_bytes.saturating_add(requested_bytes);

        let granted = store.provider_mut().extend_underlying_file(wanted)?;
        let new_total = (granted / node_size).min(u64::from(u32::MAX)) as u32;
        if new_total <= old_total {
            tracing::warn!(requested_bytes, granted, "storage grant too small to add a node");
            return Err(BTreeError::ExtendTooSmall {
                requested: requested_bytes,
                granted: granted.saturating_sub(current_bytes),
            });
        }
        if granted < wanted {
            tracing::info!(wanted, granted, new_total, "partial storage grant");
        }

        let added = new_total - old_total;
        let per_map = map_node_bits(control.node_size);
        let capacity = self.capacity_bits();
        let new_maps = if u64::from(new_total) > capacity {
            (u64::from(new_total) - capacity).div_ceil(per_map) as u32
        } else {
            0
        };
        if new_maps > added {
            return Err(BTreeError::ExtendTooSmall {
                requested: requested_bytes,
                granted: granted.saturating_sub(current_bytes),
            });
        }

        let mut limits = control.limits();
        limits.total_nodes = new_total;
        let tail = *self.segments.last().ok_or(BTreeError::Corruption(NodeError::MapTooShort {
            node: old_total,
        }))?;
        let range = u64::from(old_total)..u64::from(new_total);
        let map_nodes: Vec<NodeNumber> = (old_total..old_total + new_maps).collect();
        let first_map = map_nodes.first().copied();

        // Nothing on disk points at the new map nodes until the chain tail
        // is linked, so they go first.
        let mut segments = self.segments.clone();
        for (i, &number) in map_nodes.iter().enumerate() {
            let segment = MapSegment {
                node: number,
                record: 0,
                first_bit: segments.last().map_or(0, MapSegment::end),
                bits: per_map,
            };
            let next = map_nodes.get(i + 1).copied().unwrap_or(0);
            write_map_node(store, limits, &segment, next, &map_nodes)?;
            segments.push(segment);
        }

        // Bits past the old total may be left over from a failed extension.
        let linked_map_tail = first_map.filter(|_| tail.node != 0);
        for segment in self.segments.iter().filter(|segment| segment.node != 0) {
            let link = linked_map_tail.filter(|_| segment.node == tail.node);
            if link.is_some() || segment.end() > range.start {
                update_segment(store, limits, segment, &range, &map_nodes, link)?;
            }
        }

        let mut extended = control.clone();
        extended.total_nodes = new_total;
        extended.free_nodes += added - new_maps;
        extended.mark_dirty();
        let header_link = first_map.filter(|_| tail.node == 0);
        if let Err(e) = self.commit_header(store, limits, &extended, &range, &map_nodes, header_link) {
            if linked_map_tail.is_some() {
                // The header still has the old total, so the tail must not
                // point past it.
                if let Err(undo) = update_segment(store, limits, &tail, &(0..0), &[], Some(0)) {
                    tracing::error!(node = tail.node, error = %undo, "failed to unlink map chain tail");
                }
            }
            tracing::warn!(old_total, new_total, error = %e, "extension not committed");
            return Err(e);
        }
        extended.header_dirty = false;
        *control = extended;
        self.segments = segments;

        tracing::info!(old_total, new_total, map_nodes = new_maps, "extended tree");
        Ok(added)
    }

    /// Single write of node 0 that makes an extension visible: header
    /// record, header map bits and, when the header is the chain tail, the
    /// link to the first new map node.
    fn commit_header<P: BlockProvider>(
        &self,
        store: &mut NodeStore<P>,
        limits: Limits,
        extended: &ControlBlock,
        range: &Range<u64>,
        map_nodes: &[NodeNumber],
        link: Option<NodeNumber>,
    ) -> Result<(), BTreeError> {
        let segment = *self.segments.first().ok_or(BTreeError::Corruption(NodeError::MapTooShort {
            node: 0,
        }))?;
        let mut node = store.acquire(0, limits, Access::Read)?;
        check_header_node(&node)?;
        store.modify(&node)?;
        reset_bits(node.record_mut(segment.record), &segment, range, map_nodes);
        if let Some(link) = link {
            node.set_forward_link(link);
        }
        extended.write_header(&mut node);
        store.release(node, limits, Writeback::Immediate)
    }

    /// Overwrite every free node with zeros, skipping nodes pinned by the
    /// provider or the open transaction. Returns how many were zeroed.
    pub fn zero_unused_nodes<P: BlockProvider>(
        &self,
        store: &mut NodeStore<P>,
        control: &ControlBlock,
    ) -> Result<u32, BTreeError> {
        let limits = control.limits();
        let total = u64::from(control.total_nodes);
        let mut zeroed = 0;
        let mut skipped = 0;

        for segment in &self.segments {
            if segment.first_bit >= total {
                break;
            }
            let bitmap = store
                .acquire(segment.node, limits, Access::Read)?
                .record(segment.record)
                .to_vec();
            let end = segment.bits.min(total - segment.first_bit) as usize;
            for bit in (0..end).filter(|&bit| !bit_is_set(&bitmap, bit)) {
                let number = (segment.first_bit + bit as u64) as NodeNumber;
                if store.is_locked(number) {
                    skipped += 1;
                    continue;
                }
                store.write_zeroed(number, limits.node_size)?;
                zeroed += 1;
            }
        }

        tracing::info!(zeroed, skipped, "zeroed unused nodes");
        Ok(zeroed)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::btree::schema::BytewiseKeys;
    use crate::btree::tree::{BTree, OpenOptions};
    use crate::btree::verify::VerifyOptions;
    use crate::storage::memory::MemoryProvider;
    use crate::testing::{format_tree, reopen, u32_key, value_for};

    fn open_after_crash(tree: BTree<MemoryProvider>) -> BTree<MemoryProvider> {
        let provider = tree.into_provider();
        BTree::open(provider, Box::new(BytewiseKeys), OpenOptions::default()).unwrap()
    }

    fn assert_conserved(tree: &mut BTree<MemoryProvider>) {
        let allocated = tree.map.count_allocated(&mut tree.store, &tree.control).unwrap();
        assert_eq!(
            u64::from(tree.control.free_nodes) + allocated,
            u64::from(tree.control.total_nodes)
        );
    }

    fn assert_clean(tree: &mut BTree<MemoryProvider>) {
        let report = tree.verify(VerifyOptions { check_key_order: true }).unwrap();
        assert!(report.is_clean(), "problems: {:?}", report.problems);
    }

    #[test]
    fn test_first_clear_bit_word_scan() {
        assert_eq!(first_clear_bit(&[0xFF, 0xFF, 0x7F, 0xFF]), Some(16));
        assert_eq!(first_clear_bit(&[0xFF, 0xFE]), Some(15));
        assert_eq!(first_clear_bit(&[0xC0, 0x00]), Some(2));
        assert_eq!(first_clear_bit(&[0xFF, 0xFF]), None);
    }

    #[test]
    fn test_first_clear_bit_odd_length() {
        assert_eq!(first_clear_bit(&[0xFF, 0xFF, 0xF0]), Some(20));
        assert_eq!(first_clear_bit(&[0xFF, 0xFF, 0xFF]), None);
    }

    #[test]
    fn test_count_set_bits_respects_limit() {
        assert_eq!(count_set_bits(&[0xFF, 0xFF], 12), 12);
        assert_eq!(count_set_bits(&[0x80, 0x01], 9), 1);
        assert_eq!(count_set_bits(&[0x80, 0x01], 16), 2);
    }

    #[test]
    fn test_calc_map_bits() {
        assert_eq!(calc_map_bits(512, 10), 2048);
        assert_eq!(calc_map_bits(512, 2048), 2048);
        assert_eq!(calc_map_bits(512, 2049), 2048 + 3936);
        assert_eq!(calc_map_bits(4096, 100_000), 30720 + 3 * 32608);
    }

    #[test]
    fn test_allocate_returns_lowest_free_node() {
        let mut tree = format_tree(4096, 8);
        assert_eq!(tree.allocate_node().unwrap(), 1);
        assert_eq!(tree.allocate_node().unwrap(), 2);
        tree.free_node(1).unwrap();
        assert_eq!(tree.allocate_node().unwrap(), 1);
        assert_eq!(tree.info().free_nodes, 5);
    }

    #[test]
    fn test_allocate_until_full() {
        let mut tree = format_tree(512, 4);
        for expected in 1..4 {
            assert_eq!(tree.allocate_node().unwrap(), expected);
        }
        assert!(matches!(tree.allocate_node(), Err(BTreeError::TreeFull)));
        assert_eq!(tree.info().free_nodes, 0);
    }

    #[test]
    fn test_double_free_is_rejected() {
        let mut tree = format_tree(512, 4);
        let node = tree.allocate_node().unwrap();
        tree.free_node(node).unwrap();
        assert!(matches!(
            tree.free_node(node),
            Err(BTreeError::NodeAlreadyFree(n)) if n == node
        ));
        assert_eq!(tree.info().free_nodes, 3);
    }

    #[test]
    fn test_free_out_of_range() {
        let mut tree = format_tree(512, 4);
        assert!(matches!(
            tree.free_node(0),
            Err(BTreeError::InvalidNodeNumber { node: 0, .. })
        ));
        assert!(matches!(
            tree.free_node(4),
            Err(BTreeError::InvalidNodeNumber { node: 4, .. })
        ));
    }

    #[test]
    fn test_extend_adds_map_nodes_past_header_capacity() {
        let mut tree = format_tree(512, 16);
        let added = tree.extend_by(512 * 3000).unwrap();
        assert_eq!(added, 3000);

        let info = tree.info();
        assert_eq!(info.total_nodes, 3016);
        // Header plus one new map node at the old end of the tree.
        assert_eq!(info.free_nodes, 3016 - 2);
        assert_eq!(tree.map.segments().len(), 2);
        assert_eq!(tree.map.segments()[1].node, 16);
        assert!(tree.map.capacity_bits() >= calc_map_bits(512, 3016));

        let allocated = tree.map.count_allocated(&mut tree.store, &tree.control).unwrap();
        assert_eq!(u64::from(info.free_nodes) + allocated, u64::from(info.total_nodes));
    }

    #[test]
    fn test_allocation_crosses_into_map_nodes() {
        let mut tree = format_tree(512, 16);
        tree.extend_by(512 * 3000).unwrap();

        let mut last = 0;
        while let Ok(node) = tree.allocate_node() {
            assert_ne!(node, 16);
            assert!(node > last);
            last = node;
        }
        assert_eq!(last, 3015);
        assert_eq!(tree.info().free_nodes, 0);

        let allocated = tree.map.count_allocated(&mut tree.store, &tree.control).unwrap();
        assert_eq!(allocated, 3016);
    }

    #[test]
    fn test_map_chain_survives_reopen() {
        let mut tree = format_tree(512, 16);
        tree.extend_by(512 * 3000).unwrap();
        let segments = tree.map.segments().to_vec();

        let tree = crate::testing::reopen(tree);
        assert_eq!(tree.map.segments(), segments.as_slice());
    }

    #[test]
    fn test_failed_extension_from_header_tail_keeps_old_tree() {
        // One map node write, then the node 0 commit.
        for writes in 0..3u64 {
            let mut tree = format_tree(512, 16);
            for i in 0..10u32 {
                tree.insert(&u32_key(i), &value_for(i)).unwrap();
            }
            tree.flush_header_if_dirty().unwrap();
            tree.provider_mut().fail_write_after(writes);

            let result = tree.extend_by(512 * 3000);
            assert_eq!(result.is_ok(), writes >= 2, "writes before failure: {writes}");
            let expected_total = if result.is_ok() { 3016 } else { 16 };
            assert_eq!(tree.info().total_nodes, expected_total);

            let mut tree = open_after_crash(tree);
            assert_eq!(tree.info().total_nodes, expected_total);
            assert_eq!(tree.info().leaf_records, 10);
            assert_conserved(&mut tree);
            assert_clean(&mut tree);

            if result.is_err() {
                tree.extend_by(512 * 3000).unwrap();
                assert_eq!(tree.info().total_nodes, 3016);
                assert_conserved(&mut tree);
                assert_clean(&mut tree);
            }
        }
    }

    #[test]
    fn test_failed_extension_from_map_tail_unlinks_new_node() {
        let mut tree = format_tree(512, 16);
        tree.extend_by(512 * 3000).unwrap();
        // New map node 3016, relinked tail 16, then the commit fails.
        tree.provider_mut().fail_write_after(2);
        assert!(tree.extend_by(512 * 4000).is_err());
        assert_eq!(tree.info().total_nodes, 3016);
        assert_eq!(tree.map.segments().len(), 2);

        let mut tree = open_after_crash(tree);
        assert_eq!(tree.info().total_nodes, 3016);
        assert_eq!(tree.map.segments().len(), 2);
        assert_conserved(&mut tree);
        assert_clean(&mut tree);

        // The bit the failed attempt set for node 3016 is cleared and set again.
        tree.extend_by(512 * 4000).unwrap();
        assert_eq!(tree.info().total_nodes, 7016);
        assert_eq!(tree.map.segments().len(), 3);
        assert_eq!(tree.info().free_nodes, 7016 - 3);
        assert_conserved(&mut tree);
        assert_clean(&mut tree);
    }

    #[test]
    fn test_open_rejects_map_chain_shorter_than_tree() {
        let mut tree = format_tree(512, 16);
        tree.extend_by(512 * 3000).unwrap();
        let mut provider = tree.close().unwrap();
        // Cut the chain at the header's forward link.
        provider.as_bytes_mut()[0..4].fill(0);

        let result = BTree::open(provider, Box::new(BytewiseKeys), OpenOptions::default());
        assert!(matches!(
            result,
            Err(BTreeError::Corruption(NodeError::MapTooShort { node: 2048 }))
        ));
    }

    #[test]
    fn test_random_allocate_free_conserves_nodes() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut tree = format_tree(512, 64);
        let mut held: Vec<NodeNumber> = Vec::new();

        for _ in 0..2000 {
            if held.is_empty() || rng.random_bool(0.55) {
                match tree.allocate_node() {
                    Ok(node) => {
                        assert!(!held.contains(&node), "node {node} handed out twice");
                        held.push(node);
                    }
                    Err(BTreeError::TreeFull) => assert_eq!(held.len(), 63),
                    Err(e) => panic!("allocate: {e}"),
                }
            } else {
                let node = held.swap_remove(rng.random_range(0..held.len()));
                tree.free_node(node).unwrap();
            }
            assert_eq!(tree.info().free_nodes as usize, 63 - held.len());
            assert_conserved(&mut tree);
        }

        let mut tree = reopen(tree);
        assert_eq!(tree.info().free_nodes as usize, 63 - held.len());
        assert_conserved(&mut tree);
    }

    #[test]
    fn test_zero_unused_nodes_skips_locked() {
        let mut tree = format_tree(512, 8);
        tree.insert(&u32_key(1), b"one!").unwrap();
        assert_eq!(tree.info().root_node, 1);

        // Dirty a free node directly, then lock another.
        tree.store.provider_mut().as_bytes_mut()[5 * 512] = 0xAA;
        tree.store.provider_mut().as_bytes_mut()[6 * 512] = 0xBB;
        tree.store.provider_mut().lock(6);

        let zeroed = tree.zero_unused_nodes().unwrap();
        // Nodes 0 and the root leaf are in use; 6 is locked.
        assert_eq!(zeroed, 8 - 2 - 1);
        let bytes = tree.store.provider().as_bytes();
        assert_eq!(bytes[5 * 512], 0);
        assert_eq!(bytes[6 * 512], 0xBB);
    }
}
