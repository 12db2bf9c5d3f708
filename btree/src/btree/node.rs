//! Node buffers and the in-memory node view.
//!
//! # Node layout
//!
//! ```text
//! +------------------+---------------------------+-------------------+
//! | Descriptor (14B) | Records, packed upward    | Offset table      |
//! |                  | from byte 14              | growing downward  |
//! +------------------+---------------------------+-------------------+
//! ```
//!
//! Descriptor:
//! - `forward` (u32): next node at the same level, 0 for none
//! - `backward` (u32): previous node at the same level, 0 for none
//! - `kind` (i8): -1 leaf, 0 index, 1 header, 2 map
//! - `height` (u8): 1 for leaves, parent height is child height + 1
//! - `num_records` (u16)
//! - reserved (u16)
//!
//! The offset table holds `num_records + 1` u16 entries. Entry `i` sits at
//! `node_size - 2 * (i + 1)`: the last two bytes of the node point at record
//! 0, and the entry after the last record points at the start of free space.
//!
//! A buffer's byte order is part of its type. `NodeBuf<OnDisk>` holds raw
//! big-endian bytes; `Node` is a validated buffer in host order. Only the
//! codec converts between the two.

use std::marker::PhantomData;

use crate::btree::endian::{host_u16, host_u32, set_host_u16, set_host_u32};
use crate::storage::io::{Block, NodeNumber};

/// Size of the node descriptor.
pub const DESCRIPTOR_SIZE: usize = 14;
/// Size of one offset table entry.
pub const OFFSET_SIZE: usize = 2;
/// Smallest legal node size.
pub const MIN_NODE_SIZE: usize = 512;
/// Largest legal node size.
pub const MAX_NODE_SIZE: usize = 32768;
/// Maximum tree height; also bounds descent paths.
pub const MAX_TREE_DEPTH: u8 = 16;

/// Descriptor field offsets.
pub(crate) mod desc {
    pub const FORWARD: usize = 0;
    pub const BACKWARD: usize = 4;
    pub const KIND: usize = 8;
    pub const HEIGHT: usize = 9;
    pub const NUM_RECORDS: usize = 10;
    pub const RESERVED: usize = 12;
}

/// Whether `node_size` is a power of two between 512 and 32768.
#[must_use]
pub const fn is_valid_node_size(node_size: usize) -> bool {
    node_size.is_power_of_two() && node_size >= MIN_NODE_SIZE && node_size <= MAX_NODE_SIZE
}

/// Node kind, stored as a signed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Leaf,
    Index,
    Header,
    Map,
}

impl NodeKind {
    /// On-disk value.
    #[must_use]
    pub const fn raw(self) -> i8 {
        match self {
            Self::Leaf => -1,
            Self::Index => 0,
            Self::Header => 1,
            Self::Map => 2,
        }
    }
}

impl TryFrom<i8> for NodeKind {
    type Error = i8;

    fn try_from(raw: i8) -> Result<Self, Self::Error> {
        match raw {
            -1 => Ok(Self::Leaf),
            0 => Ok(Self::Index),
            1 => Ok(Self::Header),
            2 => Ok(Self::Map),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Leaf => "leaf",
            Self::Index => "index",
            Self::Header => "header",
            Self::Map => "map",
        };
        f.write_str(name)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Byte order of a node buffer.
pub trait Encoding: sealed::Sealed {}

/// Raw big-endian bytes as stored.
#[derive(Debug)]
pub enum OnDisk {}

/// Host byte order, validated.
#[derive(Debug)]
pub enum Host {}

impl sealed::Sealed for OnDisk {}
impl sealed::Sealed for Host {}
impl Encoding for OnDisk {}
impl Encoding for Host {}

/// A node-sized buffer tagged with its byte order.
#[derive(Debug)]
pub struct NodeBuf<E: Encoding> {
    number: NodeNumber,
    data: Vec<u8>,
    from_disk: bool,
    encoding: PhantomData<E>,
}

impl<E: Encoding> NodeBuf<E> {
    #[must_use]
    pub const fn number(&self) -> NodeNumber {
        self.number
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub const fn is_from_disk(&self) -> bool {
        self.from_disk
    }

    /// Untyped block for handing back to a provider.
    #[must_use]
    pub fn into_block(self) -> Block {
        Block::new(self.number, self.data, self.from_disk)
    }

    pub(super) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Change the byte-order tag after the codec converted the contents.
    pub(super) fn relabel<F: Encoding>(self) -> NodeBuf<F> {
        NodeBuf {
            number: self.number,
            data: self.data,
            from_disk: self.from_disk,
            encoding: PhantomData,
        }
    }
}

impl NodeBuf<OnDisk> {
    /// Treat a provider block as raw on-disk bytes.
    #[must_use]
    pub fn from_block(block: Block) -> Self {
        let number = block.number();
        let from_disk = block.is_from_disk();
        Self {
            number,
            data: block.into_data(),
            from_disk,
            encoding: PhantomData,
        }
    }
}

/// A decoded node in host byte order.
///
/// Every accessor relies on the codec having validated the offset table, so
/// indexing cannot run outside the buffer.
#[derive(Debug)]
pub struct Node {
    buf: NodeBuf<Host>,
    kind: NodeKind,
    /// Accepted as an all-zero node under a tolerant read. Carries no
    /// usable records and cannot be encoded.
    blank: bool,
}

impl Node {
    pub(super) const fn from_host(buf: NodeBuf<Host>, kind: NodeKind, blank: bool) -> Self {
        Self { buf, kind, blank }
    }

    /// Lay out an empty node of `kind` over a provider block.
    #[must_use]
    pub fn init(block: Block, kind: NodeKind, height: u8) -> Self {
        let mut buf = NodeBuf::<OnDisk>::from_block(block).relabel::<Host>();
        buf.data.fill(0);
        buf.data[desc::KIND] = kind.raw().to_ne_bytes()[0];
        buf.data[desc::HEIGHT] = height;
        let mut node = Self {
            buf,
            kind,
            blank: false,
        };
        node.set_record_offset(0, DESCRIPTOR_SIZE);
        node
    }

    pub(super) fn into_buf(self) -> NodeBuf<Host> {
        self.buf
    }

    #[must_use]
    pub fn into_block(self) -> Block {
        self.buf.into_block()
    }

    #[must_use]
    pub const fn number(&self) -> NodeNumber {
        self.buf.number
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    #[must_use]
    pub const fn is_blank(&self) -> bool {
        self.blank
    }

    #[must_use]
    pub const fn is_from_disk(&self) -> bool {
        self.buf.from_disk
    }

    #[must_use]
    pub fn node_size(&self) -> usize {
        self.buf.data.len()
    }

    #[must_use]
    pub fn height(&self) -> u8 {
        self.buf.data[desc::HEIGHT]
    }

    #[must_use]
    pub fn forward_link(&self) -> NodeNumber {
        host_u32(&self.buf.data, desc::FORWARD)
    }

    #[must_use]
    pub fn backward_link(&self) -> NodeNumber {
        host_u32(&self.buf.data, desc::BACKWARD)
    }

    pub fn set_forward_link(&mut self, link: NodeNumber) {
        set_host_u32(&mut self.buf.data, desc::FORWARD, link);
    }

    pub fn set_backward_link(&mut self, link: NodeNumber) {
        set_host_u32(&mut self.buf.data, desc::BACKWARD, link);
    }

    #[must_use]
    pub fn num_records(&self) -> u16 {
        host_u16(&self.buf.data, desc::NUM_RECORDS)
    }

    fn set_num_records(&mut self, count: usize) {
        // Bounded by the offset table, which cannot exceed the node.
        #[allow(clippy::cast_possible_truncation)]
        set_host_u16(&mut self.buf.data, desc::NUM_RECORDS, count as u16);
    }

    fn table_entry(&self, index: usize) -> usize {
        self.node_size() - OFFSET_SIZE * (index + 1)
    }

    /// Offset of record `index`; `index == num_records` gives the start of
    /// free space.
    #[must_use]
    pub fn record_offset(&self, index: usize) -> usize {
        usize::from(host_u16(&self.buf.data, self.table_entry(index)))
    }

    fn set_record_offset(&mut self, index: usize, offset: usize) {
        let entry = self.table_entry(index);
        #[allow(clippy::cast_possible_truncation)]
        set_host_u16(&mut self.buf.data, entry, offset as u16);
    }

    #[must_use]
    pub fn free_space_offset(&self) -> usize {
        self.record_offset(usize::from(self.num_records()))
    }

    /// Bytes between the end of the records and the start of the offset
    /// table.
    #[must_use]
    pub fn free_space(&self) -> usize {
        let table_start = self.table_entry(usize::from(self.num_records()));
        table_start.saturating_sub(self.free_space_offset())
    }

    #[must_use]
    pub fn record(&self, index: usize) -> &[u8] {
        let start = self.record_offset(index);
        let end = self.record_offset(index + 1);
        &self.buf.data[start..end]
    }

    pub fn record_mut(&mut self, index: usize) -> &mut [u8] {
        let start = self.record_offset(index);
        let end = self.record_offset(index + 1);
        &mut self.buf.data[start..end]
    }

    fn offsets(&self) -> Vec<usize> {
        (0..=usize::from(self.num_records()))
            .map(|i| self.record_offset(i))
            .collect()
    }

    fn write_offsets(&mut self, offsets: &[usize]) {
        for (i, &offset) in offsets.iter().enumerate() {
            self.set_record_offset(i, offset);
        }
        self.set_num_records(offsets.len() - 1);
    }

    /// Insert `bytes` as record `index`, shifting later records up.
    ///
    /// Returns `false` without touching the node if the record plus its
    /// offset entry do not fit.
    pub fn insert_record(&mut self, index: usize, bytes: &[u8]) -> bool {
        let count = usize::from(self.num_records());
        if index > count || bytes.len() + OFFSET_SIZE > self.free_space() {
            return false;
        }

        let offsets = self.offsets();
        let at = offsets[index];
        let free = offsets[count];
        let len = bytes.len();

        self.buf.data.copy_within(at..free, at + len);
        self.buf.data[at..at + len].copy_from_slice(bytes);

        let mut updated = Vec::with_capacity(count + 2);
        updated.extend_from_slice(&offsets[..=index]);
        updated.extend(offsets[index..].iter().map(|offset| offset + len));
        self.write_offsets(&updated);
        true
    }

    /// Remove record `index`, shifting later records down and zeroing the
    /// vacated bytes.
    pub fn remove_record(&mut self, index: usize) {
        let count = usize::from(self.num_records());
        if index >= count {
            return;
        }

        let offsets = self.offsets();
        let start = offsets[index];
        let end = offsets[index + 1];
        let free = offsets[count];
        let len = end - start;

        self.buf.data.copy_within(end..free, start);
        self.buf.data[free - len..free].fill(0);

        let old_last_entry = self.table_entry(count);
        let mut updated = Vec::with_capacity(count);
        updated.extend_from_slice(&offsets[..index]);
        updated.extend(offsets[index + 1..].iter().map(|offset| offset - len));
        self.write_offsets(&updated);
        self.buf.data[old_last_entry..old_last_entry + OFFSET_SIZE].fill(0);
    }

    /// Drop every record, keeping the descriptor.
    pub fn clear_records(&mut self) {
        let size = self.node_size();
        self.buf.data[DESCRIPTOR_SIZE..size].fill(0);
        self.set_num_records(0);
        self.set_record_offset(0, DESCRIPTOR_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_leaf(size: usize) -> Node {
        Node::init(Block::new(3, vec![0xAA; size], false), NodeKind::Leaf, 1)
    }

    #[test]
    fn test_node_kind_raw_values() {
        for kind in [NodeKind::Leaf, NodeKind::Index, NodeKind::Header, NodeKind::Map] {
            assert_eq!(NodeKind::try_from(kind.raw()), Ok(kind));
        }
        assert_eq!(NodeKind::try_from(3), Err(3));
    }

    #[test]
    fn test_valid_node_sizes() {
        assert!(is_valid_node_size(512));
        assert!(is_valid_node_size(4096));
        assert!(is_valid_node_size(32768));
        assert!(!is_valid_node_size(256));
        assert!(!is_valid_node_size(1000));
        assert!(!is_valid_node_size(65536));
    }

    #[test]
    fn test_init_layout() {
        let node = empty_leaf(512);
        assert_eq!(node.kind(), NodeKind::Leaf);
        assert_eq!(node.height(), 1);
        assert_eq!(node.num_records(), 0);
        assert_eq!(node.free_space_offset(), DESCRIPTOR_SIZE);
        assert_eq!(node.free_space(), 512 - DESCRIPTOR_SIZE - OFFSET_SIZE);
        assert_eq!(node.forward_link(), 0);
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut node = empty_leaf(512);
        assert!(node.insert_record(0, &[2, 2]));
        assert!(node.insert_record(0, &[1, 1, 1, 1]));
        assert!(node.insert_record(2, &[3, 3]));

        assert_eq!(node.num_records(), 3);
        assert_eq!(node.record(0), &[1, 1, 1, 1]);
        assert_eq!(node.record(1), &[2, 2]);
        assert_eq!(node.record(2), &[3, 3]);
        assert_eq!(node.free_space_offset(), DESCRIPTOR_SIZE + 8);
    }

    #[test]
    fn test_insert_rejects_when_full() {
        let mut node = empty_leaf(512);
        let big = vec![7u8; 512 - DESCRIPTOR_SIZE - 2 * OFFSET_SIZE];
        assert!(node.insert_record(0, &big));
        assert_eq!(node.free_space(), 0);
        assert!(!node.insert_record(1, &[0, 0]));
        assert_eq!(node.num_records(), 1);
    }

    #[test]
    fn test_remove_shifts_and_zeroes() {
        let mut node = empty_leaf(512);
        node.insert_record(0, &[1, 1]);
        node.insert_record(1, &[2, 2, 2, 2]);
        node.insert_record(2, &[3, 3]);

        node.remove_record(1);

        assert_eq!(node.num_records(), 2);
        assert_eq!(node.record(0), &[1, 1]);
        assert_eq!(node.record(1), &[3, 3]);
        assert_eq!(node.free_space_offset(), DESCRIPTOR_SIZE + 4);
        let tail = &node.into_block().into_data()[DESCRIPTOR_SIZE + 4..DESCRIPTOR_SIZE + 8];
        assert!(tail.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clear_records() {
        let mut node = empty_leaf(512);
        node.insert_record(0, &[1, 1]);
        node.set_forward_link(9);
        node.clear_records();
        assert_eq!(node.num_records(), 0);
        assert_eq!(node.forward_link(), 9);
        assert_eq!(node.free_space_offset(), DESCRIPTOR_SIZE);
    }
}
