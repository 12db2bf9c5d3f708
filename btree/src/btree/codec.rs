//! Node codec: on-disk bytes to validated host nodes and back.
//!
//! Decoding walks the descriptor, then the offset table, then each record,
//! converting byte order and validating as it goes. Nothing a corrupt node
//! contains is trusted before it has been checked, and a node that fails
//! any check is never handed out. Encoding runs the same walk in the other
//! direction, so a buffer about to be written gets the same scrutiny.
//!
//! # Checks
//!
//! - Links stay inside the tree and never point at the node itself
//! - Kind is one of the four known values and height is at most 16
//! - The offset table fits in the node
//! - Offsets are even, at least 14, inside the record area and strictly
//!   increasing
//! - Header nodes sit at node 0 and hold exactly three records, map nodes
//!   hold one
//! - Key lengths are non-zero, within the tree maximum, and fit the record
//! - Index records carry a child pointer inside the tree

use crate::btree::endian::{Direction, swap_u16, swap_u32};
use crate::btree::header::{
    self, HEADER_MAP_INDEX, HEADER_RECORD_OFFSET, HEADER_RECORD_SIZE, HeaderRecord,
};
use crate::btree::node::{
    DESCRIPTOR_SIZE, MAX_TREE_DEPTH, Node, NodeBuf, NodeKind, OFFSET_SIZE, OnDisk, desc,
};
use crate::btree::record::{CHILD_POINTER_SIZE, RecordLayout};
use crate::btree::schema::KeySchema;
use crate::storage::io::{Block, NodeNumber};

/// Tree parameters the codec validates against.
pub struct CodecContext<'a> {
    pub node_size: usize,
    pub total_nodes: u32,
    pub layout: RecordLayout,
    pub schema: &'a dyn KeySchema,
}

/// A buffer the codec refused.
///
/// The block may be partially converted; its contents must be trashed.
#[derive(Debug)]
pub struct Rejected {
    pub error: NodeError,
    pub block: Block,
}

/// Decode a raw node.
///
/// With `allow_empty`, a never-initialized node (all-zero offset table, no
/// records) is accepted and comes back blank. Hinted reads use this to
/// look at nodes that may have been freed since the hint was taken.
pub fn decode(
    raw: NodeBuf<OnDisk>,
    ctx: &CodecContext<'_>,
    allow_empty: bool,
) -> Result<Node, Rejected> {
    let mut buf = raw;
    let number = buf.number();
    match convert(buf.data_mut(), number, ctx, allow_empty, Direction::ToHost) {
        Ok(shape) => Ok(Node::from_host(buf.relabel(), shape.kind, shape.blank)),
        Err(error) => Err(Rejected {
            error,
            block: buf.into_block(),
        }),
    }
}

/// Encode a host node for writing.
pub fn encode(node: Node, ctx: &CodecContext<'_>) -> Result<NodeBuf<OnDisk>, Rejected> {
    let number = node.number();
    if node.is_blank() {
        return Err(Rejected {
            error: NodeError::ZeroOffset { node: number, index: 0 },
            block: node.into_block(),
        });
    }
    let mut buf = node.into_buf();
    match convert(buf.data_mut(), number, ctx, false, Direction::ToDisk) {
        Ok(_) => Ok(buf.relabel()),
        Err(error) => Err(Rejected {
            error,
            block: buf.into_block(),
        }),
    }
}

/// Read just the header record out of the first bytes of node 0.
///
/// Used before the node size is known: the caller reads the smallest legal
/// node and learns the real size from the record.
pub fn decode_header_only(bytes: &[u8]) -> Result<HeaderRecord, NodeError> {
    let needed = HEADER_RECORD_OFFSET + HEADER_RECORD_SIZE;
    if bytes.len() < needed {
        return Err(NodeError::SizeMismatch {
            node: 0,
            expected: needed,
            actual: bytes.len(),
        });
    }
    let raw_kind = i8::from_ne_bytes([bytes[desc::KIND]]);
    match NodeKind::try_from(raw_kind) {
        Ok(NodeKind::Header) => Ok(HeaderRecord::from_disk(
            &bytes[HEADER_RECORD_OFFSET..needed],
        )),
        Ok(kind) => Err(NodeError::HeaderPlacement { node: 0, kind }),
        Err(raw) => Err(NodeError::InvalidKind { node: 0, raw }),
    }
}

struct Shape {
    kind: NodeKind,
    blank: bool,
}

fn convert(
    data: &mut [u8],
    number: NodeNumber,
    ctx: &CodecContext<'_>,
    allow_empty: bool,
    direction: Direction,
) -> Result<Shape, NodeError> {
    if data.len() != ctx.node_size {
        return Err(NodeError::SizeMismatch {
            node: number,
            expected: ctx.node_size,
            actual: data.len(),
        });
    }

    let forward = swap_u32(data, desc::FORWARD, direction);
    let backward = swap_u32(data, desc::BACKWARD, direction);
    let num_records = usize::from(swap_u16(data, desc::NUM_RECORDS, direction));
    swap_u16(data, desc::RESERVED, direction);
    check_link(number, forward, ctx.total_nodes)?;
    check_link(number, backward, ctx.total_nodes)?;

    let raw_kind = i8::from_ne_bytes([data[desc::KIND]]);
    let kind = NodeKind::try_from(raw_kind).map_err(|raw| NodeError::InvalidKind { node: number, raw })?;
    let height = data[desc::HEIGHT];
    if height > MAX_TREE_DEPTH {
        return Err(NodeError::HeightTooLarge { node: number, height });
    }

    let table_len = (num_records + 1) * OFFSET_SIZE;
    if DESCRIPTOR_SIZE + table_len > ctx.node_size {
        return Err(NodeError::OffsetTableOverflow {
            node: number,
            num_records,
        });
    }
    let table_start = ctx.node_size - table_len;

    let mut offsets = Vec::with_capacity(num_records + 1);
    for index in 0..=num_records {
        let entry = ctx.node_size - OFFSET_SIZE * (index + 1);
        let offset = usize::from(swap_u16(data, entry, direction));
        if offset == 0 {
            if allow_empty && num_records == 0 {
                return Ok(Shape { kind, blank: true });
            }
            return Err(NodeError::ZeroOffset { node: number, index });
        }
        if offset % 2 != 0 {
            return Err(NodeError::OddOffset {
                node: number,
                index,
                offset,
            });
        }
        if offset < DESCRIPTOR_SIZE || offset > table_start {
            return Err(NodeError::OffsetOutOfBounds {
                node: number,
                index,
                offset,
            });
        }
        if offsets.last().is_some_and(|&previous| offset <= previous) {
            return Err(NodeError::OffsetsNotIncreasing { node: number, index });
        }
        offsets.push(offset);
    }

    if (number == 0) != (kind == NodeKind::Header) {
        return Err(NodeError::HeaderPlacement { node: number, kind });
    }

    match kind {
        NodeKind::Header => convert_header(data, number, height, &offsets, direction)?,
        NodeKind::Map => {
            if num_records != 1 {
                return Err(NodeError::RecordCount {
                    node: number,
                    kind,
                    count: num_records,
                });
            }
        }
        NodeKind::Index | NodeKind::Leaf => {
            convert_records(data, number, kind, height, &offsets, ctx, direction)?;
        }
    }

    Ok(Shape { kind, blank: false })
}

fn check_link(number: NodeNumber, link: NodeNumber, total_nodes: u32) -> Result<(), NodeError> {
    if link >= total_nodes {
        return Err(NodeError::LinkOutOfRange {
            node: number,
            link,
            total_nodes,
        });
    }
    if number != 0 && link == number {
        return Err(NodeError::SelfLink { node: number });
    }
    Ok(())
}

fn convert_header(
    data: &mut [u8],
    number: NodeNumber,
    height: u8,
    offsets: &[usize],
    direction: Direction,
) -> Result<(), NodeError> {
    let count = offsets.len() - 1;
    if count != HEADER_MAP_INDEX + 1 {
        return Err(NodeError::RecordCount {
            node: number,
            kind: NodeKind::Header,
            count,
        });
    }
    if height != 0 {
        return Err(NodeError::BadHeight {
            node: number,
            kind: NodeKind::Header,
            height,
        });
    }
    let start = offsets[0];
    let size = offsets[1] - start;
    if start != HEADER_RECORD_OFFSET || size < HEADER_RECORD_SIZE {
        return Err(NodeError::HeaderRecordTooSmall { node: number, size });
    }
    header::swap_fields(&mut data[start..start + HEADER_RECORD_SIZE], direction);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn convert_records(
    data: &mut [u8],
    number: NodeNumber,
    kind: NodeKind,
    height: u8,
    offsets: &[usize],
    ctx: &CodecContext<'_>,
    direction: Direction,
) -> Result<(), NodeError> {
    let height_ok = match kind {
        NodeKind::Leaf => height == 1,
        _ => height >= 2,
    };
    if !height_ok {
        return Err(NodeError::BadHeight {
            node: number,
            kind,
            height,
        });
    }

    let layout = ctx.layout;
    let prefix = layout.prefix_size();
    let max_key_length = usize::from(layout.max_key_length());

    for (index, bounds) in offsets.windows(2).enumerate() {
        let (start, end) = (bounds[0], bounds[1]);
        let key_len = if layout.big_keys() {
            usize::from(swap_u16(data, start, direction))
        } else {
            usize::from(data[start])
        };

        if key_len == 0 {
            return Err(NodeError::EmptyKey { node: number, index });
        }
        if key_len > max_key_length {
            return Err(NodeError::KeyTooLong {
                node: number,
                index,
                len: key_len,
                max: layout.max_key_length(),
            });
        }
        if kind == NodeKind::Index && !layout.variable_index_keys() && key_len != max_key_length {
            return Err(NodeError::IndexKeyLength {
                node: number,
                index,
                len: key_len,
            });
        }

        let key_size = layout.key_size(key_len);
        let payload_start = match kind {
            NodeKind::Index => key_size + CHILD_POINTER_SIZE,
            _ => key_size,
        };
        if start + payload_start > end {
            return Err(NodeError::RecordOverrun { node: number, index });
        }

        if kind == NodeKind::Index {
            let child = swap_u32(data, start + key_size, direction);
            if child == 0 || child >= ctx.total_nodes {
                return Err(NodeError::ChildOutOfRange {
                    node: number,
                    index,
                    child,
                });
            }
        }

        let (key_area, rest) = data[start..end].split_at_mut(key_size);
        let key = &mut key_area[prefix..prefix + key_len];
        let payload: &mut [u8] = match kind {
            NodeKind::Leaf => rest,
            _ => &mut [],
        };
        ctx.schema
            .swap_record(kind, key, payload, direction)
            .map_err(|reason| NodeError::RecordRejected {
                node: number,
                index,
                reason,
            })?;
    }
    Ok(())
}

/// Structural damage found in a node or in the tree shape around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Buffer length differs from the tree's node size.
    SizeMismatch {
        node: NodeNumber,
        expected: usize,
        actual: usize,
    },
    /// Sibling link points past the end of the tree.
    LinkOutOfRange {
        node: NodeNumber,
        link: NodeNumber,
        total_nodes: u32,
    },
    /// Sibling link points at the node itself.
    SelfLink { node: NodeNumber },
    /// Unknown kind byte.
    InvalidKind { node: NodeNumber, raw: i8 },
    /// Height above the maximum tree depth.
    HeightTooLarge { node: NodeNumber, height: u8 },
    /// Height not legal for the node's kind.
    BadHeight {
        node: NodeNumber,
        kind: NodeKind,
        height: u8,
    },
    /// Offset table would overlap the descriptor.
    OffsetTableOverflow { node: NodeNumber, num_records: usize },
    ZeroOffset { node: NodeNumber, index: usize },
    OddOffset {
        node: NodeNumber,
        index: usize,
        offset: usize,
    },
    OffsetOutOfBounds {
        node: NodeNumber,
        index: usize,
        offset: usize,
    },
    OffsetsNotIncreasing { node: NodeNumber, index: usize },
    /// A header node away from node 0, or node 0 that is not a header.
    HeaderPlacement { node: NodeNumber, kind: NodeKind },
    /// Wrong number of records for a header or map node.
    RecordCount {
        node: NodeNumber,
        kind: NodeKind,
        count: usize,
    },
    HeaderRecordTooSmall { node: NodeNumber, size: usize },
    EmptyKey { node: NodeNumber, index: usize },
    KeyTooLong {
        node: NodeNumber,
        index: usize,
        len: usize,
        max: u16,
    },
    /// Fixed-length index key with the wrong length.
    IndexKeyLength {
        node: NodeNumber,
        index: usize,
        len: usize,
    },
    /// Key or child pointer runs past the end of its record.
    RecordOverrun { node: NodeNumber, index: usize },
    ChildOutOfRange {
        node: NodeNumber,
        index: usize,
        child: NodeNumber,
    },
    /// The key schema refused a record.
    RecordRejected {
        node: NodeNumber,
        index: usize,
        reason: String,
    },
    /// Node reached where another kind was expected.
    UnexpectedKind {
        node: NodeNumber,
        expected: NodeKind,
        found: NodeKind,
    },
    /// Node height disagrees with its position in the tree.
    HeightMismatch {
        node: NodeNumber,
        expected: u16,
        found: u8,
    },
    /// Index node with no records.
    EmptyIndexNode { node: NodeNumber },
    /// Descent went deeper than the maximum tree depth.
    DepthExceeded { node: NodeNumber },
    /// Map chain loops back on itself.
    MapChainCycle { node: NodeNumber },
    /// Allocation map does not cover a node inside the tree.
    MapTooShort { node: NodeNumber },
    /// Free count disagrees with the allocation map.
    FreeCountMismatch { free_nodes: u32 },
    /// Record path is empty where the tree has a root.
    MissingPath,
}

impl std::fmt::Display for NodeError {
    #[allow(clippy::too_many_lines)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeMismatch {
                node,
                expected,
                actual,
            } => write!(f, "node {node}: size {actual}, expected {expected}"),
            Self::LinkOutOfRange {
                node,
                link,
                total_nodes,
            } => write!(f, "node {node}: link {link} out of range (total nodes: {total_nodes})"),
            Self::SelfLink { node } => write!(f, "node {node}: links to itself"),
            Self::InvalidKind { node, raw } => write!(f, "node {node}: invalid kind {raw}"),
            Self::HeightTooLarge { node, height } => {
                write!(f, "node {node}: height {height} exceeds {MAX_TREE_DEPTH}")
            }
            Self::BadHeight { node, kind, height } => {
                write!(f, "node {node}: height {height} invalid for {kind} node")
            }
            Self::OffsetTableOverflow { node, num_records } => {
                write!(f, "node {node}: offset table for {num_records} records overflows")
            }
            Self::ZeroOffset { node, index } => write!(f, "node {node}: offset {index} is zero"),
            Self::OddOffset {
                node,
                index,
                offset,
            } => write!(f, "node {node}: offset {index} is odd ({offset})"),
            Self::OffsetOutOfBounds {
                node,
                index,
                offset,
            } => write!(f, "node {node}: offset {index} out of bounds ({offset})"),
            Self::OffsetsNotIncreasing { node, index } => {
                write!(f, "node {node}: offset {index} not above its predecessor")
            }
            Self::HeaderPlacement { node, kind } => {
                write!(f, "node {node}: {kind} node in header position mismatch")
            }
            Self::RecordCount { node, kind, count } => {
                write!(f, "node {node}: {kind} node with {count} records")
            }
            Self::HeaderRecordTooSmall { node, size } => {
                write!(f, "node {node}: header record of {size} bytes")
            }
            Self::EmptyKey { node, index } => write!(f, "node {node}: record {index} has empty key"),
            Self::KeyTooLong {
                node,
                index,
                len,
                max,
            } => write!(f, "node {node}: record {index} key length {len} exceeds {max}"),
            Self::IndexKeyLength { node, index, len } => {
                write!(f, "node {node}: fixed index key {index} has length {len}")
            }
            Self::RecordOverrun { node, index } => {
                write!(f, "node {node}: record {index} overruns its bounds")
            }
            Self::ChildOutOfRange { node, index, child } => {
                write!(f, "node {node}: record {index} child {child} out of range")
            }
            Self::RecordRejected {
                node,
                index,
                reason,
            } => write!(f, "node {node}: record {index} rejected: {reason}"),
            Self::UnexpectedKind {
                node,
                expected,
                found,
            } => write!(f, "node {node}: expected {expected} node, found {found}"),
            Self::HeightMismatch {
                node,
                expected,
                found,
            } => write!(f, "node {node}: height {found}, expected {expected}"),
            Self::EmptyIndexNode { node } => write!(f, "node {node}: index node has no records"),
            Self::DepthExceeded { node } => {
                write!(f, "node {node}: descent deeper than {MAX_TREE_DEPTH} levels")
            }
            Self::MapChainCycle { node } => write!(f, "map chain revisits node {node}"),
            Self::MapTooShort { node } => write!(f, "allocation map does not cover node {node}"),
            Self::FreeCountMismatch { free_nodes } => write!(
                f,
                "free node count {free_nodes} disagrees with the allocation map"
            ),
            Self::MissingPath => write!(f, "descent produced no path"),
        }
    }
}

impl std::error::Error for NodeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::header::TreeAttributes;
    use crate::btree::schema::BytewiseKeys;
    use crate::testing::NativeU32Keys;

    const SIZE: usize = 512;

    fn layout() -> RecordLayout {
        RecordLayout::new(
            TreeAttributes::BIG_KEYS | TreeAttributes::VARIABLE_INDEX_KEYS,
            32,
        )
    }

    fn ctx(schema: &dyn KeySchema) -> CodecContext<'_> {
        CodecContext {
            node_size: SIZE,
            total_nodes: 10,
            layout: layout(),
            schema,
        }
    }

    fn leaf_with(records: &[(&[u8], &[u8])]) -> Node {
        let mut node = Node::init(Block::new(3, vec![0; SIZE], false), NodeKind::Leaf, 1);
        for (i, (key, data)) in records.iter().enumerate() {
            assert!(node.insert_record(i, &layout().build_leaf_record(key, data)));
        }
        node.set_forward_link(4);
        node
    }

    fn encoded_leaf() -> Vec<u8> {
        let node = leaf_with(&[(b"apple", b"red!"), (b"banana", b"yellow")]);
        encode(node, &ctx(&BytewiseKeys)).unwrap().data().to_vec()
    }

    fn decode_bytes(bytes: Vec<u8>, number: NodeNumber, allow_empty: bool) -> Result<Node, NodeError> {
        let raw = NodeBuf::from_block(Block::new(number, bytes, true));
        decode(raw, &ctx(&BytewiseKeys), allow_empty).map_err(|rejected| rejected.error)
    }

    #[test]
    fn test_encoded_form_is_big_endian() {
        let bytes = encoded_leaf();
        assert_eq!(&bytes[0..4], &[0, 0, 0, 4]);
        assert_eq!(bytes[8], 0xFF);
        assert_eq!(&bytes[10..12], &[0, 2]);
        // Record 0 offset in the last two bytes.
        assert_eq!(&bytes[SIZE - 2..], &[0, 14]);
        // Key length of the first record.
        assert_eq!(&bytes[14..16], &[0, 5]);
    }

    #[test]
    fn test_decode_then_encode_reproduces_bytes() {
        let bytes = encoded_leaf();
        let node = decode_bytes(bytes.clone(), 3, false).unwrap();
        assert_eq!(node.num_records(), 2);
        assert_eq!(node.forward_link(), 4);
        assert_eq!(layout().key(node.record(1)), b"banana");

        let again = encode(node, &ctx(&BytewiseKeys)).unwrap();
        assert_eq!(again.data(), bytes.as_slice());
    }

    #[test]
    fn test_schema_swaps_key_contents() {
        let schema = NativeU32Keys;
        let mut node = Node::init(Block::new(3, vec![0; SIZE], false), NodeKind::Leaf, 1);
        let key = 0x0102_0304u32.to_ne_bytes();
        node.insert_record(0, &layout().build_leaf_record(&key, &[]));

        let raw = encode(node, &ctx(&schema)).unwrap();
        assert_eq!(&raw.data()[16..20], &[1, 2, 3, 4]);

        let node = decode(raw, &ctx(&schema), false).unwrap();
        assert_eq!(layout().key(node.record(0)), &key);
    }

    #[test]
    fn test_odd_offset_is_corruption() {
        let mut bytes = encoded_leaf();
        bytes[SIZE - 3] = 15;
        assert!(matches!(
            decode_bytes(bytes, 3, false),
            Err(NodeError::OddOffset { index: 1, .. })
        ));
    }

    #[test]
    fn test_offset_past_table_is_corruption() {
        let mut bytes = encoded_leaf();
        bytes[SIZE - 6..SIZE - 4].copy_from_slice(&510u16.to_be_bytes());
        assert!(matches!(
            decode_bytes(bytes, 3, false),
            Err(NodeError::OffsetOutOfBounds { index: 2, .. })
        ));
    }

    #[test]
    fn test_non_increasing_offsets_are_corruption() {
        let mut bytes = encoded_leaf();
        bytes[SIZE - 4..SIZE - 2].copy_from_slice(&14u16.to_be_bytes());
        assert!(matches!(
            decode_bytes(bytes, 3, false),
            Err(NodeError::OffsetsNotIncreasing { index: 1, .. })
        ));
    }

    #[test]
    fn test_link_out_of_range_is_corruption() {
        let mut bytes = encoded_leaf();
        bytes[0..4].copy_from_slice(&10u32.to_be_bytes());
        assert!(matches!(
            decode_bytes(bytes, 3, false),
            Err(NodeError::LinkOutOfRange { link: 10, .. })
        ));
    }

    #[test]
    fn test_self_link_is_corruption() {
        let mut bytes = encoded_leaf();
        bytes[4..8].copy_from_slice(&3u32.to_be_bytes());
        assert_eq!(
            decode_bytes(bytes, 3, false).unwrap_err(),
            NodeError::SelfLink { node: 3 }
        );
    }

    #[test]
    fn test_unknown_kind_is_corruption() {
        let mut bytes = encoded_leaf();
        bytes[8] = 7;
        assert!(matches!(
            decode_bytes(bytes, 3, false),
            Err(NodeError::InvalidKind { raw: 7, .. })
        ));
    }

    #[test]
    fn test_height_too_large_is_corruption() {
        let mut bytes = encoded_leaf();
        bytes[9] = 17;
        assert!(matches!(
            decode_bytes(bytes, 3, false),
            Err(NodeError::HeightTooLarge { height: 17, .. })
        ));
    }

    #[test]
    fn test_key_too_long_is_corruption() {
        let mut bytes = encoded_leaf();
        bytes[14..16].copy_from_slice(&40u16.to_be_bytes());
        assert!(matches!(
            decode_bytes(bytes, 3, false),
            Err(NodeError::KeyTooLong { len: 40, .. })
        ));
    }

    #[test]
    fn test_zeroed_node_only_with_allow_empty() {
        assert!(matches!(
            decode_bytes(vec![0; SIZE], 5, false),
            Err(NodeError::ZeroOffset { index: 0, .. })
        ));
        let node = decode_bytes(vec![0; SIZE], 5, true).unwrap();
        assert!(node.is_blank());
        assert_eq!(node.num_records(), 0);
        assert!(encode(node, &ctx(&BytewiseKeys)).is_err());
    }

    #[test]
    fn test_leaf_at_node_zero_is_corruption() {
        let bytes = encoded_leaf();
        assert!(matches!(
            decode_bytes(bytes, 0, false),
            Err(NodeError::HeaderPlacement { node: 0, .. })
        ));
    }

    #[test]
    fn test_index_child_must_be_in_range() {
        let mut node = Node::init(Block::new(3, vec![0; SIZE], false), NodeKind::Index, 2);
        node.insert_record(0, &layout().build_index_record(b"k", 12));
        let rejected = encode(node, &ctx(&BytewiseKeys)).unwrap_err();
        assert!(matches!(
            rejected.error,
            NodeError::ChildOutOfRange { child: 12, .. }
        ));
        assert_eq!(rejected.block.number(), 3);
    }

    #[test]
    fn test_header_only_decode() {
        let header = HeaderRecord {
            node_size: 4096,
            total_nodes: 9,
            ..HeaderRecord::default()
        };
        let mut bytes = vec![0u8; SIZE];
        bytes[desc::KIND] = 1;
        let mut record = header.to_host_bytes();
        header::swap_fields(&mut record, Direction::ToDisk);
        bytes[HEADER_RECORD_OFFSET..HEADER_RECORD_OFFSET + HEADER_RECORD_SIZE].copy_from_slice(&record);

        assert_eq!(decode_header_only(&bytes).unwrap(), header);

        bytes[desc::KIND] = 0xFF;
        assert!(matches!(
            decode_header_only(&bytes),
            Err(NodeError::HeaderPlacement { .. })
        ));
    }
}
