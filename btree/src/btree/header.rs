//! Header node contents.
//!
//! Node 0 is the header node. It carries exactly three records:
//!
//! | Record | Offset | Size              | Contents                     |
//! |--------|--------|-------------------|------------------------------|
//! | 0      | 14     | 106               | header record (tree summary) |
//! | 1      | 120    | 128               | user data, opaque            |
//! | 2      | 248    | `node_size - 256` | first allocation-map segment |
//!
//! Header record layout, all fields big-endian on disk:
//!
//! | Offset | Size | Field              |
//! |--------|------|--------------------|
//! | 0      | 2    | tree depth         |
//! | 2      | 4    | root node          |
//! | 6      | 4    | leaf records       |
//! | 10     | 4    | first leaf         |
//! | 14     | 4    | last leaf          |
//! | 18     | 2    | node size          |
//! | 20     | 2    | max key length     |
//! | 22     | 4    | total nodes        |
//! | 26     | 4    | free nodes         |
//! | 30     | 2    | reserved           |
//! | 32     | 4    | clump size         |
//! | 36     | 1    | tree type          |
//! | 37     | 1    | key compare type   |
//! | 38     | 4    | attributes         |
//! | 42     | 64   | reserved (16 u32s) |

use crate::btree::endian::{Direction, host_u16, host_u32, set_host_u16, set_host_u32, swap_u16, swap_u32};
use crate::btree::node::{MAX_TREE_DEPTH, is_valid_node_size};
use crate::btree::record::{RecordLayout, max_inline};
use crate::storage::io::NodeNumber;

/// Offset of the header record within node 0.
pub const HEADER_RECORD_OFFSET: usize = 14;
/// Size of the header record.
pub const HEADER_RECORD_SIZE: usize = 106;
/// Size of the user-data record.
pub const USER_DATA_SIZE: usize = 128;
/// Offset of the header's allocation-map record.
pub const HEADER_MAP_OFFSET: usize = 248;

/// Record indices within the header node.
pub const HEADER_RECORD_INDEX: usize = 0;
pub const USER_DATA_INDEX: usize = 1;
pub const HEADER_MAP_INDEX: usize = 2;

/// Size of the allocation-map record carried by the header node.
#[must_use]
pub const fn header_map_size(node_size: usize) -> usize {
    node_size - 256
}

mod field {
    pub const DEPTH: usize = 0;
    pub const ROOT: usize = 2;
    pub const LEAF_RECORDS: usize = 6;
    pub const FIRST_LEAF: usize = 10;
    pub const LAST_LEAF: usize = 14;
    pub const NODE_SIZE: usize = 18;
    pub const MAX_KEY_LENGTH: usize = 20;
    pub const TOTAL_NODES: usize = 22;
    pub const FREE_NODES: usize = 26;
    pub const RESERVED1: usize = 30;
    pub const CLUMP_SIZE: usize = 32;
    pub const TREE_TYPE: usize = 36;
    pub const KEY_COMPARE_TYPE: usize = 37;
    pub const ATTRIBUTES: usize = 38;
    pub const RESERVED3: usize = 42;
    pub const RESERVED3_WORDS: usize = 16;
}

/// Multi-byte fields that need swapping, as (offset, width).
const SWAPPED_FIELDS: [(usize, usize); 12] = [
    (field::DEPTH, 2),
    (field::ROOT, 4),
    (field::LEAF_RECORDS, 4),
    (field::FIRST_LEAF, 4),
    (field::LAST_LEAF, 4),
    (field::NODE_SIZE, 2),
    (field::MAX_KEY_LENGTH, 2),
    (field::TOTAL_NODES, 4),
    (field::FREE_NODES, 4),
    (field::RESERVED1, 2),
    (field::CLUMP_SIZE, 4),
    (field::ATTRIBUTES, 4),
];

/// Tree attribute bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TreeAttributes(u32);

impl TreeAttributes {
    /// The tree was not closed cleanly.
    pub const BAD_CLOSE: Self = Self(0x1);
    /// Key lengths are 16-bit instead of 8-bit.
    pub const BIG_KEYS: Self = Self(0x2);
    /// Index keys take their natural length instead of `max_key_length`.
    pub const VARIABLE_INDEX_KEYS: Self = Self(0x4);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for TreeAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Parsed header record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderRecord {
    pub tree_depth: u16,
    pub root_node: NodeNumber,
    pub leaf_records: u32,
    pub first_leaf: NodeNumber,
    pub last_leaf: NodeNumber,
    pub node_size: u16,
    pub max_key_length: u16,
    pub total_nodes: u32,
    pub free_nodes: u32,
    pub reserved1: u16,
    pub clump_size: u32,
    pub btree_type: u8,
    pub key_compare_type: u8,
    pub attributes: TreeAttributes,
    pub reserved3: [u32; field::RESERVED3_WORDS],
}

impl HeaderRecord {
    /// Parse a header record already converted to host order.
    #[must_use]
    pub fn from_host(record: &[u8]) -> Self {
        Self::read_with(record, host_u16, host_u32)
    }

    /// Parse a header record straight from on-disk bytes, without touching
    /// the rest of the node.
    #[must_use]
    pub fn from_disk(record: &[u8]) -> Self {
        Self::read_with(
            record,
            |data, at| u16::from_be_bytes([data[at], data[at + 1]]),
            |data, at| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]),
        )
    }

    fn read_with(
        record: &[u8],
        u16_at: fn(&[u8], usize) -> u16,
        u32_at: fn(&[u8], usize) -> u32,
    ) -> Self {
        let mut reserved3 = [0u32; field::RESERVED3_WORDS];
        for (i, word) in reserved3.iter_mut().enumerate() {
            *word = u32_at(record, field::RESERVED3 + 4 * i);
        }
        Self {
            tree_depth: u16_at(record, field::DEPTH),
            root_node: u32_at(record, field::ROOT),
            leaf_records: u32_at(record, field::LEAF_RECORDS),
            first_leaf: u32_at(record, field::FIRST_LEAF),
            last_leaf: u32_at(record, field::LAST_LEAF),
            node_size: u16_at(record, field::NODE_SIZE),
            max_key_length: u16_at(record, field::MAX_KEY_LENGTH),
            total_nodes: u32_at(record, field::TOTAL_NODES),
            free_nodes: u32_at(record, field::FREE_NODES),
            reserved1: u16_at(record, field::RESERVED1),
            clump_size: u32_at(record, field::CLUMP_SIZE),
            btree_type: record[field::TREE_TYPE],
            key_compare_type: record[field::KEY_COMPARE_TYPE],
            attributes: TreeAttributes::from_bits(u32_at(record, field::ATTRIBUTES)),
            reserved3,
        }
    }

    /// Serialize into a host-order record buffer.
    pub fn write_host(&self, record: &mut [u8]) {
        set_host_u16(record, field::DEPTH, self.tree_depth);
        set_host_u32(record, field::ROOT, self.root_node);
        set_host_u32(record, field::LEAF_RECORDS, self.leaf_records);
        set_host_u32(record, field::FIRST_LEAF, self.first_leaf);
        set_host_u32(record, field::LAST_LEAF, self.last_leaf);
        set_host_u16(record, field::NODE_SIZE, self.node_size);
        set_host_u16(record, field::MAX_KEY_LENGTH, self.max_key_length);
        set_host_u32(record, field::TOTAL_NODES, self.total_nodes);
        set_host_u32(record, field::FREE_NODES, self.free_nodes);
        set_host_u16(record, field::RESERVED1, self.reserved1);
        set_host_u32(record, field::CLUMP_SIZE, self.clump_size);
        record[field::TREE_TYPE] = self.btree_type;
        record[field::KEY_COMPARE_TYPE] = self.key_compare_type;
        set_host_u32(record, field::ATTRIBUTES, self.attributes.bits());
        for (i, word) in self.reserved3.iter().enumerate() {
            set_host_u32(record, field::RESERVED3 + 4 * i, *word);
        }
    }

    /// Serialize into a fresh host-order record.
    #[must_use]
    pub fn to_host_bytes(&self) -> Vec<u8> {
        let mut record = vec![0u8; HEADER_RECORD_SIZE];
        self.write_host(&mut record);
        record
    }

    /// Record layout implied by the attributes and maximum key length.
    #[must_use]
    pub const fn layout(&self) -> RecordLayout {
        RecordLayout::new(self.attributes, self.max_key_length)
    }

    /// Sanity-check the header against the storage that holds the tree.
    pub fn verify(&self, storage_bytes: u64) -> Result<(), HeaderError> {
        let node_size = usize::from(self.node_size);
        if !is_valid_node_size(node_size) {
            return Err(HeaderError::NodeSize(node_size));
        }
        check_key_length(self.layout(), node_size)?;
        if self.free_nodes >= self.total_nodes {
            return Err(HeaderError::FreeNodes {
                free_nodes: self.free_nodes,
                total_nodes: self.total_nodes,
            });
        }
        for (name, node) in [
            ("root", self.root_node),
            ("first leaf", self.first_leaf),
            ("last leaf", self.last_leaf),
        ] {
            if node >= self.total_nodes {
                return Err(HeaderError::NodeOutOfRange {
                    field: name,
                    node,
                    total_nodes: self.total_nodes,
                });
            }
        }
        if self.tree_depth > u16::from(MAX_TREE_DEPTH) {
            return Err(HeaderError::Depth(self.tree_depth));
        }
        let declared = u64::from(self.total_nodes) * u64::from(self.node_size);
        if declared > storage_bytes {
            return Err(HeaderError::StorageTooSmall {
                declared_bytes: declared,
                storage_bytes,
            });
        }
        Ok(())
    }
}

/// The largest key must fit an index record in half a node, and 8-bit key
/// lengths cap it at 255.
pub fn check_key_length(layout: RecordLayout, node_size: usize) -> Result<(), HeaderError> {
    let max_key_length = layout.max_key_length();
    let too_long = max_key_length == 0
        || (!layout.big_keys() && max_key_length > u16::from(u8::MAX))
        || layout.size_of(usize::from(max_key_length), 4) > max_inline(node_size);
    if too_long {
        return Err(HeaderError::MaxKeyLength {
            max_key_length,
            node_size,
        });
    }
    Ok(())
}

/// Convert every multi-byte header field in place.
pub(crate) fn swap_fields(record: &mut [u8], direction: Direction) {
    for (offset, width) in SWAPPED_FIELDS {
        if width == 2 {
            swap_u16(record, offset, direction);
        } else {
            swap_u32(record, offset, direction);
        }
    }
    for i in 0..field::RESERVED3_WORDS {
        swap_u32(record, field::RESERVED3 + 4 * i, direction);
    }
}

/// Reasons a header record cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Node size is not a power of two in 512..=32768.
    NodeSize(usize),
    /// Free count must be strictly less than the total.
    FreeNodes { free_nodes: u32, total_nodes: u32 },
    /// A node reference lies past the end of the tree.
    NodeOutOfRange {
        field: &'static str,
        node: NodeNumber,
        total_nodes: u32,
    },
    /// Depth exceeds the maximum tree height.
    Depth(u16),
    /// The tree claims more bytes than the storage holds.
    StorageTooSmall {
        declared_bytes: u64,
        storage_bytes: u64,
    },
    /// Maximum key length is zero or too large for the node size.
    MaxKeyLength { max_key_length: u16, node_size: usize },
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeSize(size) => write!(f, "invalid node size {size}"),
            Self::FreeNodes {
                free_nodes,
                total_nodes,
            } => write!(f, "free nodes {free_nodes} not below total nodes {total_nodes}"),
            Self::NodeOutOfRange {
                field,
                node,
                total_nodes,
            } => write!(f, "{field} node {node} out of range (total nodes: {total_nodes})"),
            Self::Depth(depth) => write!(f, "tree depth {depth} exceeds {MAX_TREE_DEPTH}"),
            Self::StorageTooSmall {
                declared_bytes,
                storage_bytes,
            } => write!(
                f,
                "tree declares {declared_bytes} bytes but storage holds {storage_bytes}"
            ),
            Self::MaxKeyLength {
                max_key_length,
                node_size,
            } => write!(
                f,
                "max key length {max_key_length} invalid for node size {node_size}"
            ),
        }
    }
}

impl std::error::Error for HeaderError {}
