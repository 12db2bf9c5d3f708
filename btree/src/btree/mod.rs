//! On-disk B-tree engine.
//!
//! # File Format
//!
//! The tree lives in fixed-size nodes numbered from 0, all big-endian on
//! disk:
//!
//! - Node 0: header node (header record, user data record, first map record)
//! - Map nodes: further allocation bitmap, chained from the header's forward link
//! - Index and leaf nodes: the tree itself, siblings linked on every level
//!
//! Nodes pass through the codec on every read and write, so the rest of the
//! engine only sees validated, host-order nodes.

pub mod allocator;
pub mod codec;
pub mod control;
pub mod cursor;
pub mod endian;
pub mod header;
pub mod node;
pub mod record;
pub mod schema;
pub mod search;
pub mod store;
pub mod tree;
pub mod verify;

pub use allocator::{AllocationMap, calc_map_bits};
pub use codec::NodeError;
pub use control::{Hint, TreeStats};
pub use cursor::Cursor;
pub use endian::Direction;
pub use header::{HeaderError, HeaderRecord, TreeAttributes};
pub use node::{Node, NodeKind};
pub use record::{RecordLayout, max_inline};
pub use schema::{BytewiseKeys, KeySchema};
pub use search::SearchResult;
pub use store::StoreStats;
pub use tree::{BTree, BTreeError, FormatOptions, OpenOptions, TreeInfo};
pub use verify::{Problem, VerifyOptions, VerifyReport};
