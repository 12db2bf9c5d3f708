//! HFS+-style B-tree engine.
//!
//! A tree is stored as a sequence of fixed-size nodes behind a
//! [`BlockProvider`](storage::BlockProvider). The engine validates every node
//! it reads or writes, keeps its own allocation bitmap inside the tree, and
//! announces every modification to an optional [`Journal`](storage::Journal)
//! before the node reaches storage.
//!
//! ```ignore
//! use hfs_btree::{BTree, BytewiseKeys, FormatOptions, OpenOptions};
//! use hfs_btree::storage::MemoryProvider;
//!
//! let mut tree = BTree::format(
//!     MemoryProvider::new(0),
//!     Box::new(BytewiseKeys),
//!     FormatOptions::default(),
//!     OpenOptions::default(),
//! )?;
//! tree.insert(b"key", b"value")?;
//! assert_eq!(tree.get(b"key")?, Some(b"value".to_vec()));
//! ```

#![cfg_attr(test, allow(clippy::disallowed_methods, clippy::unwrap_used, clippy::expect_used))]
// Corrupt nodes must surface as errors, never as panics.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod btree;
pub mod config;
pub mod storage;

#[cfg(test)]
mod testing;

pub use btree::{
    BTree, BTreeError, BytewiseKeys, FormatOptions, KeySchema, NodeError, OpenOptions, TreeInfo,
    VerifyOptions, VerifyReport,
};
