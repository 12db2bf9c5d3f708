//! Node store: the only path between the tree and its block provider.
//!
//! Every node read is decoded and validated before the tree sees it, and
//! every node write is encoded, validated again and handed to the journal
//! before it reaches the provider. Buffers the codec refuses are trashed so
//! their contents can never be written back.

use crate::btree::codec::{self, CodecContext};
use crate::btree::control::Limits;
use crate::btree::node::{Node, NodeBuf, NodeKind};
use crate::btree::schema::KeySchema;
use crate::btree::tree::BTreeError;
use crate::storage::io::{Block, BlockProvider, GetOptions, NodeNumber, ReleaseOptions, StorageError};
use crate::storage::journal::Journal;

/// How a node is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The node must be a valid, initialized node.
    Read,
    /// Speculative read through a hint; a blank node is tolerated.
    Hinted,
}

/// When a modified node reaches the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writeback {
    /// At the provider's convenience.
    Deferred,
    /// Before `release` returns.
    Immediate,
}

/// Node traffic counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub fresh: u64,
    pub writes: u64,
    /// Buffers refused by the codec and trashed.
    pub rejected: u64,
}

pub struct NodeStore<P: BlockProvider> {
    provider: P,
    schema: Box<dyn KeySchema>,
    journal: Option<Box<dyn Journal>>,
    stats: StoreStats,
}

impl<P: BlockProvider> NodeStore<P> {
    pub fn new(provider: P, schema: Box<dyn KeySchema>, journal: Option<Box<dyn Journal>>) -> Self {
        Self {
            provider,
            schema,
            journal,
            stats: StoreStats::default(),
        }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    pub const fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    pub fn schema(&self) -> &dyn KeySchema {
        self.schema.as_ref()
    }

    pub fn journal_mut(&mut self) -> Option<&mut (dyn Journal + 'static)> {
        self.journal.as_deref_mut()
    }

    pub const fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Whether `number` is pinned by the provider or the open transaction.
    pub fn is_locked(&self, number: NodeNumber) -> bool {
        self.provider.is_locked(number)
            || self
                .journal
                .as_ref()
                .is_some_and(|journal| journal.in_transaction(number))
    }

    /// Read raw bytes without decoding. Used for the header-only pass.
    pub fn read_raw(&mut self, number: NodeNumber, size: usize) -> Result<Block, StorageError> {
        self.stats.reads += 1;
        self.provider.get_block(number, size, GetOptions::read())
    }

    /// Read and decode a node.
    pub fn acquire(&mut self, number: NodeNumber, limits: Limits, access: Access) -> Result<Node, BTreeError> {
        let options = match access {
            Access::Read => GetOptions::read(),
            Access::Hinted => GetOptions::hinted(),
        };
        let block = self.provider.get_block(number, limits.node_size, options)?;
        self.stats.reads += 1;

        let ctx = CodecContext {
            node_size: limits.node_size,
            total_nodes: limits.total_nodes,
            layout: limits.layout,
            schema: self.schema.as_ref(),
        };
        match codec::decode(NodeBuf::from_block(block), &ctx, access == Access::Hinted) {
            Ok(node) => Ok(node),
            Err(rejected) => {
                match access {
                    Access::Read => tracing::warn!(node = number, error = %rejected.error, "corrupt node"),
                    Access::Hinted => tracing::debug!(node = number, error = %rejected.error, "unusable hinted node"),
                }
                self.stats.rejected += 1;
                self.provider.release_block(rejected.block, ReleaseOptions::Trash)?;
                Err(BTreeError::Corruption(rejected.error))
            }
        }
    }

    /// Hand out an empty node of `kind` without reading the old contents.
    ///
    /// The journal is told about the modification up front.
    pub fn acquire_fresh(
        &mut self,
        number: NodeNumber,
        limits: Limits,
        kind: NodeKind,
        height: u8,
    ) -> Result<Node, BTreeError> {
        let block = self
            .provider
            .get_block(number, limits.node_size, GetOptions::fresh())?;
        self.stats.fresh += 1;
        self.begin_modify(number)?;
        Ok(Node::init(block, kind, height))
    }

    /// Announce that `node` is about to change.
    pub fn modify(&mut self, node: &Node) -> Result<(), BTreeError> {
        self.begin_modify(node.number())?;
        Ok(())
    }

    fn begin_modify(&mut self, number: NodeNumber) -> Result<(), StorageError> {
        if let Some(journal) = self.journal.as_mut() {
            journal.modify_block_start(number)?;
        }
        Ok(())
    }

    /// Encode a modified node and write it back.
    pub fn release(&mut self, node: Node, limits: Limits, writeback: Writeback) -> Result<(), BTreeError> {
        let number = node.number();
        let ctx = CodecContext {
            node_size: limits.node_size,
            total_nodes: limits.total_nodes,
            layout: limits.layout,
            schema: self.schema.as_ref(),
        };
        let raw = match codec::encode(node, &ctx) {
            Ok(raw) => raw,
            Err(rejected) => {
                tracing::warn!(node = number, error = %rejected.error, "refusing to write corrupt node");
                self.stats.rejected += 1;
                self.provider.release_block(rejected.block, ReleaseOptions::Trash)?;
                return Err(BTreeError::Corruption(rejected.error));
            }
        };

        let block = raw.into_block();
        if let Some(journal) = self.journal.as_mut() {
            journal
                .modify_block_end(number, block.data())
                .map_err(StorageError::from)?;
        }
        let options = match writeback {
            Writeback::Deferred => ReleaseOptions::Dirty,
            Writeback::Immediate => ReleaseOptions::ForceWrite,
        };
        self.provider.release_block(block, options)?;
        self.stats.writes += 1;
        Ok(())
    }

    /// Overwrite a node with zeros and force it out.
    pub fn write_zeroed(&mut self, number: NodeNumber, node_size: usize) -> Result<(), BTreeError> {
        let mut block = self
            .provider
            .get_block(number, node_size, GetOptions::fresh())?;
        block.data_mut().fill(0);
        self.begin_modify(number)?;
        if let Some(journal) = self.journal.as_mut() {
            journal
                .modify_block_end(number, block.data())
                .map_err(StorageError::from)?;
        }
        self.provider.release_block(block, ReleaseOptions::ForceWrite)?;
        self.stats.writes += 1;
        Ok(())
    }
}
