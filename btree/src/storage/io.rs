//! Block provider abstraction.
//!
//! The B-tree never touches a file directly. Every node it reads or writes
//! goes through a `BlockProvider`, which hands out fixed-size byte buffers
//! addressed by block number and takes them back with a write policy. This
//! keeps the tree testable against an in-memory provider with fault
//! injection while production uses a plain file.
//!
//! # Contract
//!
//! - Block `n` of size `s` covers bytes `n * s .. (n + 1) * s` of the
//!   underlying storage.
//! - A block handed out by `get_block` must be handed back exactly once via
//!   `release_block`. Dropping a block is the same as a clean release.
//! - `extend_underlying_file` may grant less than requested; callers must
//!   inspect the returned size.

use crate::storage::journal::JournalError;

/// Node number within a tree. Node 0 is always the header node.
pub type NodeNumber = u32;

/// Errors that can occur during block I/O.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error from the backing file.
    Io(std::io::Error),
    /// Block lies past the end of the underlying storage.
    OutOfBounds {
        number: NodeNumber,
        block_size: usize,
        storage_bytes: u64,
    },
    /// Tried to create a backing file that already exists.
    AlreadyExists(std::path::PathBuf),
    /// Journal refused a modification.
    Journal(JournalError),
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OutOfBounds {
                number,
                block_size,
                storage_bytes,
            } => write!(
                f,
                "block {number} of size {block_size} lies outside storage of {storage_bytes} bytes"
            ),
            Self::AlreadyExists(path) => write!(f, "file already exists: {}", path.display()),
            Self::Journal(e) => write!(f, "journal error: {e}"),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Journal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<JournalError> for StorageError {
    fn from(e: JournalError) -> Self {
        Self::Journal(e)
    }
}

/// How a block should be obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// The read is speculative (through a cached hint). The caller tolerates
    /// blocks that were never initialized.
    pub hinted: bool,
    /// Hand out a zero-filled buffer without reading the backing store.
    pub fresh: bool,
}

impl GetOptions {
    /// Plain read of existing contents.
    #[must_use]
    pub const fn read() -> Self {
        Self {
            hinted: false,
            fresh: false,
        }
    }

    /// Speculative read through a hint.
    #[must_use]
    pub const fn hinted() -> Self {
        Self {
            hinted: true,
            fresh: false,
        }
    }

    /// Brand-new block whose previous contents are irrelevant.
    #[must_use]
    pub const fn fresh() -> Self {
        Self {
            hinted: false,
            fresh: true,
        }
    }
}

/// What to do with a block handed back to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOptions {
    /// Contents changed; write back at the provider's convenience.
    Dirty,
    /// Contents changed; write back before returning.
    ForceWrite,
    /// Contents are garbage and must not reach the backing store.
    Trash,
}

/// A byte buffer for one block, owned by the caller until released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    number: NodeNumber,
    data: Vec<u8>,
    from_disk: bool,
}

impl Block {
    /// Wrap a buffer for block `number`.
    #[must_use]
    pub const fn new(number: NodeNumber, data: Vec<u8>, from_disk: bool) -> Self {
        Self {
            number,
            data,
            from_disk,
        }
    }

    #[must_use]
    pub const fn number(&self) -> NodeNumber {
        self.number
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Whether the contents were read from the backing store, as opposed to
    /// handed out fresh.
    #[must_use]
    pub const fn is_from_disk(&self) -> bool {
        self.from_disk
    }

    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Source of fixed-size blocks for a tree.
pub trait BlockProvider {
    /// Obtain block `number` of `block_size` bytes.
    fn get_block(
        &mut self,
        number: NodeNumber,
        block_size: usize,
        options: GetOptions,
    ) -> Result<Block, StorageError>;

    /// Hand a block back.
    fn release_block(&mut self, block: Block, options: ReleaseOptions) -> Result<(), StorageError>;

    /// Grow the underlying storage to at least `min_bytes`.
    ///
    /// Returns the new total size in bytes, which may be smaller than
    /// `min_bytes` if the provider could only grant part of the request.
    fn extend_underlying_file(&mut self, min_bytes: u64) -> Result<u64, StorageError>;

    /// Current size of the underlying storage in bytes.
    fn size_bytes(&self) -> u64;

    /// Whether the block is pinned by an in-flight transaction and must not
    /// be rewritten behind its back.
    fn is_locked(&self, _number: NodeNumber) -> bool {
        false
    }

    /// Make every written block durable.
    fn sync(&mut self) -> Result<(), StorageError>;
}

/// Check that block `number` of `block_size` bytes fits in `storage_bytes`.
///
/// Returns the byte offset of the block on success.
pub(crate) fn block_offset(
    number: NodeNumber,
    block_size: usize,
    storage_bytes: u64,
) -> Result<u64, StorageError> {
    let size = block_size as u64;
    let offset = u64::from(number) * size;
    if offset + size > storage_bytes {
        return Err(StorageError::OutOfBounds {
            number,
            block_size,
            storage_bytes,
        });
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_offset_in_bounds() {
        assert_eq!(block_offset(0, 512, 1024).unwrap(), 0);
        assert_eq!(block_offset(1, 512, 1024).unwrap(), 512);
    }

    #[test]
    fn test_block_offset_out_of_bounds() {
        let err = block_offset(2, 512, 1024).unwrap_err();
        assert!(matches!(
            err,
            StorageError::OutOfBounds {
                number: 2,
                block_size: 512,
                storage_bytes: 1024
            }
        ));
    }

    #[test]
    fn test_get_options_constructors() {
        assert!(!GetOptions::read().hinted);
        assert!(GetOptions::hinted().hinted);
        assert!(GetOptions::fresh().fresh);
    }
}
