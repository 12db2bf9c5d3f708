//! Block storage layer.
//!
//! - `io`: the `BlockProvider` contract and storage errors
//! - `file`: provider over a plain file
//! - `memory`: in-memory provider with fault injection
//! - `journal`: modify-start/modify-end hooks for write-ahead journaling

pub mod file;
pub mod io;
pub mod journal;
pub mod memory;

pub use file::FileProvider;
pub use io::{Block, BlockProvider, GetOptions, NodeNumber, ReleaseOptions, StorageError};
pub use journal::{Journal, JournalEntry, JournalError, MemoryJournal};
pub use memory::{FaultConfig, MemoryProvider, MemoryProviderStats};
