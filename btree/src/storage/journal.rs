//! Write-ahead journal hooks.
//!
//! When a journal is attached, every node write is bracketed: the tree
//! announces its intent with `modify_block_start` before it changes any
//! byte of the buffer, and hands the finished on-disk image to
//! `modify_block_end` before the block goes back to the provider. Nodes
//! touched by the open transaction count as locked and are never zeroed
//! behind the journal's back.

use std::collections::{BTreeSet, HashSet};

use crate::storage::io::NodeNumber;

/// Errors raised by a journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalError {
    /// A block image arrived without a prior `modify_block_start`.
    NoModifyIntent(NodeNumber),
    /// Commit attempted while some blocks were announced but never finished.
    OpenBlocks(Vec<NodeNumber>),
}

impl std::fmt::Display for JournalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoModifyIntent(number) => {
                write!(f, "block {number} finished without a modify intent")
            }
            Self::OpenBlocks(numbers) => {
                write!(f, "blocks still open for modification: {numbers:?}")
            }
        }
    }
}

impl std::error::Error for JournalError {}

/// One captured block image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub number: NodeNumber,
    /// Block contents in on-disk byte order.
    pub image: Vec<u8>,
}

/// Transaction-scoped write capture.
pub trait Journal {
    /// Announce that `number` is about to be modified.
    fn modify_block_start(&mut self, number: NodeNumber) -> Result<(), JournalError>;

    /// Capture the final on-disk image of `number`.
    fn modify_block_end(&mut self, number: NodeNumber, image: &[u8]) -> Result<(), JournalError>;

    /// Whether `number` belongs to the open transaction.
    fn in_transaction(&self, number: NodeNumber) -> bool;

    /// Close the transaction and return the captured images.
    fn commit(&mut self) -> Result<Vec<JournalEntry>, JournalError>;
}

/// Journal that keeps captured images in memory.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    /// Announced but not yet finished.
    pending: HashSet<NodeNumber>,
    /// Every block the open transaction has touched.
    touched: HashSet<NodeNumber>,
    entries: Vec<JournalEntry>,
}

impl MemoryJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Images captured so far in the open transaction.
    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }
}

impl Journal for MemoryJournal {
    fn modify_block_start(&mut self, number: NodeNumber) -> Result<(), JournalError> {
        self.pending.insert(number);
        self.touched.insert(number);
        Ok(())
    }

    fn modify_block_end(&mut self, number: NodeNumber, image: &[u8]) -> Result<(), JournalError> {
        if !self.pending.remove(&number) {
            return Err(JournalError::NoModifyIntent(number));
        }
        let image = image.to_vec();
        match self.entries.iter_mut().find(|entry| entry.number == number) {
            Some(entry) => entry.image = image,
            None => self.entries.push(JournalEntry { number, image }),
        }
        Ok(())
    }

    fn in_transaction(&self, number: NodeNumber) -> bool {
        self.touched.contains(&number)
    }

    fn commit(&mut self) -> Result<Vec<JournalEntry>, JournalError> {
        if !self.pending.is_empty() {
            let open: BTreeSet<NodeNumber> = self.pending.iter().copied().collect();
            return Err(JournalError::OpenBlocks(open.into_iter().collect()));
        }
        self.touched.clear();
        Ok(std::mem::take(&mut self.entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_without_start_is_rejected() {
        let mut journal = MemoryJournal::new();
        let err = journal.modify_block_end(3, &[0; 4]).unwrap_err();
        assert_eq!(err, JournalError::NoModifyIntent(3));
    }

    #[test]
    fn test_latest_image_wins() {
        let mut journal = MemoryJournal::new();
        journal.modify_block_start(1).unwrap();
        journal.modify_block_end(1, &[1, 1]).unwrap();
        journal.modify_block_start(1).unwrap();
        journal.modify_block_end(1, &[2, 2]).unwrap();

        assert_eq!(journal.entries().len(), 1);
        assert_eq!(journal.entries()[0].image, vec![2, 2]);
    }

    #[test]
    fn test_commit_requires_finished_blocks() {
        let mut journal = MemoryJournal::new();
        journal.modify_block_start(5).unwrap();
        journal.modify_block_start(2).unwrap();
        assert_eq!(
            journal.commit().unwrap_err(),
            JournalError::OpenBlocks(vec![2, 5])
        );

        journal.modify_block_end(5, &[0]).unwrap();
        journal.modify_block_end(2, &[0]).unwrap();
        assert!(journal.in_transaction(5));

        let entries = journal.commit().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!journal.in_transaction(5));
        assert!(journal.entries().is_empty());
    }
}
