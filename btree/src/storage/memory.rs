//! In-memory block provider for deterministic testing.
//!
//! Storage is a single growable byte vector. The provider supports:
//! - Read and write fault injection driven by a seeded RNG
//! - Bit-flip corruption of returned buffers (storage itself stays intact)
//! - A single write failure after a chosen number of successful writes
//! - Grant limits and rounding on extension, to exercise partial grants
//! - Locked blocks, to model nodes pinned by an in-flight transaction

// Simulation code legitimately needs cloning for test data
#![allow(clippy::disallowed_methods)]

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::io::{
    Block, BlockProvider, GetOptions, NodeNumber, ReleaseOptions, StorageError, block_offset,
};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability that a read returns a corrupted copy (0.0 - 1.0).
    pub corruption_rate: f64,
}

impl FaultConfig {
    /// No faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.001,
            write_error_rate: 0.001,
            corruption_rate: 0.001,
        }
    }
}

/// Statistics about provider operations.
#[derive(Debug, Default, Clone)]
pub struct MemoryProviderStats {
    /// Blocks read from storage.
    pub reads: u64,
    /// Blocks handed out fresh.
    pub fresh_blocks: u64,
    /// Dirty releases.
    pub deferred_writes: u64,
    /// Force-write releases.
    pub forced_writes: u64,
    /// Trashed releases.
    pub trashed: u64,
    /// Calls to `extend_underlying_file` that grew storage.
    pub extends: u64,
    pub injected_read_errors: u64,
    pub injected_write_errors: u64,
    pub corrupted_reads: u64,
}

/// Block provider backed by a `Vec<u8>`.
pub struct MemoryProvider {
    bytes: Vec<u8>,
    /// Extension never grows storage beyond this many bytes.
    grant_limit: Option<u64>,
    /// Extension rounds the request up to a multiple of this.
    grant_granularity: u64,
    locked: HashSet<NodeNumber>,
    fault_config: FaultConfig,
    /// Writes that still succeed before the next one fails.
    writes_before_failure: Option<u64>,
    rng: StdRng,
    stats: MemoryProviderStats,
}

impl MemoryProvider {
    /// Empty storage with no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, FaultConfig::default())
    }

    /// Empty storage with custom fault configuration.
    #[must_use]
    pub fn with_config(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            bytes: Vec::new(),
            grant_limit: None,
            grant_granularity: 1,
            locked: HashSet::new(),
            fault_config,
            writes_before_failure: None,
            rng: StdRng::seed_from_u64(seed),
            stats: MemoryProviderStats::default(),
        }
    }

    /// Storage preloaded with `bytes`.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mut provider = Self::new(0);
        provider.bytes = bytes;
        provider
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Raw access for tests that damage storage on purpose.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    #[must_use]
    pub const fn stats(&self) -> &MemoryProviderStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = MemoryProviderStats::default();
    }

    pub fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    /// Let `writes` more writes through, fail the one after, then recover.
    /// Trashed releases are not writes.
    pub const fn fail_write_after(&mut self, writes: u64) {
        self.writes_before_failure = Some(writes);
    }

    /// Cap the storage size that extension can reach.
    pub const fn set_grant_limit(&mut self, limit: Option<u64>) {
        self.grant_limit = limit;
    }

    /// Round every extension up to a multiple of `granularity` bytes.
    pub fn set_grant_granularity(&mut self, granularity: u64) {
        self.grant_granularity = granularity.max(1);
    }

    pub fn lock(&mut self, number: NodeNumber) {
        self.locked.insert(number);
    }

    pub fn unlock(&mut self, number: NodeNumber) {
        self.locked.remove(&number);
    }

    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }

    /// Flip 1-8 random bits.
    fn corrupt(&mut self, data: &mut [u8]) {
        if data.is_empty() {
            return;
        }
        let num_flips = self.rng.random_range(1..=8);
        for _ in 0..num_flips {
            let byte_offset = self.rng.random_range(0..data.len());
            let bit = self.rng.random_range(0..8u8);
            data[byte_offset] ^= 1 << bit;
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn byte_range(&self, number: NodeNumber, block_size: usize) -> Result<std::ops::Range<usize>, StorageError> {
        // block_offset guarantees the range lies inside `bytes`, so it fits in usize.
        let start = block_offset(number, block_size, self.size_bytes())? as usize;
        Ok(start..start + block_size)
    }
}

impl BlockProvider for MemoryProvider {
    fn get_block(
        &mut self,
        number: NodeNumber,
        block_size: usize,
        options: GetOptions,
    ) -> Result<Block, StorageError> {
        let range = self.byte_range(number, block_size)?;

        if options.fresh {
            self.stats.fresh_blocks += 1;
            return Ok(Block::new(number, vec![0; block_size], false));
        }

        self.stats.reads += 1;
        if self.should_inject_fault(self.fault_config.read_error_rate) {
            self.stats.injected_read_errors += 1;
            return Err(StorageError::InjectedFault(format!(
                "simulated read error on block {number}"
            )));
        }

        let mut data = self.bytes[range].to_vec();
        if self.should_inject_fault(self.fault_config.corruption_rate) {
            self.stats.corrupted_reads += 1;
            self.corrupt(&mut data);
        }
        Ok(Block::new(number, data, true))
    }

    fn release_block(&mut self, block: Block, options: ReleaseOptions) -> Result<(), StorageError> {
        match options {
            ReleaseOptions::Trash => {
                self.stats.trashed += 1;
                return Ok(());
            }
            ReleaseOptions::Dirty => self.stats.deferred_writes += 1,
            ReleaseOptions::ForceWrite => self.stats.forced_writes += 1,
        }

        match self.writes_before_failure {
            Some(0) => {
                self.writes_before_failure = None;
                self.stats.injected_write_errors += 1;
                return Err(StorageError::InjectedFault(format!(
                    "scheduled write error on block {}",
                    block.number()
                )));
            }
            Some(n) => self.writes_before_failure = Some(n - 1),
            None => {}
        }
        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            return Err(StorageError::InjectedFault(format!(
                "simulated write error on block {}",
                block.number()
            )));
        }

        let range = self.byte_range(block.number(), block.data().len())?;
        self.bytes[range].copy_from_slice(block.data());
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn extend_underlying_file(&mut self, min_bytes: u64) -> Result<u64, StorageError> {
        let current = self.size_bytes();
        if min_bytes <= current {
            return Ok(current);
        }
        let mut target = min_bytes.div_ceil(self.grant_granularity) * self.grant_granularity;
        if let Some(limit) = self.grant_limit {
            target = target.min(limit);
        }
        if target > current {
            self.bytes.resize(target as usize, 0);
            self.stats.extends += 1;
        }
        Ok(self.size_bytes())
    }

    fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn is_locked(&self, number: NodeNumber) -> bool {
        self.locked.contains(&number)
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_provider_write_then_read() {
        let mut provider = MemoryProvider::new(1);
        provider.extend_underlying_file(1024).unwrap();

        let mut block = provider.get_block(1, 512, GetOptions::fresh()).unwrap();
        assert!(!block.is_from_disk());
        block.data_mut()[0] = 0xAB;
        provider
            .release_block(block, ReleaseOptions::ForceWrite)
            .unwrap();

        let block = provider.get_block(1, 512, GetOptions::read()).unwrap();
        assert!(block.is_from_disk());
        assert_eq!(block.data()[0], 0xAB);
        assert_eq!(provider.as_bytes()[512], 0xAB);
    }

    #[test]
    fn test_trashed_block_never_reaches_storage() {
        let mut provider = MemoryProvider::new(1);
        provider.extend_underlying_file(512).unwrap();

        let mut block = provider.get_block(0, 512, GetOptions::read()).unwrap();
        block.data_mut().fill(0xFF);
        provider.release_block(block, ReleaseOptions::Trash).unwrap();

        assert!(provider.as_bytes().iter().all(|&b| b == 0));
        assert_eq!(provider.stats().trashed, 1);
    }

    #[test]
    fn test_out_of_bounds_read() {
        let mut provider = MemoryProvider::new(1);
        provider.extend_underlying_file(512).unwrap();
        let err = provider.get_block(1, 512, GetOptions::read()).unwrap_err();
        assert!(matches!(err, StorageError::OutOfBounds { number: 1, .. }));
    }

    #[test]
    fn test_extension_limit_grants_partially() {
        let mut provider = MemoryProvider::new(1);
        provider.set_grant_limit(Some(3000));
        assert_eq!(provider.extend_underlying_file(8192).unwrap(), 3000);
        assert_eq!(provider.extend_underlying_file(100).unwrap(), 3000);
    }

    #[test]
    fn test_extension_rounds_to_granularity() {
        let mut provider = MemoryProvider::new(1);
        provider.set_grant_granularity(3000);
        assert_eq!(provider.extend_underlying_file(1024).unwrap(), 3000);
        assert_eq!(provider.extend_underlying_file(3001).unwrap(), 6000);
    }

    #[test]
    fn test_scheduled_write_failure_fires_once() {
        let mut provider = MemoryProvider::new(1);
        provider.extend_underlying_file(1024).unwrap();
        provider.fail_write_after(1);

        let write = |provider: &mut MemoryProvider, byte: u8| {
            let mut block = provider.get_block(1, 512, GetOptions::fresh()).unwrap();
            block.data_mut()[0] = byte;
            provider.release_block(block, ReleaseOptions::ForceWrite)
        };
        write(&mut provider, 1).unwrap();
        let err = write(&mut provider, 2).unwrap_err();
        assert!(matches!(err, StorageError::InjectedFault(_)));
        assert_eq!(provider.as_bytes()[512], 1);
        write(&mut provider, 3).unwrap();
        assert_eq!(provider.as_bytes()[512], 3);
        assert_eq!(provider.stats().injected_write_errors, 1);
    }

    #[test]
    fn test_read_fault_injection() {
        let config = FaultConfig {
            read_error_rate: 1.0,
            ..FaultConfig::default()
        };
        let mut provider = MemoryProvider::with_config(7, config);
        provider.extend_underlying_file(512).unwrap();

        let err = provider.get_block(0, 512, GetOptions::read()).unwrap_err();
        assert!(matches!(err, StorageError::InjectedFault(_)));
        assert_eq!(provider.stats().injected_read_errors, 1);

        // Fresh blocks skip the read path entirely.
        assert!(provider.get_block(0, 512, GetOptions::fresh()).is_ok());
    }

    #[test]
    fn test_corruption_leaves_storage_intact() {
        let config = FaultConfig {
            corruption_rate: 1.0,
            ..FaultConfig::default()
        };
        let mut provider = MemoryProvider::with_config(42, config);
        provider.extend_underlying_file(512).unwrap();

        let _block = provider.get_block(0, 512, GetOptions::read()).unwrap();
        assert_eq!(provider.stats().corrupted_reads, 1);
        assert!(provider.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_locked_blocks() {
        let mut provider = MemoryProvider::new(1);
        provider.lock(4);
        assert!(provider.is_locked(4));
        provider.unlock(4);
        assert!(!provider.is_locked(4));
    }
}
