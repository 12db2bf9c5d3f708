//! File-backed block provider.
//!
//! Reads and writes go straight to the file at `block * size` offsets.
//! Deferred writes are written immediately as well; durability is only
//! guaranteed after a forced write or an explicit `sync`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::storage::io::{
    Block, BlockProvider, GetOptions, NodeNumber, ReleaseOptions, StorageError, block_offset,
};

/// A tree file handle.
pub struct FileProvider {
    file: File,
    size: u64,
}

impl FileProvider {
    /// Create a new, empty tree file.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        if path.exists() {
            return Err(StorageError::AlreadyExists(path.to_path_buf()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self { file, size: 0 })
    }

    /// Open an existing tree file.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        tracing::debug!(path = %path.display(), size, "opened tree file");
        Ok(Self { file, size })
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }
}

impl BlockProvider for FileProvider {
    fn get_block(
        &mut self,
        number: NodeNumber,
        block_size: usize,
        options: GetOptions,
    ) -> Result<Block, StorageError> {
        let offset = block_offset(number, block_size, self.size)?;
        let mut data = vec![0u8; block_size];
        if options.fresh {
            return Ok(Block::new(number, data, false));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut data)?;
        Ok(Block::new(number, data, true))
    }

    fn release_block(&mut self, block: Block, options: ReleaseOptions) -> Result<(), StorageError> {
        let offset = block_offset(block.number(), block.data().len(), self.size)?;
        match options {
            ReleaseOptions::Trash => Ok(()),
            ReleaseOptions::Dirty => self.write_at(offset, block.data()),
            ReleaseOptions::ForceWrite => {
                self.write_at(offset, block.data())?;
                self.file.sync_data()?;
                Ok(())
            }
        }
    }

    fn extend_underlying_file(&mut self, min_bytes: u64) -> Result<u64, StorageError> {
        if min_bytes > self.size {
            self.file.set_len(min_bytes)?;
            self.size = min_bytes;
            tracing::debug!(size = self.size, "extended tree file");
        }
        Ok(self.size)
    }

    fn size_bytes(&self) -> u64 {
        self.size
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }
}
