//! Historical block access

use std::collections::BTreeMap;

use super::{Block, BlockHeader};
use crate::storage::StorageError;
use crate::types::{Address, LogicTime};

/// Read committed blocks by owner and height
pub trait ChainReader {
    fn get_block_by_height(&self, owner: &Address, height: u64) -> Result<Option<Block>, StorageError>;

    /// Height of the owner's latest committed block (0 when none)
    fn latest_height(&self, owner: &Address) -> Result<u64, StorageError>;
}

/// Append committed blocks
pub trait ChainWriter: ChainReader {
    fn append_block(&mut self, block: Block) -> Result<(), StorageError>;

    /// Append the empty height-0 block of `owner` if it has none.
    ///
    /// Contract blocks start at height 1 afterwards, so a latest height of 0
    /// means the owner has produced nothing yet.
    fn commit_genesis(&mut self, owner: &Address, timestamp: LogicTime) -> Result<bool, StorageError> {
        if self.get_block_by_height(owner, 0)?.is_some() {
            return Ok(false);
        }
        self.append_block(Block::new(BlockHeader::new(owner.clone(), 0, timestamp, crate::crypto::Hash::zero())))?;
        Ok(true)
    }

    /// Build and append the next block of `owner` carrying `properties`
    fn commit_snapshot(
        &mut self,
        owner: &Address,
        timestamp: LogicTime,
        properties: BTreeMap<String, Vec<u8>>,
    ) -> Result<u64, StorageError> {
        let latest = self.latest_height(owner)?;
        let (height, prev_hash) = match self.get_block_by_height(owner, latest)? {
            Some(prev) => (latest + 1, prev.hash()),
            None => (0, crate::crypto::Hash::zero()),
        };
        let mut block = Block::new(BlockHeader::new(owner.clone(), height, timestamp, prev_hash));
        block.native_properties = properties;
        self.append_block(block)?;
        Ok(height)
    }
}

/// In-memory chain of blocks per owner
#[derive(Debug, Default, Clone)]
pub struct MemoryChain {
    blocks: BTreeMap<(Address, u64), Block>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainReader for MemoryChain {
    fn get_block_by_height(&self, owner: &Address, height: u64) -> Result<Option<Block>, StorageError> {
        Ok(self.blocks.get(&(owner.clone(), height)).cloned())
    }

    fn latest_height(&self, owner: &Address) -> Result<u64, StorageError> {
        Ok(self
            .blocks
            .range((owner.clone(), 0)..=(owner.clone(), u64::MAX))
            .next_back()
            .map(|((_, height), _)| *height)
            .unwrap_or(0))
    }
}

impl ChainWriter for MemoryChain {
    fn append_block(&mut self, block: Block) -> Result<(), StorageError> {
        self.blocks
            .insert((block.owner().clone(), block.height()), block);
        Ok(())
    }
}
