//! Committed blocks as seen by the election engine
//!
//! A block carries its owner account, height, logical timestamp and a
//! snapshot of the owner's native properties at that height. Beacon timer
//! blocks carry no properties; their height is the on-chain timer round.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::{hash_bytes, Hash};
use crate::types::{Address, LogicTime};

/// Block header containing all metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Account that owns this block chain
    pub owner: Address,
    /// Height in the owner's chain
    pub height: u64,
    /// Logical time the block was produced
    pub timestamp: LogicTime,
    /// Hash of the previous block of the same owner
    pub prev_hash: Hash,
    /// Slot of the leader that certified the block
    pub leader_slot: u16,
    /// Full-unit blocks carry the whole account state
    pub full_unit: bool,
}

impl BlockHeader {
    pub fn new(owner: Address, height: u64, timestamp: LogicTime, prev_hash: Hash) -> Self {
        Self {
            owner,
            height,
            timestamp,
            prev_hash,
            leader_slot: 0,
            full_unit: false,
        }
    }

    /// Serialize the header for hashing
    pub fn to_bytes(&self) -> Vec<u8> {
        let owner = self.owner.as_str().as_bytes();
        let mut bytes = Vec::with_capacity(owner.len() + 8 + 8 + 32 + 2 + 1 + 8);
        bytes.extend_from_slice(&(owner.len() as u64).to_le_bytes());
        bytes.extend_from_slice(owner);
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.prev_hash.0);
        bytes.extend_from_slice(&self.leader_slot.to_le_bytes());
        bytes.push(self.full_unit as u8);
        bytes
    }

    pub fn hash(&self) -> Hash {
        hash_bytes(&self.to_bytes())
    }
}

/// A committed block with the owner's native property snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// Native string properties at this height
    pub native_properties: BTreeMap<String, Vec<u8>>,
}

impl Block {
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            native_properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: Vec<u8>) -> Self {
        self.native_properties.insert(key.to_string(), value);
        self
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn owner(&self) -> &Address {
        &self.header.owner
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn timestamp(&self) -> LogicTime {
        self.header.timestamp
    }

    /// Native string property at this height
    pub fn native_string_get(&self, key: &str) -> Option<&[u8]> {
        self.native_properties.get(key).map(Vec::as_slice)
    }

    /// Check if this is the first block of its owner
    pub fn is_genesis(&self) -> bool {
        self.header.prev_hash == Hash::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_hash_covers_height() {
        let a = BlockHeader::new(Address::from("sys.a"), 1, 10, Hash::zero());
        let b = BlockHeader::new(Address::from("sys.a"), 2, 10, Hash::zero());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_native_property_lookup() {
        let block = Block::new(BlockHeader::new(Address::from("sys.a"), 0, 0, Hash::zero()))
            .with_property("standbys", vec![1, 2, 3]);
        assert_eq!(block.native_string_get("standbys"), Some(&[1u8, 2, 3][..]));
        assert_eq!(block.native_string_get("missing"), None);
        assert!(block.is_genesis());
    }
}
