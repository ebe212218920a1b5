//! Database persistence layer using Sled
//!
//! Holds contract properties and the committed block snapshots the election
//! reads by height.

use sled::{Batch, Db, Tree};
use std::path::Path;

use super::{Property, PropertyKey, PropertyStore, StorageError};
use crate::chain::{Block, ChainReader, ChainWriter};
use crate::types::Address;

/// Database wrapper
#[derive(Debug, Clone)]
pub struct PropertyDb {
    db: Db,
    properties_tree: Tree,
    blocks_tree: Tree,
    heights_tree: Tree,
}

const KEY_SEPARATOR: u8 = 0;

fn property_key(account: &Address, key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(account.as_str().len() + key.len() + 1);
    out.extend_from_slice(account.as_str().as_bytes());
    out.push(KEY_SEPARATOR);
    out.extend_from_slice(key.as_bytes());
    out
}

fn block_key(owner: &Address, height: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(owner.as_str().len() + 9);
    out.extend_from_slice(owner.as_str().as_bytes());
    out.push(KEY_SEPARATOR);
    // big-endian so a prefix scan walks heights in order
    out.extend_from_slice(&height.to_be_bytes());
    out
}

impl PropertyDb {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let properties_tree = db.open_tree("properties")?;
        let blocks_tree = db.open_tree("blocks")?;
        let heights_tree = db.open_tree("heights")?;

        Ok(Self {
            db,
            properties_tree,
            blocks_tree,
            heights_tree,
        })
    }

    /// Whether any contract property has been written
    pub fn is_fresh(&self) -> bool {
        self.properties_tree.is_empty()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl PropertyStore for PropertyDb {
    fn get(&self, account: &Address, key: &str) -> Result<Option<Property>, StorageError> {
        match self.properties_tree.get(property_key(account, key))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, account: &Address, key: &str, value: Property) -> Result<(), StorageError> {
        let bytes = bincode::serialize(&value)?;
        self.properties_tree.insert(property_key(account, key), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    fn put_batch(&mut self, writes: Vec<(PropertyKey, Property)>) -> Result<(), StorageError> {
        let mut batch = Batch::default();
        for ((account, key), value) in writes {
            batch.insert(property_key(&account, &key), bincode::serialize(&value)?);
        }
        self.properties_tree.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }
}

impl ChainReader for PropertyDb {
    fn get_block_by_height(&self, owner: &Address, height: u64) -> Result<Option<Block>, StorageError> {
        match self.blocks_tree.get(block_key(owner, height))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn latest_height(&self, owner: &Address) -> Result<u64, StorageError> {
        match self.heights_tree.get(owner.as_str().as_bytes())? {
            Some(bytes) if bytes.len() == 8 => {
                let mut h = [0u8; 8];
                h.copy_from_slice(&bytes);
                Ok(u64::from_le_bytes(h))
            }
            _ => Ok(0),
        }
    }
}

impl ChainWriter for PropertyDb {
    fn append_block(&mut self, block: Block) -> Result<(), StorageError> {
        let key = block_key(block.owner(), block.height());
        let value = bincode::serialize(&block)?;
        self.blocks_tree.insert(key, value)?;
        self.heights_tree.insert(
            block.owner().as_str().as_bytes(),
            block.height().to_le_bytes().as_ref(),
        )?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{load_prop, save_prop, StagedStore};
    use std::collections::BTreeMap;

    #[test]
    fn test_properties_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let account = Address::from("sys.test");
        {
            let mut db = PropertyDb::open(dir.path()).unwrap();
            assert!(db.is_fresh());
            save_prop(&mut db, &account, "numbers", &vec![1u64, 2, 3]).unwrap();
        }
        let db = PropertyDb::open(dir.path()).unwrap();
        let numbers: Vec<u64> = load_prop(&db, &account, "numbers").unwrap();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(!db.is_fresh());
    }

    #[test]
    fn test_staged_commit_is_batched() {
        let dir = tempfile::tempdir().unwrap();
        let account = Address::from("sys.test");
        let mut db = PropertyDb::open(dir.path()).unwrap();

        let mut staged = StagedStore::new(&mut db);
        staged.string_set(&account, "a", vec![1]).unwrap();
        staged.string_set(&account, "b", vec![2]).unwrap();
        staged.commit().unwrap();

        assert_eq!(db.string_get(&account, "a").unwrap(), Some(vec![1]));
        assert_eq!(db.string_get(&account, "b").unwrap(), Some(vec![2]));
    }

    #[test]
    fn test_block_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let owner = Address::from("sys.rec.standby_pool");
        let mut db = PropertyDb::open(dir.path()).unwrap();

        let mut props = BTreeMap::new();
        props.insert("standbys".to_string(), vec![4, 2]);
        let h0 = db.commit_snapshot(&owner, 10, props.clone()).unwrap();
        let h1 = db.commit_snapshot(&owner, 11, props).unwrap();
        assert_eq!((h0, h1), (0, 1));
        assert_eq!(db.latest_height(&owner).unwrap(), 1);

        let block = db.get_block_by_height(&owner, 1).unwrap().unwrap();
        assert_eq!(block.native_string_get("standbys"), Some(&[4u8, 2][..]));
        assert!(db.get_block_by_height(&owner, 2).unwrap().is_none());
    }
}
