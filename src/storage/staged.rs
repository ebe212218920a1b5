//! Staged writes for one contract invocation
//!
//! A tick reads through the overlay and writes into it. `commit` applies
//! the buffered writes to the underlying store as one batch; dropping the
//! overlay discards them, which is how a failed tick leaves no trace.

use std::collections::BTreeMap;

use super::{Property, PropertyKey, PropertyStore, StorageError};
use crate::types::Address;

pub struct StagedStore<'a, S: PropertyStore + ?Sized> {
    base: &'a mut S,
    writes: BTreeMap<PropertyKey, Property>,
}

impl<'a, S: PropertyStore + ?Sized> StagedStore<'a, S> {
    pub fn new(base: &'a mut S) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Number of properties written so far
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    pub fn commit(self) -> Result<usize, StorageError> {
        let count = self.writes.len();
        if count > 0 {
            self.base.put_batch(self.writes.into_iter().collect())?;
        }
        Ok(count)
    }
}

impl<'a, S: PropertyStore + ?Sized> PropertyStore for StagedStore<'a, S> {
    fn get(&self, account: &Address, key: &str) -> Result<Option<Property>, StorageError> {
        if let Some(value) = self.writes.get(&(account.clone(), key.to_string())) {
            return Ok(Some(value.clone()));
        }
        self.base.get(account, key)
    }

    fn put(&mut self, account: &Address, key: &str, value: Property) -> Result<(), StorageError> {
        self.writes.insert((account.clone(), key.to_string()), value);
        Ok(())
    }
}
