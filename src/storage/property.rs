//! Contract property store
//!
//! Every contract account owns named properties. A property is either a
//! string (opaque bytes) or a map of string fields to bytes. Typed values are
//! framed with bincode.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::Address;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Db(#[from] sled::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("Property {key} of {account} already exists")]
    PropertyExists { account: Address, key: String },
    #[error("Property {key} of {account} does not exist")]
    PropertyMissing { account: Address, key: String },
    #[error("Property {key} of {account} has the wrong kind")]
    WrongPropertyKind { account: Address, key: String },
    #[error("Property {key} of {account} holds a malformed value")]
    MalformedValue { account: Address, key: String },
    #[error("Block {height} of {owner} not found")]
    BlockMissing { owner: Address, height: u64 },
}

/// A single named property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Property {
    String(Vec<u8>),
    Map(BTreeMap<String, Vec<u8>>),
}

/// Key of a property: owning account and property name
pub type PropertyKey = (Address, String);

/// Per-account named property storage.
///
/// Implementors provide raw `get`/`put`; the string and map operations are
/// layered on top of them.
pub trait PropertyStore {
    fn get(&self, account: &Address, key: &str) -> Result<Option<Property>, StorageError>;

    fn put(&mut self, account: &Address, key: &str, value: Property) -> Result<(), StorageError>;

    /// Apply several writes; stores with native batching override this so the
    /// batch lands atomically.
    fn put_batch(&mut self, writes: Vec<(PropertyKey, Property)>) -> Result<(), StorageError> {
        for ((account, key), value) in writes {
            self.put(&account, &key, value)?;
        }
        Ok(())
    }

    fn exists(&self, account: &Address, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(account, key)?.is_some())
    }

    /// Create an empty string property; fails if the property already exists
    fn string_create(&mut self, account: &Address, key: &str) -> Result<(), StorageError> {
        if self.exists(account, key)? {
            return Err(StorageError::PropertyExists {
                account: account.clone(),
                key: key.to_string(),
            });
        }
        self.put(account, key, Property::String(Vec::new()))
    }

    fn string_get(&self, account: &Address, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.get(account, key)? {
            Some(Property::String(bytes)) => Ok(Some(bytes)),
            Some(Property::Map(_)) => Err(wrong_kind(account, key)),
            None => Ok(None),
        }
    }

    fn string_set(&mut self, account: &Address, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        if let Some(Property::Map(_)) = self.get(account, key)? {
            return Err(wrong_kind(account, key));
        }
        self.put(account, key, Property::String(value))
    }

    /// Create an empty map property; fails if the property already exists
    fn map_create(&mut self, account: &Address, key: &str) -> Result<(), StorageError> {
        if self.exists(account, key)? {
            return Err(StorageError::PropertyExists {
                account: account.clone(),
                key: key.to_string(),
            });
        }
        self.put(account, key, Property::Map(BTreeMap::new()))
    }

    fn map_get(&self, account: &Address, key: &str, field: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.map_copy(account, key)?.remove(field))
    }

    fn map_set(&mut self, account: &Address, key: &str, field: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let mut map = match self.get(account, key)? {
            Some(Property::Map(map)) => map,
            Some(Property::String(_)) => return Err(wrong_kind(account, key)),
            None => {
                return Err(StorageError::PropertyMissing {
                    account: account.clone(),
                    key: key.to_string(),
                })
            }
        };
        map.insert(field.to_string(), value);
        self.put(account, key, Property::Map(map))
    }

    /// Copy of the whole map; a missing property reads as empty
    fn map_copy(&self, account: &Address, key: &str) -> Result<BTreeMap<String, Vec<u8>>, StorageError> {
        match self.get(account, key)? {
            Some(Property::Map(map)) => Ok(map),
            Some(Property::String(_)) => Err(wrong_kind(account, key)),
            None => Ok(BTreeMap::new()),
        }
    }
}

fn wrong_kind(account: &Address, key: &str) -> StorageError {
    StorageError::WrongPropertyKind {
        account: account.clone(),
        key: key.to_string(),
    }
}

/// Decode a typed string property; missing or empty reads as `T::default()`
pub fn load_prop<T, S>(store: &S, account: &Address, key: &str) -> Result<T, StorageError>
where
    T: DeserializeOwned + Default,
    S: PropertyStore + ?Sized,
{
    match store.string_get(account, key)? {
        Some(bytes) if !bytes.is_empty() => Ok(bincode::deserialize(&bytes)?),
        _ => Ok(T::default()),
    }
}

/// Encode a typed value into a string property
pub fn save_prop<T, S>(store: &mut S, account: &Address, key: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize,
    S: PropertyStore + ?Sized,
{
    let bytes = bincode::serialize(value)?;
    store.string_set(account, key, bytes)
}

/// In-memory property store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    properties: BTreeMap<PropertyKey, Property>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl PropertyStore for MemoryStore {
    fn get(&self, account: &Address, key: &str) -> Result<Option<Property>, StorageError> {
        Ok(self.properties.get(&(account.clone(), key.to_string())).cloned())
    }

    fn put(&mut self, account: &Address, key: &str, value: Property) -> Result<(), StorageError> {
        self.properties.insert((account.clone(), key.to_string()), value);
        Ok(())
    }
}
