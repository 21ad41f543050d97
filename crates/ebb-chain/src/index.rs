//! The block index: every accepted block's entry, keyed by hash.
//!
//! An in-memory map hydrated from the index table at open. Mutations
//! persist before touching the map, so a failed write never leaves
//! memory ahead of the store.

use std::collections::HashMap;
use std::sync::Arc;

use ebb_core::error::ChainError;
use ebb_core::types::Hash256;

use crate::entry::IndexEntry;
use crate::store::{ChainDb, Table};

fn encode_entry(entry: &IndexEntry) -> Result<Vec<u8>, ChainError> {
    bincode::encode_to_vec(entry, bincode::config::standard())
        .map_err(|e| ChainError::Storage(format!("index entry encode: {e}")))
}

pub struct BlockIndex {
    entries: HashMap<Hash256, IndexEntry>,
    db: Arc<dyn ChainDb>,
}

impl BlockIndex {
    /// Hydrate the index from the store.
    pub fn open(db: Arc<dyn ChainDb>) -> Result<Self, ChainError> {
        let mut entries = HashMap::new();
        for (_, value) in db.range_scan(Table::Index, &[])? {
            let (entry, _): (IndexEntry, _) =
                bincode::decode_from_slice(&value, bincode::config::standard())
                    .map_err(|e| ChainError::Storage(format!("index entry decode: {e}")))?;
            entries.insert(entry.hash, entry);
        }
        Ok(Self { entries, db })
    }

    /// Insert a new entry, persisting it first. Fails on a duplicate hash.
    pub fn insert(&mut self, entry: IndexEntry) -> Result<(), ChainError> {
        if self.entries.contains_key(&entry.hash) {
            return Err(ChainError::DuplicateBlock(entry.hash.to_string()));
        }
        self.db
            .put(Table::Index, entry.hash.as_bytes(), &encode_entry(&entry)?)?;
        self.entries.insert(entry.hash, entry);
        Ok(())
    }

    /// Persist a mutated entry (next link, stake/trust fields), then
    /// update the map.
    pub fn update(&mut self, entry: IndexEntry) -> Result<(), ChainError> {
        if !self.entries.contains_key(&entry.hash) {
            return Err(ChainError::UnknownBlock(entry.hash.to_string()));
        }
        self.db
            .put(Table::Index, entry.hash.as_bytes(), &encode_entry(&entry)?)?;
        self.entries.insert(entry.hash, entry);
        Ok(())
    }

    /// Look up an entry. The zero hash has no entry by definition
    /// (genesis's non-existent parent).
    pub fn get(&self, hash: &Hash256) -> Option<&IndexEntry> {
        if hash.is_zero() {
            return None;
        }
        self.entries.get(hash)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        !hash.is_zero() && self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
