//! Persistent key-value storage behind a narrow table abstraction.
//!
//! [`ChainDb`] exposes point lookup, prefix scan, and atomic multi-row
//! commit over four logical tables. [`MemoryDb`] backs tests;
//! [`RocksDb`] maps each table to a RocksDB column family and commits
//! batches through an atomic [`rocksdb::WriteBatch`].

use std::collections::BTreeMap;
use std::path::Path;

use ebb_core::error::ChainError;
use parking_lot::RwLock;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};

/// Logical tables of the chain store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    /// Block hash → [`IndexEntry`](crate::entry::IndexEntry).
    Index,
    /// Txid → [`MerkleNode`](crate::entry::MerkleNode).
    TxMeta,
    /// Outpoint → [`UtxoRecord`](crate::entry::UtxoRecord).
    Utxo,
    /// Singleton rows: chain state, block file cursor.
    Meta,
}

/// All tables, in column-family order.
pub const ALL_TABLES: [Table; 4] = [Table::Index, Table::TxMeta, Table::Utxo, Table::Meta];

impl Table {
    fn name(self) -> &'static str {
        match self {
            Table::Index => "index",
            Table::TxMeta => "tx_meta",
            Table::Utxo => "utxo",
            Table::Meta => "meta",
        }
    }

    fn slot(self) -> usize {
        match self {
            Table::Index => 0,
            Table::TxMeta => 1,
            Table::Utxo => 2,
            Table::Meta => 3,
        }
    }
}

enum BatchOp {
    Put(Table, Vec<u8>, Vec<u8>),
    Delete(Table, Vec<u8>),
}

/// A set of writes committed atomically via [`ChainDb::transaction`].
#[derive(Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(table, key, value));
    }

    pub fn delete(&mut self, table: Table, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(table, key));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Transactional table storage.
///
/// Point reads may run concurrently with writes on distinct keys; a
/// batch commits atomically or not at all.
pub trait ChainDb: Send + Sync {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError>;

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), ChainError>;

    fn delete(&self, table: Table, key: &[u8]) -> Result<(), ChainError>;

    /// All rows whose key starts with `prefix`, in key order. An empty
    /// prefix scans the whole table.
    fn range_scan(&self, table: Table, prefix: &[u8])
    -> Result<Vec<(Vec<u8>, Vec<u8>)>, ChainError>;

    /// Commit a batch atomically.
    fn transaction(&self, batch: WriteBatch) -> Result<(), ChainError>;
}

/// In-memory store for tests: four `BTreeMap`s under one lock.
#[derive(Default)]
pub struct MemoryDb {
    tables: RwLock<[BTreeMap<Vec<u8>, Vec<u8>>; 4]>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainDb for MemoryDb {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError> {
        Ok(self.tables.read()[table.slot()].get(key).cloned())
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), ChainError> {
        self.tables.write()[table.slot()].insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, table: Table, key: &[u8]) -> Result<(), ChainError> {
        self.tables.write()[table.slot()].remove(key);
        Ok(())
    }

    fn range_scan(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ChainError> {
        let tables = self.tables.read();
        Ok(tables[table.slot()]
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn transaction(&self, batch: WriteBatch) -> Result<(), ChainError> {
        let mut tables = self.tables.write();
        for op in batch.ops {
            match op {
                BatchOp::Put(table, key, value) => {
                    tables[table.slot()].insert(key, value);
                }
                BatchOp::Delete(table, key) => {
                    tables[table.slot()].remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// RocksDB-backed store: one column family per table.
pub struct RocksDb {
    db: DB,
}

impl RocksDb {
    /// Open or create a database at `path`, creating all column families.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_TABLES
            .iter()
            .map(|table| ColumnFamilyDescriptor::new(table.name(), Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| ChainError::Storage(e.to_string()))?;

        Ok(Self { db })
    }

    fn cf_handle(&self, table: Table) -> Result<&rocksdb::ColumnFamily, ChainError> {
        self.db
            .cf_handle(table.name())
            .ok_or_else(|| ChainError::Storage(format!("missing column family: {}", table.name())))
    }
}

impl ChainDb for RocksDb {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError> {
        let cf = self.cf_handle(table)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| ChainError::Storage(e.to_string()))
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), ChainError> {
        let cf = self.cf_handle(table)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| ChainError::Storage(e.to_string()))
    }

    fn delete(&self, table: Table, key: &[u8]) -> Result<(), ChainError> {
        let cf = self.cf_handle(table)?;
        self.db
            .delete_cf(&cf, key)
            .map_err(|e| ChainError::Storage(e.to_string()))
    }

    fn range_scan(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ChainError> {
        let cf = self.cf_handle(table)?;
        let mode = if prefix.is_empty() {
            rocksdb::IteratorMode::Start
        } else {
            rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward)
        };

        let mut rows = Vec::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (key, value) = item.map_err(|e| ChainError::Storage(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    fn transaction(&self, batch: WriteBatch) -> Result<(), ChainError> {
        let mut wb = rocksdb::WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put(table, key, value) => {
                    wb.put_cf(self.cf_handle(table)?, key, value);
                }
                BatchOp::Delete(table, key) => {
                    wb.delete_cf(self.cf_handle(table)?, key);
                }
            }
        }
        self.db
            .write(wb)
            .map_err(|e| ChainError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(db: &dyn ChainDb) {
        db.put(Table::Index, b"a1", b"one").unwrap();
        db.put(Table::Index, b"a2", b"two").unwrap();
        db.put(Table::Index, b"b1", b"three").unwrap();
        db.put(Table::Utxo, b"a1", b"other-table").unwrap();

        assert_eq!(db.get(Table::Index, b"a1").unwrap(), Some(b"one".to_vec()));
        assert_eq!(db.get(Table::Index, b"zz").unwrap(), None);

        // Tables are isolated.
        assert_eq!(db.get(Table::Utxo, b"a1").unwrap(), Some(b"other-table".to_vec()));
        assert_eq!(db.get(Table::TxMeta, b"a1").unwrap(), None);

        // Prefix scan in key order.
        let rows = db.range_scan(Table::Index, b"a").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, b"a1");
        assert_eq!(rows[1].0, b"a2");
        assert_eq!(db.range_scan(Table::Index, b"").unwrap().len(), 3);

        db.delete(Table::Index, b"a1").unwrap();
        assert_eq!(db.get(Table::Index, b"a1").unwrap(), None);

        // Atomic batch.
        let mut batch = WriteBatch::new();
        batch.put(Table::Index, b"c1".to_vec(), b"four".to_vec());
        batch.delete(Table::Index, b"a2".to_vec());
        assert_eq!(batch.len(), 2);
        db.transaction(batch).unwrap();
        assert_eq!(db.get(Table::Index, b"c1").unwrap(), Some(b"four".to_vec()));
        assert_eq!(db.get(Table::Index, b"a2").unwrap(), None);
    }

    #[test]
    fn memory_db_semantics() {
        exercise(&MemoryDb::new());
    }

    #[test]
    fn rocks_db_semantics() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&RocksDb::open(dir.path()).unwrap());
    }

    #[test]
    fn rocks_db_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = RocksDb::open(dir.path()).unwrap();
            db.put(Table::Meta, b"state", b"value").unwrap();
        }
        let db = RocksDb::open(dir.path()).unwrap();
        assert_eq!(db.get(Table::Meta, b"state").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn empty_batch_is_noop() {
        let db = MemoryDb::new();
        let batch = WriteBatch::new();
        assert!(batch.is_empty());
        db.transaction(batch).unwrap();
    }
}
