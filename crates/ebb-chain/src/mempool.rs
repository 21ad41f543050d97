//! Staging pool for unconfirmed transactions.
//!
//! In this core the mempool exists for reorg bookkeeping: disconnecting
//! a block resurrects its ordinary transactions here, connecting a block
//! prunes them (and anything conflicting on a spent outpoint). It offers
//! O(1) lookup by txid and conflict detection via a spent-outpoint
//! index.
//!
//! Not thread-safe; the chain wraps it in its own lock.

use std::collections::HashMap;

use ebb_core::error::ChainError;
use ebb_core::types::{Hash256, OutPoint, Transaction};

#[derive(Default)]
pub struct Mempool {
    /// Primary storage: txid → transaction.
    entries: HashMap<Hash256, Transaction>,
    /// Spent outpoint → txid of the pool transaction that spends it.
    by_outpoint: HashMap<OutPoint, Hash256>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction, replacing any pool entries that conflict on
    /// a spent outpoint. Coinbase and coinstake transactions never enter
    /// the pool.
    pub fn insert(&mut self, tx: Transaction) -> Result<(), ChainError> {
        if tx.is_coinbase() || tx.is_coinstake() {
            return Ok(());
        }
        let txid = tx.txid()?;
        if self.entries.contains_key(&txid) {
            return Ok(());
        }

        for input in &tx.inputs {
            if let Some(conflicting) = self.by_outpoint.get(&input.previous_output).copied() {
                self.remove(&conflicting);
            }
        }
        for input in &tx.inputs {
            self.by_outpoint.insert(input.previous_output, txid);
        }
        self.entries.insert(txid, tx);
        Ok(())
    }

    /// Remove a transaction by txid.
    pub fn remove(&mut self, txid: &Hash256) -> Option<Transaction> {
        let tx = self.entries.remove(txid)?;
        for input in &tx.inputs {
            self.by_outpoint.remove(&input.previous_output);
        }
        Some(tx)
    }

    /// Prune a just-confirmed transaction and anything conflicting with
    /// its inputs.
    pub fn prune_confirmed(&mut self, tx: &Transaction) -> Result<(), ChainError> {
        let txid = tx.txid()?;
        self.remove(&txid);
        for input in &tx.inputs {
            if let Some(conflicting) = self.by_outpoint.get(&input.previous_output).copied() {
                self.remove(&conflicting);
            }
        }
        Ok(())
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
