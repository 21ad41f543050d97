//! UTXO bookkeeping: connecting and disconnecting blocks.
//!
//! Connection re-runs the structural and contextual block checks, then
//! every consensus rule that needs the spent outputs in hand: input
//! existence, double spends, maturity, timestamp ordering, value
//! conservation, reward ceilings, and script verification through the
//! [`ScriptOracle`]. All row changes are staged into one [`WriteBatch`]
//! and committed atomically, so a rejected block leaves the store
//! untouched.
//!
//! Spent outputs are marked, not deleted: disconnection clears the mark
//! and drops the rows the block created.

use std::collections::HashMap;
use std::sync::Arc;

use ebb_core::block_validation::{check_contextual, check_structural_with};
use ebb_core::constants::{
    COINBASE_MATURITY, MAX_BLOCK_SIGOPS, MAX_MONEY, MIN_TX_FEE,
};
use ebb_core::error::{ChainError, ConsensusError, ContextualError};
use ebb_core::reward::{cent_seconds, coin_days, pow_reward, stake_reward};
use ebb_core::script::{SCRIPT_VERIFY_P2SH, ScriptOracle};
use ebb_core::types::{Block, Hash256, OutPoint, Transaction, TxKind};
use tracing::debug;

use crate::entry::{MerkleNode, UtxoRecord};
use crate::store::{ChainDb, Table, WriteBatch};

/// Totals produced by connecting a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connected {
    /// Coins minted: outputs minus inputs plus fees.
    pub mint: u64,
    /// Net change to the money supply (outputs minus inputs).
    pub supply_delta: i128,
    /// Fees paid by the block's ordinary transactions.
    pub fees: u64,
}

/// Totals produced by checking one transaction's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConnectedInputs {
    value_in: u64,
    /// Fee paid by an ordinary transaction; zero for a coinstake.
    fee: u64,
}

/// Storage key for a UTXO row: txid followed by the output index.
pub fn utxo_key(outpoint: &OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(outpoint.txid.as_bytes());
    key.extend_from_slice(&outpoint.index.to_le_bytes());
    key
}

fn encode<T: bincode::Encode>(value: &T, what: &str) -> Result<Vec<u8>, ChainError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ChainError::Storage(format!("{what} encode: {e}")))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8], what: &str) -> Result<T, ChainError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ChainError::Storage(format!("{what} decode: {e}")))?;
    Ok(value)
}

/// The UTXO ledger over a [`ChainDb`].
pub struct Ledger {
    db: Arc<dyn ChainDb>,
    oracle: Arc<dyn ScriptOracle>,
    checkpoints: &'static [(u64, [u8; 32])],
}

impl Ledger {
    pub fn new(
        db: Arc<dyn ChainDb>,
        oracle: Arc<dyn ScriptOracle>,
        checkpoints: &'static [(u64, [u8; 32])],
    ) -> Self {
        Self { db, oracle, checkpoints }
    }

    /// Look up a UTXO row.
    pub fn utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoRecord>, ChainError> {
        match self.db.get(Table::Utxo, &utxo_key(outpoint))? {
            Some(bytes) => Ok(Some(decode(&bytes, "utxo record")?)),
            None => Ok(None),
        }
    }

    /// Look up the merkle node recorded for a confirmed transaction.
    pub fn tx_meta(&self, txid: &Hash256) -> Result<Option<MerkleNode>, ChainError> {
        match self.db.get(Table::TxMeta, txid.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes, "merkle node")?)),
            None => Ok(None),
        }
    }

    /// All unspent outputs of a transaction, in index order.
    pub fn unspent_outputs(
        &self,
        txid: &Hash256,
    ) -> Result<Vec<(OutPoint, UtxoRecord)>, ChainError> {
        let mut outputs = Vec::new();
        for (key, value) in self.db.range_scan(Table::Utxo, txid.as_bytes())? {
            let record: UtxoRecord = decode(&value, "utxo record")?;
            if record.spent {
                continue;
            }
            let index_bytes: [u8; 8] = key
                .get(32..40)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(|| ChainError::Storage("malformed utxo key".into()))?;
            let index = u64::from_le_bytes(index_bytes);
            outputs.push((OutPoint { txid: *txid, index }, record));
        }
        Ok(outputs)
    }

    fn utxo_with_overlay(
        &self,
        overlay: &HashMap<OutPoint, UtxoRecord>,
        outpoint: &OutPoint,
    ) -> Result<Option<UtxoRecord>, ChainError> {
        if let Some(record) = overlay.get(outpoint) {
            return Ok(Some(record.clone()));
        }
        self.utxo(outpoint)
    }

    /// Resolve a transaction's inputs, consulting `overlay` for outputs
    /// created earlier in the same block. A missing row is fatal, as is
    /// a row already marked spent.
    fn fetch_inputs(
        &self,
        tx: &Transaction,
        overlay: &HashMap<OutPoint, UtxoRecord>,
    ) -> Result<Vec<(OutPoint, UtxoRecord)>, ChainError> {
        let mut records = Vec::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            let outpoint = input.previous_output;
            let record = self
                .utxo_with_overlay(overlay, &outpoint)?
                .ok_or_else(|| ConsensusError::MissingInput(outpoint.to_string()))?;
            if record.spent {
                return Err(ConsensusError::DoubleSpend(outpoint.to_string()).into());
            }
            records.push((outpoint, record));
        }
        Ok(records)
    }

    /// Check a non-coinbase transaction against its fetched inputs.
    ///
    /// Two passes: maturity, timestamp ordering, and value accumulation
    /// first; then pay-to-script-hash sigop accounting and script
    /// verification per input. Reward policy runs between them: a
    /// coinstake may claim up to its coin-age reward plus the minimum
    /// fee, an ordinary transaction must cover its outputs and pays the
    /// difference as fee.
    fn connect_inputs(
        &self,
        tx: &Transaction,
        txid: &Hash256,
        records: &[(OutPoint, UtxoRecord)],
        value_out: u64,
        height: u64,
        script_flags: u32,
        sigops: &mut u32,
    ) -> Result<ConnectedInputs, ChainError> {
        let mut value_in: u64 = 0;
        for (outpoint, record) in records {
            if record.kind.requires_maturity() {
                let depth = height.saturating_sub(record.height);
                if depth < COINBASE_MATURITY {
                    return Err(ConsensusError::ImmatureSpend {
                        kind: record.kind.label(),
                        outpoint: outpoint.to_string(),
                        depth,
                        required: COINBASE_MATURITY,
                    }
                    .into());
                }
            }
            if record.tx_time > tx.time {
                return Err(ConsensusError::TimestampOrder(outpoint.to_string()).into());
            }
            value_in = value_in
                .checked_add(record.value)
                .ok_or(ConsensusError::MoneyRange)?;
        }
        if value_in > MAX_MONEY {
            return Err(ConsensusError::MoneyRange.into());
        }

        let mut fee: u64 = 0;
        if tx.is_coinstake() {
            let mut accumulated: u128 = 0;
            for (_, record) in records {
                accumulated += cent_seconds(record.value, record.tx_time, tx.time);
            }
            let allowed = stake_reward(coin_days(accumulated)).saturating_add(MIN_TX_FEE);
            let claimed = value_out.saturating_sub(value_in);
            if claimed > allowed {
                return Err(ConsensusError::RewardOverrun { claimed, allowed }.into());
            }
        } else {
            if value_in < value_out {
                return Err(ConsensusError::InsufficientInputs {
                    have: value_in,
                    need: value_out,
                }
                .into());
            }
            fee = value_in - value_out;
        }

        for (i, (_, record)) in records.iter().enumerate() {
            if self.oracle.is_pay_to_script_hash(&record.script_pubkey) {
                *sigops = sigops.saturating_add(
                    self.oracle
                        .sig_op_count(&tx.inputs[i].script_sig, SCRIPT_VERIFY_P2SH),
                );
            }
            if !self.oracle.verify(
                &tx.inputs[i].script_sig,
                &record.script_pubkey,
                tx,
                i,
                script_flags,
            ) {
                return Err(ConsensusError::ScriptFailure {
                    txid: txid.to_string(),
                    index: i,
                }
                .into());
            }
        }

        Ok(ConnectedInputs { value_in, fee })
    }

    /// Connect a block's transactions against the UTXO set.
    ///
    /// `height` is the block's own height and `parent_time` the parent's
    /// timestamp; `script_flags` selects optional script verification
    /// behavior. The structural and contextual checks run again before
    /// anything is staged, so a block replayed from disk is held to the
    /// same rules as a fresh arrival. On success every spent input is
    /// marked, every new output recorded, and a merkle node written per
    /// transaction, all in one atomic commit. With `dry_run` the full
    /// check runs but nothing is committed, and the detached block
    /// signature is not re-verified.
    pub fn connect_block(
        &self,
        block: &Block,
        height: u64,
        parent_time: u64,
        script_flags: u32,
        dry_run: bool,
    ) -> Result<Connected, ChainError> {
        check_structural_with(block, !dry_run)?;
        check_contextual(block, parent_time, height, self.checkpoints, self.oracle.as_ref())?;

        let block_hash = block.header.hash();
        let mut batch = WriteBatch::new();
        let mut overlay: HashMap<OutPoint, UtxoRecord> = HashMap::new();

        let mut fees: u64 = 0;
        let mut block_value_in: u128 = 0;
        let mut block_value_out: u128 = 0;
        let mut sigops: u32 = 0;

        // Transactions start after the serialized header and the list
        // length prefix.
        let header_len = encode(&block.header, "block header")?.len();
        let count_len = encode(&(block.transactions.len() as u64), "tx count")?.len();
        let mut offset = (header_len + count_len) as u64;

        for tx in &block.transactions {
            let txid = tx.txid()?;
            let tx_size = encode(tx, "transaction")?.len() as u64;

            for input in &tx.inputs {
                sigops = sigops.saturating_add(self.oracle.sig_op_count(&input.script_sig, 0));
            }
            for output in &tx.outputs {
                sigops =
                    sigops.saturating_add(self.oracle.sig_op_count(&output.script_pubkey, 0));
            }

            // A txid whose outputs are still unspent must not be replayed;
            // the old rows would become unreachable.
            for index in 0..tx.outputs.len() as u64 {
                if let Some(existing) =
                    self.utxo_with_overlay(&overlay, &OutPoint { txid, index })?
                {
                    if !existing.spent {
                        return Err(ConsensusError::UnspentCollision(txid.to_string()).into());
                    }
                }
            }

            let value_out = tx
                .total_output_value()
                .ok_or(ConsensusError::MoneyRange)?;
            block_value_out += value_out as u128;

            if !tx.is_coinbase() {
                let records = self.fetch_inputs(tx, &overlay)?;
                let inputs = self.connect_inputs(
                    tx,
                    &txid,
                    &records,
                    value_out,
                    height,
                    script_flags,
                    &mut sigops,
                )?;
                block_value_in += inputs.value_in as u128;
                fees = fees
                    .checked_add(inputs.fee)
                    .ok_or(ConsensusError::MoneyRange)?;

                for (outpoint, mut record) in records {
                    record.spent = true;
                    batch.put(Table::Utxo, utxo_key(&outpoint), encode(&record, "utxo record")?);
                    overlay.insert(outpoint, record);
                }
            }

            if sigops > MAX_BLOCK_SIGOPS {
                return Err(ContextualError::TooManySigOps {
                    count: sigops,
                    max: MAX_BLOCK_SIGOPS,
                }
                .into());
            }

            for (i, output) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint { txid, index: i as u64 };
                let record = UtxoRecord {
                    value: output.value,
                    script_pubkey: output.script_pubkey.clone(),
                    spent: false,
                    kind: tx.kind(),
                    height,
                    tx_time: tx.time,
                };
                batch.put(Table::Utxo, utxo_key(&outpoint), encode(&record, "utxo record")?);
                overlay.insert(outpoint, record);
            }

            let node = MerkleNode { block_hash, offset, size: tx_size, kind: tx.kind() };
            batch.put(Table::TxMeta, txid.as_bytes().to_vec(), encode(&node, "merkle node")?);
            offset += tx_size;
        }

        // Work blocks mint through the coinbase alone, capped by the
        // difficulty-scaled subsidy plus the fees the block collects.
        if !block.is_proof_of_stake() {
            let claimed = block.transactions[0]
                .total_output_value()
                .ok_or(ConsensusError::MoneyRange)?;
            let allowed = pow_reward(block.header.difficulty_target).saturating_add(fees);
            if claimed > allowed {
                return Err(ConsensusError::RewardOverrun { claimed, allowed }.into());
            }
        }

        let supply_delta = block_value_out as i128 - block_value_in as i128;
        let mint = (supply_delta + fees as i128).max(0) as u64;

        if !dry_run {
            self.db.transaction(batch)?;
            debug!(
                block = %block_hash,
                height,
                txs = block.transactions.len(),
                mint,
                fees,
                "connected block"
            );
        }
        Ok(Connected { mint, supply_delta, fees })
    }

    /// Disconnect a block, reversing [`connect_block`].
    ///
    /// Returns the block's ordinary transactions so the caller can offer
    /// them back to the mempool.
    pub fn disconnect_block(&self, block: &Block) -> Result<Vec<Transaction>, ChainError> {
        let mut batch = WriteBatch::new();
        let mut resurrected = Vec::new();

        for tx in block.transactions.iter().rev() {
            let txid = tx.txid()?;

            for index in 0..tx.outputs.len() as u64 {
                batch.delete(Table::Utxo, utxo_key(&OutPoint { txid, index }));
            }

            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let outpoint = input.previous_output;
                    let mut record = self
                        .utxo(&outpoint)?
                        .ok_or_else(|| ConsensusError::MissingInput(outpoint.to_string()))?;
                    record.spent = false;
                    batch.put(Table::Utxo, utxo_key(&outpoint), encode(&record, "utxo record")?);
                }
            }

            batch.delete(Table::TxMeta, txid.as_bytes().to_vec());

            if tx.kind() == TxKind::Ordinary {
                resurrected.push(tx.clone());
            }
        }

        debug!(block = %block.header.hash(), txs = block.transactions.len(), "disconnected block");
        self.db.transaction(batch)?;
        Ok(resurrected)
    }
}
