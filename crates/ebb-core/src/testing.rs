//! Deterministic fixtures for tests.
//!
//! Compiled under `#[cfg(test)]` or the `testing` feature so downstream
//! test suites can build valid blocks without mining infrastructure.

use crate::block_validation::check_pow;
use crate::constants::POW_TARGET_LIMIT;
use crate::crypto::{self, KeyPair};
use crate::merkle;
use crate::script::encode_height;
use crate::types::{
    Block, BlockHeader, FINAL_SEQUENCE, Hash256, OutPoint, Transaction, TxInput, TxOutput,
};

/// A deterministic keypair derived from a single seed byte.
pub fn keypair(seed: u8) -> KeyPair {
    KeyPair::from_secret_bytes([seed; 32])
}

/// A coinbase paying `value` to `script_pubkey`, with the mandatory
/// height encoding in its unlocking script.
pub fn coinbase(height: u64, time: u64, value: u64, script_pubkey: Vec<u8>) -> Transaction {
    Transaction {
        version: 1,
        time,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            script_sig: encode_height(height),
            sequence: FINAL_SEQUENCE,
        }],
        outputs: vec![TxOutput { value, script_pubkey }],
        lock_time: 0,
    }
}

/// A zero-value coinbase for stake blocks (the coinstake carries the
/// reward).
pub fn empty_coinbase(height: u64, time: u64) -> Transaction {
    coinbase(height, time, 0, vec![0u8; 32])
}

/// An unsigned coinstake spending `stake` and paying `value` back to the
/// staker's key. Sign input 0 before use.
pub fn coinstake(stake: OutPoint, time: u64, value: u64, staker: &KeyPair) -> Transaction {
    Transaction {
        version: 1,
        time,
        inputs: vec![TxInput {
            previous_output: stake,
            script_sig: vec![],
            sequence: FINAL_SEQUENCE,
        }],
        outputs: vec![
            TxOutput { value: 0, script_pubkey: vec![] },
            TxOutput { value, script_pubkey: staker.public_key().to_bytes().to_vec() },
        ],
        lock_time: 0,
    }
}

/// Builder for structurally valid test blocks.
///
/// `build` recomputes the merkle root, then either mines a nonce (work
/// blocks) or signs the header hash with the configured staker (stake
/// blocks). Mining is only practical against generous targets; tests use
/// [`POW_TARGET_LIMIT`] or easier fractions of it.
pub struct BlockBuilder {
    prev_hash: Hash256,
    timestamp: u64,
    difficulty_target: u64,
    transactions: Vec<Transaction>,
    signer: Option<KeyPair>,
}

impl BlockBuilder {
    pub fn new(prev_hash: Hash256, timestamp: u64) -> Self {
        Self {
            prev_hash,
            timestamp,
            difficulty_target: POW_TARGET_LIMIT,
            transactions: Vec::new(),
            signer: None,
        }
    }

    pub fn target(mut self, target: u64) -> Self {
        self.difficulty_target = target;
        self
    }

    pub fn tx(mut self, tx: Transaction) -> Self {
        self.transactions.push(tx);
        self
    }

    /// Sign the block as a stake block with the given key.
    pub fn signed_by(mut self, keypair: &KeyPair) -> Self {
        self.signer = Some(keypair.clone());
        self
    }

    pub fn build(self) -> Block {
        let txids: Vec<Hash256> = self
            .transactions
            .iter()
            .map(|tx| tx.txid().expect("test transactions serialize"))
            .collect();
        let mut block = Block {
            header: BlockHeader {
                version: 1,
                prev_hash: self.prev_hash,
                merkle_root: merkle::merkle_root(&txids),
                timestamp: self.timestamp,
                difficulty_target: self.difficulty_target,
                nonce: 0,
            },
            transactions: self.transactions,
            signature: vec![],
        };
        match &self.signer {
            Some(keypair) => {
                block.signature = crypto::sign_block_hash(&block.header.hash(), keypair);
            }
            None => {
                while !check_pow(&block.header) {
                    block.header.nonce += 1;
                }
            }
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_validation::check_structural;
    use crate::constants::COIN;

    #[test]
    fn built_work_block_is_structurally_valid() {
        let block = BlockBuilder::new(Hash256([1; 32]), 1_700_000_000)
            .tx(coinbase(5, 1_700_000_000, 50 * COIN, vec![0xAA; 32]))
            .build();
        check_structural(&block).unwrap();
        assert!(!block.is_proof_of_stake());
    }

    #[test]
    fn built_stake_block_is_structurally_valid() {
        let staker = keypair(3);
        let stake = OutPoint { txid: Hash256([2; 32]), index: 0 };
        let mut cs = coinstake(stake, 1_700_000_000, 60 * COIN, &staker);
        crypto::sign_transaction_input(&mut cs, 0, &staker).unwrap();
        let block = BlockBuilder::new(Hash256([1; 32]), 1_700_000_000)
            .tx(empty_coinbase(5, 1_700_000_000))
            .tx(cs)
            .signed_by(&staker)
            .build();
        check_structural(&block).unwrap();
        assert!(block.is_proof_of_stake());
        assert_eq!(block.stake_outpoint(), Some(stake));
    }
}
