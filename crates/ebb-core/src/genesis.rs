//! Genesis block definition for the Ebb network.
//!
//! The genesis block is the first block in the chain (height 0): a single
//! zero-value coinbase under the proof-of-work target limit, timestamped
//! before the protocol switch so it scores under the legacy trust rules.
//!
//! All values are hardcoded and deterministic; every node computes the
//! identical genesis block.

use std::sync::LazyLock;

use crate::constants::POW_TARGET_LIMIT;
use crate::merkle;
use crate::script::encode_height;
use crate::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput};

/// Genesis block timestamp: September 1, 2020 00:00:00 UTC.
pub const GENESIS_TIMESTAMP: u64 = 1_598_918_400;

/// Message embedded in the genesis coinbase, after the height encoding.
pub const GENESIS_MESSAGE: &[u8] = b"Tides turn and the ebb carries value out. Ebb genesis 2020.";

/// Cached genesis data, computed once on first access.
struct GenesisData {
    block: Block,
    hash: Hash256,
    coinbase_txid: Hash256,
}

static GENESIS: LazyLock<GenesisData> = LazyLock::new(build_genesis);

/// Build the genesis block and cache derived values.
fn build_genesis() -> GenesisData {
    let coinbase = build_genesis_coinbase();
    // Hardcoded coinbase; serialization cannot fail.
    let coinbase_txid = coinbase
        .txid()
        .expect("genesis coinbase is hardcoded valid data");
    let mr = merkle::merkle_root(&[coinbase_txid]);

    let block = Block {
        header: BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root: mr,
            timestamp: GENESIS_TIMESTAMP,
            difficulty_target: POW_TARGET_LIMIT,
            nonce: 79,
        },
        transactions: vec![coinbase],
        signature: vec![],
    };
    let hash = block.header.hash();

    GenesisData {
        block,
        hash,
        coinbase_txid,
    }
}

/// Build the genesis coinbase transaction.
///
/// The unlocking script carries the canonical height-0 encoding followed
/// by the genesis message; the single output is unspendable (zero value,
/// empty-script sentinel is avoided by paying to an all-zero key).
fn build_genesis_coinbase() -> Transaction {
    let mut script_sig = encode_height(0);
    script_sig.extend_from_slice(GENESIS_MESSAGE);
    Transaction {
        version: 1,
        time: GENESIS_TIMESTAMP,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            script_sig,
            sequence: crate::types::FINAL_SEQUENCE,
        }],
        outputs: vec![TxOutput {
            value: 0,
            script_pubkey: vec![0u8; 32],
        }],
        lock_time: 0,
    }
}

/// The genesis block (height 0).
pub fn genesis_block() -> &'static Block {
    &GENESIS.block
}

/// The genesis block header hash.
pub fn genesis_hash() -> Hash256 {
    GENESIS.hash
}

/// The transaction ID of the genesis coinbase.
pub fn genesis_coinbase_txid() -> Hash256 {
    GENESIS.coinbase_txid
}

/// Check whether a block is the genesis block by comparing header hashes.
pub fn is_genesis(block: &Block) -> bool {
    block.header.hash() == GENESIS.hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_validation;
    use crate::constants::PROTOCOL_SWITCH_TIME;
    use crate::script::script_starts_with_height;

    // --- Constants ---

    #[test]
    fn genesis_timestamp_predates_protocol_switch() {
        assert!(GENESIS_TIMESTAMP < PROTOCOL_SWITCH_TIME);
    }

    #[test]
    fn genesis_message_not_empty() {
        assert!(!GENESIS_MESSAGE.is_empty());
        assert!(GENESIS_MESSAGE.starts_with(b"Tides"));
    }

    // --- Block structure ---

    #[test]
    fn genesis_block_deterministic() {
        assert_eq!(genesis_block(), genesis_block());
    }

    #[test]
    fn genesis_is_work_block_with_one_coinbase() {
        let block = genesis_block();
        assert_eq!(block.transactions.len(), 1);
        assert!(block.transactions[0].is_coinbase());
        assert!(!block.is_proof_of_stake());
        assert!(block.signature.is_empty());
    }

    #[test]
    fn genesis_passes_structural_validation() {
        block_validation::check_structural(genesis_block()).unwrap();
    }

    #[test]
    fn genesis_coinbase_encodes_height_zero() {
        let script = &genesis_block().transactions[0].inputs[0].script_sig;
        assert!(script_starts_with_height(script, 0));
        assert!(script[2..].starts_with(b"Tides"));
    }

    #[test]
    fn genesis_coinbase_is_unspendable() {
        let coinbase = &genesis_block().transactions[0];
        assert_eq!(coinbase.outputs.len(), 1);
        assert_eq!(coinbase.outputs[0].value, 0);
    }

    // --- Header ---

    #[test]
    fn genesis_header_prev_hash_zero() {
        assert!(genesis_block().header.prev_hash.is_zero());
    }

    #[test]
    fn genesis_header_timestamp() {
        assert_eq!(genesis_block().header.timestamp, GENESIS_TIMESTAMP);
        assert_eq!(genesis_block().transactions[0].time, GENESIS_TIMESTAMP);
    }

    #[test]
    fn genesis_header_target_is_limit() {
        assert_eq!(genesis_block().header.difficulty_target, POW_TARGET_LIMIT);
    }

    #[test]
    fn genesis_satisfies_its_own_target() {
        assert!(block_validation::check_pow(&genesis_block().header));
    }

    // --- Merkle root ---

    #[test]
    fn genesis_merkle_root_correct() {
        let block = genesis_block();
        let txid = block.transactions[0].txid().unwrap();
        assert_eq!(block.header.merkle_root, merkle::merkle_root(&[txid]));
    }

    // --- Hash and txid ---

    #[test]
    fn genesis_hash_matches_header() {
        assert_eq!(genesis_hash(), genesis_block().header.hash());
        assert!(!genesis_hash().is_zero());
    }

    #[test]
    fn genesis_coinbase_txid_matches_computation() {
        let txid = genesis_block().transactions[0].txid().unwrap();
        assert_eq!(genesis_coinbase_txid(), txid);
    }

    // --- is_genesis ---

    #[test]
    fn is_genesis_true_for_genesis() {
        assert!(is_genesis(genesis_block()));
    }

    #[test]
    fn is_genesis_false_for_modified_genesis() {
        let mut modified = genesis_block().clone();
        modified.header.nonce += 1;
        assert!(!is_genesis(&modified));
    }
}
