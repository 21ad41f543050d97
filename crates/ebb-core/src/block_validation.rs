//! Block-level validation.
//!
//! Two levels, mirroring the transaction checks:
//!
//! - **Structural** ([`check_structural`]): context-free checks on block
//!   format, merkle commitment, proof-of-work, and the detached stake-block
//!   signature. Safe to run on blocks whose parent is still unknown.
//! - **Contextual** ([`check_contextual`]): checks that need the parent
//!   entry and the block's height: timestamp drift, transaction finality,
//!   checkpoint pins, coinbase height encoding, and the sigop ceiling.
//!
//! UTXO-dependent consensus rules (double spends, scripts, rewards) run
//! during block connection, not here.

use crate::constants::{
    MAX_BLOCK_SIGOPS, MAX_BLOCK_SIZE, MAX_FORWARD_DRIFT, POW_TARGET_LIMIT,
};
use crate::crypto;
use crate::error::{ContextualError, StructuralError};
use crate::merkle;
use crate::script::{SCRIPT_VERIFY_NONE, ScriptOracle, script_starts_with_height};
use crate::types::{Block, BlockHeader, Hash256};
use crate::validation::validate_transaction_structure;

/// Check a work block's header against its difficulty target.
///
/// The first 8 bytes of the header hash, read little-endian, must not
/// exceed the target, and the target itself must not be easier than
/// [`POW_TARGET_LIMIT`].
pub fn check_pow(header: &BlockHeader) -> bool {
    header.difficulty_target <= POW_TARGET_LIMIT
        && header.hash().low_u64() <= header.difficulty_target
}

/// Validate block structure (context-free).
///
/// - Non-empty, within the size limit
/// - First transaction is the only coinbase; a coinstake may appear only
///   at position 1
/// - Every transaction passes structural validation and is timestamped at
///   or before the block
/// - Merkle root commits to the transaction list
/// - Work blocks satisfy proof-of-work and carry no signature
/// - Stake blocks carry a detached signature verifying against the public
///   key in the coinstake's second output, and the coinstake timestamp
///   matches the block's
pub fn check_structural(block: &Block) -> Result<(), StructuralError> {
    check_structural_with(block, true)
}

/// [`check_structural`] with signature verification optional.
///
/// With `verify_signatures` false the stake-block signature must still be
/// present but is not cryptographically checked; every other rule runs.
/// Used when re-checking a block that already passed the full check.
pub fn check_structural_with(
    block: &Block,
    verify_signatures: bool,
) -> Result<(), StructuralError> {
    if block.transactions.is_empty() {
        return Err(StructuralError::EmptyBlock);
    }

    let encoded = bincode::encode_to_vec(block, bincode::config::standard())
        .map_err(|e| StructuralError::Serialization(e.to_string()))?;
    if encoded.len() > MAX_BLOCK_SIZE {
        return Err(StructuralError::OversizedBlock {
            size: encoded.len(),
            max: MAX_BLOCK_SIZE,
        });
    }

    if !block.transactions[0].is_coinbase() {
        return Err(StructuralError::FirstTxNotCoinbase);
    }

    for (i, tx) in block.transactions.iter().enumerate() {
        if i > 0 && tx.is_coinbase() {
            return Err(StructuralError::MultipleCoinbase);
        }
        if i > 1 && tx.is_coinstake() {
            return Err(StructuralError::MisplacedCoinstake(i));
        }
        if tx.time > block.header.timestamp {
            return Err(StructuralError::TxTimeAfterBlock { index: i });
        }
        validate_transaction_structure(tx)
            .map_err(|source| StructuralError::Transaction { index: i, source })?;
    }

    let mut txids = Vec::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        let txid = tx
            .txid()
            .map_err(|e| StructuralError::Serialization(e.to_string()))?;
        txids.push(txid);
    }
    if merkle::merkle_root(&txids) != block.header.merkle_root {
        return Err(StructuralError::InvalidMerkleRoot);
    }

    if let Some(coinstake) = block.coinstake() {
        if coinstake.time != block.header.timestamp {
            return Err(StructuralError::CoinstakeTimeMismatch);
        }
        if block.signature.is_empty() {
            return Err(StructuralError::MissingSignature);
        }
        if verify_signatures {
            // The signer is whoever owns the coinstake's reward output.
            let signer_script = &coinstake.outputs[1].script_pubkey;
            crypto::verify_block_signature(&block.header.hash(), &block.signature, signer_script)
                .map_err(|_| StructuralError::BadBlockSignature)?;
        }
    } else {
        if !block.signature.is_empty() {
            return Err(StructuralError::UnexpectedSignature);
        }
        if !check_pow(&block.header) {
            return Err(StructuralError::InvalidPoW);
        }
    }

    Ok(())
}

/// Validate a block against its chain context.
///
/// `parent_time` and `height` come from the parent index entry;
/// `checkpoints` is the pinned (height, hash) table.
pub fn check_contextual(
    block: &Block,
    parent_time: u64,
    height: u64,
    checkpoints: &[(u64, [u8; 32])],
    oracle: &dyn ScriptOracle,
) -> Result<(), ContextualError> {
    if block.header.timestamp > parent_time + MAX_FORWARD_DRIFT {
        return Err(ContextualError::TimestampTooFarAhead {
            timestamp: block.header.timestamp,
            parent: parent_time,
            max_drift: MAX_FORWARD_DRIFT,
        });
    }

    for (i, tx) in block.transactions.iter().enumerate() {
        if !tx.is_final(height, block.header.timestamp) {
            return Err(ContextualError::NonFinalTransaction(i));
        }
    }

    if let Some((_, expected)) = checkpoints.iter().find(|(h, _)| *h == height) {
        let got = block.header.hash();
        if got != Hash256(*expected) {
            return Err(ContextualError::CheckpointMismatch {
                height,
                got: got.to_string(),
            });
        }
    }

    let coinbase_script = &block.transactions[0].inputs[0].script_sig;
    if !script_starts_with_height(coinbase_script, height) {
        return Err(ContextualError::BadCoinbaseHeight(height));
    }

    // Base sigop ceiling; pay-to-script-hash redeem sigops are added on top
    // of this during connection, against the same ceiling.
    let mut sigops: u32 = 0;
    for tx in &block.transactions {
        for input in &tx.inputs {
            sigops = sigops.saturating_add(oracle.sig_op_count(&input.script_sig, SCRIPT_VERIFY_NONE));
        }
        for output in &tx.outputs {
            sigops =
                sigops.saturating_add(oracle.sig_op_count(&output.script_pubkey, SCRIPT_VERIFY_NONE));
        }
        if sigops > MAX_BLOCK_SIGOPS {
            return Err(ContextualError::TooManySigOps {
                count: sigops,
                max: MAX_BLOCK_SIGOPS,
            });
        }
    }

    Ok(())
}
