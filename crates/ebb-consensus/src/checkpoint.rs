//! Checkpoint verification.
//!
//! Two compiled-in tables pin known-good history: (height, block hash)
//! pairs checked when a block is accepted at a pinned height, and
//! (height, stake-modifier checksum) pairs checked whenever a modifier
//! checksum is recorded. An exact height match with a differing value is
//! fatal for the block.
//!
//! # Attack vectors
//!
//! - **Long-range rewrite:** without checkpoints an attacker with enough
//!   accumulated stake or hash power could rewrite deep history. Pinned
//!   hashes bound how far back a reorg can reach.
//! - **Stake-modifier grinding:** the checksum table pins the modifier
//!   chain itself, so a rewritten branch cannot smuggle in a ground
//!   modifier sequence even above the last hash checkpoint.

use ebb_core::constants::{CHECKPOINTS, MODIFIER_CHECKPOINTS};
use ebb_core::error::{ConsensusError, ContextualError};
use ebb_core::types::Hash256;

/// Verify that a block at `height` matches the pinned hash, if any.
pub fn check_hash(height: u64, hash: &Hash256) -> Result<(), ContextualError> {
    check_hash_with(CHECKPOINTS, height, hash)
}

/// Like [`check_hash`] but takes an explicit checkpoint list.
///
/// This is the testable core: production code passes [`CHECKPOINTS`],
/// tests supply their own table.
pub fn check_hash_with(
    checkpoints: &[(u64, [u8; 32])],
    height: u64,
    hash: &Hash256,
) -> Result<(), ContextualError> {
    for &(cp_height, cp_hash) in checkpoints {
        if cp_height == height {
            if hash.0 != cp_hash {
                return Err(ContextualError::CheckpointMismatch {
                    height,
                    got: hash.to_string(),
                });
            }
            return Ok(());
        }
    }
    Ok(())
}

/// Verify a stake-modifier checksum against the pinned table, if any.
pub fn check_modifier_checksum(height: u64, checksum: u32) -> Result<(), ConsensusError> {
    check_modifier_checksum_with(MODIFIER_CHECKPOINTS, height, checksum)
}

/// Like [`check_modifier_checksum`] but takes an explicit table.
pub fn check_modifier_checksum_with(
    checkpoints: &[(u64, u32)],
    height: u64,
    checksum: u32,
) -> Result<(), ConsensusError> {
    for &(cp_height, cp_checksum) in checkpoints {
        if cp_height == height {
            if checksum != cp_checksum {
                return Err(ConsensusError::ModifierChecksum {
                    height,
                    got: checksum,
                    expected: cp_checksum,
                });
            }
            return Ok(());
        }
    }
    Ok(())
}

/// Height of the most recent hash checkpoint, or 0 if there are none.
pub fn last_checkpoint_height() -> u64 {
    last_checkpoint_height_with(CHECKPOINTS)
}

/// Like [`last_checkpoint_height`] but with an explicit list.
pub fn last_checkpoint_height_with(checkpoints: &[(u64, [u8; 32])]) -> u64 {
    checkpoints.iter().map(|(h, _)| *h).max().unwrap_or(0)
}

/// Returns `true` if `height` is at or below the last hash checkpoint.
///
/// Reorgs must never disconnect a block at or below this height.
pub fn is_below_checkpoint_with(checkpoints: &[(u64, [u8; 32])], height: u64) -> bool {
    let last = last_checkpoint_height_with(checkpoints);
    last > 0 && height <= last
}
