//! Persistent chain records: index entries, chain state, merkle nodes,
//! UTXO records.
//!
//! Index entries form a tree rooted at genesis via prev-hash links; the
//! subset whose next links chain forward from genesis is the main chain.
//! Prev and next are key lookups against the index map, not ownership
//! edges. Entries are append-only: once written, only the next link and
//! the stake/trust fields set during acceptance ever change.

use ebb_consensus::AncestorFacts;
use ebb_core::types::{Hash256, OutPoint, TxKind};
use serde::{Deserialize, Serialize};

/// Block flag: proof-of-stake block.
pub const FLAG_PROOF_OF_STAKE: u32 = 1 << 0;
/// Block flag: entropy bit contributed to modifier generation.
pub const FLAG_STAKE_ENTROPY: u32 = 1 << 1;
/// Block flag: a new stake modifier was generated at this block.
pub const FLAG_STAKE_MODIFIER: u32 = 1 << 2;

/// Location of a serialized block in the append-only block file.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockFilePos {
    /// Byte offset of the record (including framing) in the file.
    pub offset: u64,
    /// Length of the serialized block body.
    pub length: u64,
}

/// Proof-of-stake facts recorded on stake-block entries.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct StakeInfo {
    /// Kernel hash binding the modifier to the spent stake.
    pub kernel_hash: Hash256,
    /// The outpoint consumed by the coinstake.
    pub outpoint: OutPoint,
    /// The coinstake timestamp.
    pub time: u64,
}

/// One index entry per accepted block, keyed by block hash.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct IndexEntry {
    pub hash: Hash256,
    pub prev_hash: Hash256,
    /// Forward link; zero unless this entry is on the main chain and has
    /// a main-chain successor.
    pub next_hash: Hash256,
    pub height: u64,
    pub timestamp: u64,
    pub difficulty_target: u64,
    /// This block's own trust contribution.
    pub block_trust: u128,
    /// Cumulative trust: parent's cumulative plus `block_trust`.
    pub chain_trust: u128,
    pub flags: u32,
    /// Stake modifier in force at this block.
    pub stake_modifier: u64,
    /// Chained checksum of the modifier state.
    pub modifier_checksum: u32,
    /// Stake facts, present on proof-of-stake entries only.
    pub stake: Option<StakeInfo>,
    /// Where the block body lives in the block file.
    pub file_pos: BlockFilePos,
    /// Coins minted by this block.
    pub mint: u64,
    /// Running money supply up to and including this block.
    pub money_supply: u64,
}

impl IndexEntry {
    pub fn is_proof_of_stake(&self) -> bool {
        self.flags & FLAG_PROOF_OF_STAKE != 0
    }

    pub fn entropy_bit(&self) -> bool {
        self.flags & FLAG_STAKE_ENTROPY != 0
    }

    pub fn generated_modifier(&self) -> bool {
        self.flags & FLAG_STAKE_MODIFIER != 0
    }

    /// The facts the trust scorer needs about this entry.
    pub fn ancestor_facts(&self) -> AncestorFacts {
        AncestorFacts {
            prev_hash: self.prev_hash,
            difficulty_target: self.difficulty_target,
            proof_of_stake: self.is_proof_of_stake(),
            block_trust: self.block_trust,
        }
    }
}

/// The single best-chain row: tip hash, cumulative trust, height.
///
/// Invariant: always equal to the index entry at the end of the
/// main-chain path.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ChainState {
    pub best_hash: Hash256,
    pub best_trust: u128,
    pub best_height: u64,
}

/// Per-transaction record written when a block connects, keyed by txid.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct MerkleNode {
    /// Hash of the block containing the transaction.
    pub block_hash: Hash256,
    /// Byte offset of the transaction within the serialized block body.
    pub offset: u64,
    /// Serialized length of the transaction.
    pub size: u64,
    pub kind: TxKind,
}

/// One record per transaction output, keyed by outpoint.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct UtxoRecord {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
    /// Set by the validated consuming transaction, cleared only by
    /// disconnecting that transaction.
    pub spent: bool,
    /// Kind of the creating transaction; drives the maturity window.
    pub kind: TxKind,
    /// Height of the block that created this output.
    pub height: u64,
    /// Timestamp of the creating transaction.
    pub tx_time: u64,
}
