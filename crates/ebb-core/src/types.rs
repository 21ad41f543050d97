//! Core ledger types: transactions, blocks, headers.
//!
//! All monetary values are in drips (1 EBB = 10^6 drips).
//! All numeric fields use u64 per protocol convention.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::TransactionError;

/// A 32-byte hash value.
///
/// Used for transaction IDs (BLAKE3), block header hashes (double SHA-256),
/// merkle roots (BLAKE3), and stake kernel hashes (double SHA-256).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Used for coinbase previous outpoints
    /// and as the non-existent parent of genesis.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Interpret the first 8 bytes as a little-endian u64.
    ///
    /// Used for proof-of-work target comparison and for the low entropy bit.
    pub fn low_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(buf)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Compute double SHA-256 over a byte slice.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    Hash256(Sha256::digest(first).into())
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Transaction ID containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the transaction.
    pub index: u64,
}

impl OutPoint {
    /// The null outpoint, used for coinbase transaction inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            index: u64::MAX,
        }
    }

    /// Check if this is the null outpoint (coinbase marker).
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u64::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input, spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent. Null outpoint for coinbase.
    pub previous_output: OutPoint,
    /// Unlocking script. A 64-byte Ed25519 signature for pay-to-pubkey
    /// spends; arbitrary height-encoding data for coinbase.
    pub script_sig: Vec<u8>,
    /// Sequence number. [`FINAL_SEQUENCE`] marks the input final regardless
    /// of the transaction lock time.
    pub sequence: u64,
}

/// Sequence value that makes an input final.
pub const FINAL_SEQUENCE: u64 = u64::MAX;

impl TxInput {
    /// Check if this input is final (max sequence).
    pub fn is_final(&self) -> bool {
        self.sequence == FINAL_SEQUENCE
    }
}

/// A transaction output, creating a new UTXO.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in drips (1 EBB = 10^6 drips).
    pub value: u64,
    /// Locking script. The canonical pay-to-pubkey form is the raw 32-byte
    /// Ed25519 public key.
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    /// Check if this is the empty coinstake marker output.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

/// Role of a transaction within its block.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub enum TxKind {
    /// First transaction of a block, creating new currency from no inputs.
    Coinbase,
    /// Reward-claiming transaction of a proof-of-stake block.
    Coinstake,
    /// Any other value transfer.
    Ordinary,
}

impl TxKind {
    /// Whether outputs of this kind are subject to the maturity window.
    pub fn requires_maturity(&self) -> bool {
        matches!(self, Self::Coinbase | Self::Coinstake)
    }

    /// Short label for logs and errors.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Coinbase => "coinbase",
            Self::Coinstake => "coinstake",
            Self::Ordinary => "ordinary",
        }
    }
}

/// A transaction transferring value between outputs.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version.
    pub version: u64,
    /// Unix timestamp in seconds. Stake kernels and coin-age computation
    /// depend on transaction time, so every transaction carries one.
    pub time: u64,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Block height or timestamp before which this tx is invalid.
    pub lock_time: u64,
}

impl Transaction {
    /// Compute the transaction ID (BLAKE3 hash of the canonical encoding).
    ///
    /// Uses bincode with standard config for deterministic serialization.
    /// Returns an error if serialization fails.
    pub fn txid(&self) -> Result<Hash256, TransactionError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }

    /// Check if this is a coinbase transaction (single input with null outpoint).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Check if this is a coinstake transaction: real first input, at least
    /// two outputs, and an empty marker output in first position.
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty()
            && !self.inputs[0].previous_output.is_null()
            && self.outputs.len() >= 2
            && self.outputs[0].is_empty()
    }

    /// Classify this transaction.
    pub fn kind(&self) -> TxKind {
        if self.is_coinbase() {
            TxKind::Coinbase
        } else if self.is_coinstake() {
            TxKind::Coinstake
        } else {
            TxKind::Ordinary
        }
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Check finality at the given height and time.
    ///
    /// A zero lock time is always final. Lock times below
    /// [`LOCKTIME_THRESHOLD`](crate::constants::LOCKTIME_THRESHOLD) are block
    /// heights, others timestamps. A transaction whose inputs all carry the
    /// max sequence is final regardless of lock time.
    pub fn is_final(&self, height: u64, block_time: u64) -> bool {
        if self.lock_time == 0 {
            return true;
        }
        let cutoff = if self.lock_time < crate::constants::LOCKTIME_THRESHOLD {
            height
        } else {
            block_time
        };
        if self.lock_time < cutoff {
            return true;
        }
        self.inputs.iter().all(TxInput::is_final)
    }
}

/// Block header containing the proof puzzle.
///
/// Hash is computed as double SHA-256 over a fixed byte layout so the block
/// identity is independent of the bincode encoding.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u64,
    /// Hash of the previous block header.
    pub prev_hash: Hash256,
    /// BLAKE3 merkle root of the block's transactions.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Compact difficulty target.
    pub difficulty_target: u64,
    /// Proof-of-work nonce. Unused on stake blocks.
    pub nonce: u64,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing (4 u64 fields + 2 * 32-byte hashes).
    const HASH_SIZE: usize = 4 * 8 + 2 * 32;

    /// Compute the block header hash (double SHA-256).
    ///
    /// Uses an explicit fixed byte layout: version || prev_hash || merkle_root ||
    /// timestamp || difficulty_target || nonce, all little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.difficulty_target.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        sha256d(&data)
    }
}

/// A complete block: header, transactions, and the detached signature
/// carried by proof-of-stake blocks (empty on work blocks).
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Ordered list of transactions. First transaction must be coinbase.
    pub transactions: Vec<Transaction>,
    /// Ed25519 signature over the block hash, signed by the key that owns
    /// the coinstake's second output. Empty for work blocks.
    pub signature: Vec<u8>,
}

impl Block {
    /// Get the coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Get the coinstake transaction of a proof-of-stake block.
    pub fn coinstake(&self) -> Option<&Transaction> {
        self.transactions.get(1).filter(|tx| tx.is_coinstake())
    }

    /// A block is proof-of-stake iff its second transaction is a coinstake.
    pub fn is_proof_of_stake(&self) -> bool {
        self.coinstake().is_some()
    }

    /// The outpoint staked by a proof-of-stake block.
    pub fn stake_outpoint(&self) -> Option<OutPoint> {
        self.coinstake().map(|tx| tx.inputs[0].previous_output)
    }
}
