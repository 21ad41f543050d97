//! Error types for the Ebb ledger.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("value overflow")] ValueOverflow,
    #[error("oversized: {size} > {max}")] OversizedTransaction { size: usize, max: usize },
    #[error("duplicate input: {0}")] DuplicateInput(String),
    #[error("null outpoint in non-coinbase input {0}")] NullOutpointInRegularTx(usize),
    #[error("invalid coinbase: {0}")] InvalidCoinbase(String),
    #[error("invalid coinstake: {0}")] InvalidCoinstake(String),
    #[error("output value out of money range at index {0}")] OutputMoneyRange(usize),
    #[error("serialization: {0}")] Serialization(String),
}

/// Context-free block defects. Fatal; the block is discarded and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("empty block")] EmptyBlock,
    #[error("oversized: {size} > {max}")] OversizedBlock { size: usize, max: usize },
    #[error("first transaction is not coinbase")] FirstTxNotCoinbase,
    #[error("multiple coinbase transactions")] MultipleCoinbase,
    #[error("coinstake at position {0}, only position 1 allowed")] MisplacedCoinstake(usize),
    #[error("invalid merkle root")] InvalidMerkleRoot,
    #[error("invalid PoW")] InvalidPoW,
    #[error("transaction {index} timestamp after block timestamp")] TxTimeAfterBlock { index: usize },
    #[error("work block carries a signature")] UnexpectedSignature,
    #[error("stake block missing signature")] MissingSignature,
    #[error("block signature verification failed")] BadBlockSignature,
    #[error("coinstake timestamp differs from block timestamp")] CoinstakeTimeMismatch,
    #[error("tx error in {index}: {source}")] Transaction { index: usize, source: TransactionError },
    #[error("serialization: {0}")] Serialization(String),
}

/// Chain-context block defects. Fatal for this block; connected state is untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextualError {
    #[error("timestamp {timestamp} more than {max_drift}s ahead of parent {parent}")]
    TimestampTooFarAhead { timestamp: u64, parent: u64, max_drift: u64 },
    #[error("non-final transaction at index {0}")] NonFinalTransaction(usize),
    #[error("checkpoint mismatch at height {height}: got {got}")] CheckpointMismatch { height: u64, got: String },
    #[error("coinbase script does not encode height {0}")] BadCoinbaseHeight(u64),
    #[error("too many sigops: {count} > {max}")] TooManySigOps { count: u32, max: u32 },
}

/// Consensus-rule violations found while connecting a block against the UTXO
/// set. Fatal; the block is rejected and never persisted as main chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("missing input: {0}")] MissingInput(String),
    #[error("double spend of {0}")] DoubleSpend(String),
    #[error("script verification failed on input {index} of {txid}")] ScriptFailure { txid: String, index: usize },
    #[error("immature spend of {kind} output {outpoint}: depth {depth} < {required}")]
    ImmatureSpend { kind: &'static str, outpoint: String, depth: u64, required: u64 },
    #[error("input {0} created after spending transaction")] TimestampOrder(String),
    #[error("value out of money range")] MoneyRange,
    #[error("insufficient inputs: have {have}, need {need}")] InsufficientInputs { have: u64, need: u64 },
    #[error("reward overrun: claimed {claimed}, allowed {allowed}")] RewardOverrun { claimed: u64, allowed: u64 },
    #[error("unspent transaction collision: {0}")] UnspentCollision(String),
    #[error("stake modifier checksum mismatch at height {height}: got {got:#010x}, expected {expected:#010x}")]
    ModifierChecksum { height: u64, got: u32, expected: u32 },
    #[error("coin age computation failed: {0}")] CoinAge(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Structural(#[from] StructuralError),
    #[error(transparent)] Contextual(#[from] ContextualError),
    #[error(transparent)] Consensus(#[from] ConsensusError),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error("unknown block: {0}")] UnknownBlock(String),
    #[error("duplicate block: {0}")] DuplicateBlock(String),
    #[error("storage: {0}")] Storage(String),
}
