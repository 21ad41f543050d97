//! The chain context: block acceptance, fork choice, reorganization.
//!
//! [`Chain`] owns the block index, the UTXO ledger, the append-only
//! block file, the orphan pool, and the mempool. Blocks arrive through
//! [`Chain::process_block`]; structurally valid blocks with a known
//! parent are scored, indexed, and (when their cumulative trust beats
//! the tip) connected as the new best chain, reorganizing away from the
//! old branch when they extend a fork.
//!
//! Every accepted block is appended to the block file and indexed
//! whether or not it wins fork choice; side branches stay available for
//! later reorganization.

use std::path::Path;
use std::sync::Arc;

use ebb_consensus::checkpoint;
use ebb_consensus::modifier::{Candidate, selection_interval};
use ebb_consensus::{block_trust, compute_next_modifier, entropy_bit, kernel_hash, modifier_checksum};
use ebb_core::block_validation::{check_contextual, check_structural};
use ebb_core::constants::{CHECKPOINTS, MODIFIER_CHECKPOINTS, MODIFIER_INTERVAL};
use ebb_core::error::{ChainError, ContextualError};
use ebb_core::genesis;
use ebb_core::script::{SCRIPT_VERIFY_P2SH, ScriptOracle};
use ebb_core::types::{Block, Hash256, OutPoint, Transaction};
use ebb_core::validation::validate_transaction_structure;
use tracing::{debug, info, warn};

use crate::entry::{
    ChainState, FLAG_PROOF_OF_STAKE, FLAG_STAKE_ENTROPY, FLAG_STAKE_MODIFIER, IndexEntry,
    StakeInfo, UtxoRecord,
};
use crate::blockfile::BlockFile;
use crate::index::BlockIndex;
use crate::ledger::Ledger;
use crate::mempool::Mempool;
use crate::orphans::{OrphanPool, StashOutcome};
use crate::store::{ChainDb, Table};

const STATE_KEY: &[u8] = b"chain_state";

/// What [`Chain::process_block`] did with a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Indexed, and possibly now on the best chain.
    Accepted,
    /// Parent unknown; held in the orphan pool.
    Orphaned,
    /// Already known (indexed, orphaned, or dropped as a duplicate
    /// stake claim).
    Duplicate,
}

pub struct Chain {
    db: Arc<dyn ChainDb>,
    index: BlockIndex,
    block_file: BlockFile,
    state: ChainState,
    orphans: OrphanPool,
    mempool: Mempool,
    ledger: Ledger,
    oracle: Arc<dyn ScriptOracle>,
    checkpoints: &'static [(u64, [u8; 32])],
    modifier_checkpoints: &'static [(u64, u32)],
}

impl Chain {
    /// Open the chain over a store and block file, binding genesis on
    /// first use.
    pub fn open(
        db: Arc<dyn ChainDb>,
        block_file_path: impl AsRef<Path>,
        oracle: Arc<dyn ScriptOracle>,
    ) -> Result<Self, ChainError> {
        let index = BlockIndex::open(Arc::clone(&db))?;
        let block_file = BlockFile::open(block_file_path)?;
        let ledger = Ledger::new(Arc::clone(&db), Arc::clone(&oracle), CHECKPOINTS);

        let state = match db.get(Table::Meta, STATE_KEY)? {
            Some(bytes) => {
                let (state, _) = bincode::decode_from_slice(&bytes, bincode::config::standard())
                    .map_err(|e| ChainError::Storage(format!("chain state decode: {e}")))?;
                state
            }
            None => ChainState::default(),
        };

        let mut chain = Self {
            db,
            index,
            block_file,
            state,
            orphans: OrphanPool::new(),
            mempool: Mempool::new(),
            ledger,
            oracle,
            checkpoints: CHECKPOINTS,
            modifier_checkpoints: MODIFIER_CHECKPOINTS,
        };

        if chain.index.is_empty() {
            chain.bind_genesis()?;
        }
        Ok(chain)
    }

    /// Index and connect the hardcoded genesis block.
    fn bind_genesis(&mut self) -> Result<(), ChainError> {
        let block = genesis::genesis_block().clone();
        let hash = genesis::genesis_hash();

        let mut flags = FLAG_STAKE_MODIFIER;
        if entropy_bit(&hash, 0) {
            flags |= FLAG_STAKE_ENTROPY;
        }
        let checksum = modifier_checksum(0, flags, &Hash256::ZERO, 0);
        checkpoint::check_modifier_checksum_with(self.modifier_checkpoints, 0, checksum)?;

        let file_pos = self.block_file.append(&block)?;
        // Genesis has no parent; its own timestamp anchors the drift check.
        let connected = self.ledger.connect_block(
            &block,
            0,
            block.header.timestamp,
            SCRIPT_VERIFY_P2SH,
            false,
        )?;

        let entry = IndexEntry {
            hash,
            prev_hash: Hash256::ZERO,
            next_hash: Hash256::ZERO,
            height: 0,
            timestamp: block.header.timestamp,
            difficulty_target: block.header.difficulty_target,
            block_trust: 1,
            chain_trust: 1,
            flags,
            stake_modifier: 0,
            modifier_checksum: checksum,
            stake: None,
            file_pos,
            mint: connected.mint,
            money_supply: connected.mint,
        };
        self.index.insert(entry)?;

        self.state = ChainState { best_hash: hash, best_trust: 1, best_height: 0 };
        self.persist_state()?;
        info!(genesis = %hash, "bound genesis block");
        Ok(())
    }

    /// Handle an incoming block: validate structure, stash orphans,
    /// accept and replay waiting children.
    pub fn process_block(&mut self, block: Block) -> Result<ProcessOutcome, ChainError> {
        let hash = block.header.hash();
        if self.index.contains(&hash) || self.orphans.contains(&hash) {
            return Ok(ProcessOutcome::Duplicate);
        }

        check_structural(&block)?;

        if !self.index.contains(&block.header.prev_hash) {
            return Ok(match self.orphans.stash(block) {
                StashOutcome::Stashed => {
                    debug!(block = %hash, "stashed orphan block");
                    ProcessOutcome::Orphaned
                }
                StashOutcome::AlreadyKnown | StashOutcome::DuplicateStake => {
                    ProcessOutcome::Duplicate
                }
            });
        }

        self.accept_block(block)?;

        // Accepting a parent may free waiting orphans, recursively.
        let mut parents = vec![hash];
        while let Some(parent) = parents.pop() {
            for child in self.orphans.take_children(&parent) {
                let child_hash = child.header.hash();
                match self.accept_block(child) {
                    Ok(()) => parents.push(child_hash),
                    Err(err) => {
                        debug!(block = %child_hash, %err, "dropping invalid orphan");
                    }
                }
            }
        }

        Ok(ProcessOutcome::Accepted)
    }

    /// Score and index a block whose parent is known, then run fork
    /// choice.
    fn accept_block(&mut self, block: Block) -> Result<(), ChainError> {
        let hash = block.header.hash();
        let parent = self
            .index
            .get(&block.header.prev_hash)
            .cloned()
            .ok_or_else(|| ChainError::UnknownBlock(block.header.prev_hash.to_string()))?;
        let height = parent.height + 1;

        check_contextual(
            &block,
            parent.timestamp,
            height,
            self.checkpoints,
            self.oracle.as_ref(),
        )?;

        let proof_of_stake = block.is_proof_of_stake();
        let trust = block_trust(
            block.header.timestamp,
            block.header.difficulty_target,
            proof_of_stake,
            height,
            &block.header.prev_hash,
            |h| self.index.get(h).map(|e| e.ancestor_facts()),
        );
        let chain_trust = parent.chain_trust.saturating_add(trust);

        let (prev_modifier, prev_modifier_time) = self.last_modifier(&parent)?;
        let candidates = self.modifier_candidates(&parent);
        let (stake_modifier, generated) = compute_next_modifier(
            prev_modifier,
            prev_modifier_time,
            parent.timestamp,
            &candidates,
        );

        let mut flags = 0u32;
        if proof_of_stake {
            flags |= FLAG_PROOF_OF_STAKE;
        }
        if entropy_bit(&hash, height) {
            flags |= FLAG_STAKE_ENTROPY;
        }
        if generated {
            flags |= FLAG_STAKE_MODIFIER;
        }

        // The coinstake shape was already validated structurally.
        let stake = block.coinstake().map(|coinstake| {
            let outpoint = coinstake.inputs[0].previous_output;
            StakeInfo {
                kernel_hash: kernel_hash(stake_modifier, &outpoint, coinstake.time),
                outpoint,
                time: coinstake.time,
            }
        });

        let proof_hash = stake.map(|s| s.kernel_hash).unwrap_or(Hash256::ZERO);
        let checksum = modifier_checksum(parent.modifier_checksum, flags, &proof_hash, stake_modifier);
        checkpoint::check_modifier_checksum_with(self.modifier_checkpoints, height, checksum)?;

        let file_pos = self.block_file.append(&block)?;
        let entry = IndexEntry {
            hash,
            prev_hash: parent.hash,
            next_hash: Hash256::ZERO,
            height,
            timestamp: block.header.timestamp,
            difficulty_target: block.header.difficulty_target,
            block_trust: trust,
            chain_trust,
            flags,
            stake_modifier,
            modifier_checksum: checksum,
            stake,
            file_pos,
            mint: 0,
            money_supply: parent.money_supply,
        };
        self.index.insert(entry)?;

        if chain_trust > self.state.best_trust {
            self.set_best_chain(hash)?;
        } else {
            debug!(block = %hash, height, "accepted side-chain block");
        }
        Ok(())
    }

    /// The modifier last generated at or before `parent`, with its block
    /// timestamp. Genesis generates, so the walk always terminates.
    fn last_modifier(&self, parent: &IndexEntry) -> Result<(u64, u64), ChainError> {
        let mut cursor = parent.clone();
        loop {
            if cursor.generated_modifier() {
                return Ok((cursor.stake_modifier, cursor.timestamp));
            }
            cursor = self.parent_entry(&cursor)?;
        }
    }

    /// Ancestors of `parent` (inclusive) inside the modifier selection
    /// interval, as selection candidates.
    fn modifier_candidates(&self, parent: &IndexEntry) -> Vec<Candidate> {
        let start = (parent.timestamp / MODIFIER_INTERVAL * MODIFIER_INTERVAL)
            .saturating_sub(selection_interval());
        let mut candidates = Vec::new();
        let mut cursor = Some(parent.clone());
        while let Some(entry) = cursor {
            if entry.timestamp < start {
                break;
            }
            candidates.push(Candidate {
                hash: entry.hash,
                timestamp: entry.timestamp,
                entropy_bit: entry.entropy_bit(),
                kernel_hash: entry.stake.map(|s| s.kernel_hash),
            });
            cursor = self.index.get(&entry.prev_hash).cloned();
        }
        candidates
    }

    fn parent_entry(&self, entry: &IndexEntry) -> Result<IndexEntry, ChainError> {
        self.index
            .get(&entry.prev_hash)
            .cloned()
            .ok_or_else(|| ChainError::UnknownBlock(entry.prev_hash.to_string()))
    }

    /// Make `new_tip` the best chain, reorganizing if it does not extend
    /// the current tip.
    fn set_best_chain(&mut self, new_tip: Hash256) -> Result<(), ChainError> {
        let entry = self
            .index
            .get(&new_tip)
            .cloned()
            .ok_or_else(|| ChainError::UnknownBlock(new_tip.to_string()))?;

        if entry.prev_hash == self.state.best_hash {
            self.connect_tip(entry)
        } else {
            self.reorganize(entry)
        }
    }

    /// Connect a block that extends the current tip.
    fn connect_tip(&mut self, mut entry: IndexEntry) -> Result<(), ChainError> {
        let block = self.block_file.read(&entry.file_pos)?;
        let mut parent = self.parent_entry(&entry)?;
        let connected = self.ledger.connect_block(
            &block,
            entry.height,
            parent.timestamp,
            SCRIPT_VERIFY_P2SH,
            false,
        )?;

        entry.mint = connected.mint;
        entry.money_supply = (parent.money_supply as i128 + connected.supply_delta).max(0) as u64;
        self.index.update(entry.clone())?;

        parent.next_hash = entry.hash;
        self.index.update(parent)?;

        for tx in &block.transactions {
            self.mempool.prune_confirmed(tx)?;
        }

        self.state = ChainState {
            best_hash: entry.hash,
            best_trust: entry.chain_trust,
            best_height: entry.height,
        };
        self.persist_state()?;
        info!(block = %entry.hash, height = entry.height, "new best block");
        Ok(())
    }

    /// Switch the best chain to the branch ending at `new_entry`.
    ///
    /// Disconnects back to the fork point, resurrecting ordinary
    /// transactions into the mempool, then connects the new branch
    /// oldest-first. A branch block that fails to connect ends the walk
    /// there; the blocks connected so far remain the best chain.
    fn reorganize(&mut self, new_entry: IndexEntry) -> Result<(), ChainError> {
        let mut fork = self
            .index
            .get(&self.state.best_hash)
            .cloned()
            .ok_or_else(|| ChainError::UnknownBlock(self.state.best_hash.to_string()))?;
        let mut cursor = new_entry.clone();

        let mut disconnect = Vec::new();
        let mut connect = Vec::new();
        while fork.hash != cursor.hash {
            if cursor.height > fork.height {
                connect.push(cursor.clone());
                cursor = self.parent_entry(&cursor)?;
            } else {
                disconnect.push(fork.clone());
                fork = self.parent_entry(&fork)?;
            }
        }

        if let Some(deepest) = disconnect.last() {
            if checkpoint::is_below_checkpoint_with(self.checkpoints, deepest.height) {
                return Err(ContextualError::CheckpointMismatch {
                    height: deepest.height,
                    got: deepest.hash.to_string(),
                }
                .into());
            }
        }

        info!(
            fork = %fork.hash,
            fork_height = fork.height,
            disconnecting = disconnect.len(),
            connecting = connect.len(),
            "reorganizing"
        );

        for entry in &disconnect {
            let block = self.block_file.read(&entry.file_pos)?;
            for tx in self.ledger.disconnect_block(&block)? {
                self.mempool.insert(tx)?;
            }
            let mut cleared = entry.clone();
            cleared.next_hash = Hash256::ZERO;
            self.index.update(cleared)?;
        }

        connect.reverse();
        let mut best = fork;
        for entry in connect {
            let block = self.block_file.read(&entry.file_pos)?;
            match self.ledger.connect_block(
                &block,
                entry.height,
                best.timestamp,
                SCRIPT_VERIFY_P2SH,
                false,
            ) {
                Ok(connected) => {
                    let mut updated = entry;
                    updated.mint = connected.mint;
                    updated.money_supply =
                        (best.money_supply as i128 + connected.supply_delta).max(0) as u64;
                    updated.next_hash = Hash256::ZERO;
                    self.index.update(updated.clone())?;

                    let mut parent = self.parent_entry(&updated)?;
                    parent.next_hash = updated.hash;
                    self.index.update(parent)?;

                    for tx in &block.transactions {
                        self.mempool.prune_confirmed(tx)?;
                    }
                    best = updated;
                }
                Err(err) => {
                    warn!(block = %entry.hash, %err, "branch block failed to connect; stopping here");
                    break;
                }
            }
        }

        self.state = ChainState {
            best_hash: best.hash,
            best_trust: best.chain_trust,
            best_height: best.height,
        };
        self.persist_state()?;
        info!(block = %best.hash, height = best.height, "reorganized to new best block");
        Ok(())
    }

    fn persist_state(&self) -> Result<(), ChainError> {
        let bytes = bincode::encode_to_vec(self.state, bincode::config::standard())
            .map_err(|e| ChainError::Storage(format!("chain state encode: {e}")))?;
        self.db.put(Table::Meta, STATE_KEY, &bytes)
    }

    // --- Transactions ---

    /// Admit a transaction to the mempool after structural validation.
    pub fn accept_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        validate_transaction_structure(&tx)?;
        self.mempool.insert(tx)
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    // --- Queries ---

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn best_hash(&self) -> Hash256 {
        self.state.best_hash
    }

    pub fn best_height(&self) -> u64 {
        self.state.best_height
    }

    pub fn entry(&self, hash: &Hash256) -> Option<&IndexEntry> {
        self.index.get(hash)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Read a block body back from the block file.
    pub fn get_block(&mut self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        let Some(pos) = self.index.get(hash).map(|e| e.file_pos) else {
            return Ok(None);
        };
        Ok(Some(self.block_file.read(&pos)?))
    }

    /// The block containing a confirmed transaction.
    pub fn get_block_by_tx(&mut self, txid: &Hash256) -> Result<Option<Block>, ChainError> {
        let Some(node) = self.ledger.tx_meta(txid)? else {
            return Ok(None);
        };
        self.get_block(&node.block_hash)
    }

    /// Unspent outputs of a transaction.
    pub fn unspent_outputs(
        &self,
        txid: &Hash256,
    ) -> Result<Vec<(OutPoint, UtxoRecord)>, ChainError> {
        self.ledger.unspent_outputs(txid)
    }
}
