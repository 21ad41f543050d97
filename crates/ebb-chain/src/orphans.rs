//! Pool of blocks whose parent is not yet known.
//!
//! Orphans are held keyed by hash and indexed by their claimed previous
//! hash so that accepting a parent can promote its waiting children.
//! Stake blocks additionally register their claimed stake outpoint: a
//! second orphan claiming the same stake is dropped unless children are
//! already queued behind it, which starves cheap duplicate-stake floods
//! without touching validated state.
//!
//! No eviction policy: the pool grows until orphans are promoted or
//! dropped on failed replay (inherited behavior).

use std::collections::HashMap;

use ebb_core::types::{Block, Hash256, OutPoint};
use tracing::debug;

/// Why a block was not stashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StashOutcome {
    Stashed,
    AlreadyKnown,
    /// A different orphan already claims this stake outpoint.
    DuplicateStake,
}

#[derive(Default)]
pub struct OrphanPool {
    by_hash: HashMap<Hash256, Block>,
    by_prev: HashMap<Hash256, Vec<Hash256>>,
    stake_claims: HashMap<OutPoint, Hash256>,
}

impl OrphanPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a block until its parent shows up.
    pub fn stash(&mut self, block: Block) -> StashOutcome {
        let hash = block.header.hash();
        if self.by_hash.contains_key(&hash) {
            return StashOutcome::AlreadyKnown;
        }

        if let Some(stake) = block.stake_outpoint() {
            match self.stake_claims.get(&stake) {
                Some(claimant) if *claimant != hash => {
                    // A pending child means this hash is about to resolve;
                    // only then is a second claim worth holding.
                    if !self.by_prev.contains_key(&hash) {
                        debug!(block = %hash, stake = %stake, "dropping duplicate stake orphan");
                        return StashOutcome::DuplicateStake;
                    }
                }
                _ => {}
            }
            self.stake_claims.insert(stake, hash);
        }

        self.by_prev
            .entry(block.header.prev_hash)
            .or_default()
            .push(hash);
        self.by_hash.insert(hash, block);
        StashOutcome::Stashed
    }

    /// Remove and return the orphans waiting on `prev_hash`.
    pub fn take_children(&mut self, prev_hash: &Hash256) -> Vec<Block> {
        let Some(hashes) = self.by_prev.remove(prev_hash) else {
            return Vec::new();
        };
        hashes
            .into_iter()
            .filter_map(|hash| self.remove_by_hash(&hash))
            .collect()
    }

    fn remove_by_hash(&mut self, hash: &Hash256) -> Option<Block> {
        let block = self.by_hash.remove(hash)?;
        if let Some(stake) = block.stake_outpoint() {
            if self.stake_claims.get(&stake) == Some(hash) {
                self.stake_claims.remove(&stake);
            }
        }
        Some(block)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebb_core::constants::COIN;
    use ebb_core::crypto;
    use ebb_core::testing::{BlockBuilder, coinbase, coinstake, empty_coinbase, keypair};

    const T: u64 = 1_700_000_000;

    fn work_orphan(prev_byte: u8, height: u64) -> Block {
        BlockBuilder::new(Hash256([prev_byte; 32]), T)
            .tx(coinbase(height, T, 50 * COIN, vec![0xAA; 32]))
            .build()
    }

    fn stake_orphan(prev_byte: u8, stake: OutPoint, height: u64) -> Block {
        let staker = keypair(9);
        let mut cs = coinstake(stake, T, 60 * COIN, &staker);
        crypto::sign_transaction_input(&mut cs, 0, &staker).unwrap();
        BlockBuilder::new(Hash256([prev_byte; 32]), T)
            .tx(empty_coinbase(height, T))
            .tx(cs)
            .signed_by(&staker)
            .build()
    }

    #[test]
    fn stash_and_promote_child() {
        let mut pool = OrphanPool::new();
        let block = work_orphan(1, 2);
        let hash = block.header.hash();
        assert_eq!(pool.stash(block), StashOutcome::Stashed);
        assert!(pool.contains(&hash));

        let children = pool.take_children(&Hash256([1; 32]));
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].header.hash(), hash);
        assert!(pool.is_empty());
    }

    #[test]
    fn restash_is_already_known() {
        let mut pool = OrphanPool::new();
        let block = work_orphan(1, 2);
        pool.stash(block.clone());
        assert_eq!(pool.stash(block), StashOutcome::AlreadyKnown);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn duplicate_stake_claim_is_dropped() {
        let mut pool = OrphanPool::new();
        let stake = OutPoint { txid: Hash256([5; 32]), index: 0 };
        // Same stake claimed from two different parents.
        let first = stake_orphan(1, stake, 2);
        let second = stake_orphan(2, stake, 3);
        assert_ne!(first.header.hash(), second.header.hash());

        assert_eq!(pool.stash(first), StashOutcome::Stashed);
        assert_eq!(pool.stash(second), StashOutcome::DuplicateStake);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn duplicate_stake_allowed_when_children_wait_on_it() {
        let mut pool = OrphanPool::new();
        let stake = OutPoint { txid: Hash256([5; 32]), index: 0 };
        let first = stake_orphan(1, stake, 2);
        let second = stake_orphan(2, stake, 3);

        // A child queued behind `second` arrives first.
        let child = work_orphan(0, 4);
        let mut child = child;
        child.header.prev_hash = second.header.hash();
        // Re-mine after editing the parent link.
        while !ebb_core::block_validation::check_pow(&child.header) {
            child.header.nonce += 1;
        }

        pool.stash(first);
        pool.stash(child);
        assert_eq!(pool.stash(second), StashOutcome::Stashed);
    }

    #[test]
    fn promoting_stake_orphan_frees_its_claim() {
        let mut pool = OrphanPool::new();
        let stake = OutPoint { txid: Hash256([5; 32]), index: 0 };
        let first = stake_orphan(1, stake, 2);
        pool.stash(first);
        pool.take_children(&Hash256([1; 32]));

        // The claim is gone; a new orphan may claim the same stake.
        let second = stake_orphan(2, stake, 3);
        assert_eq!(pool.stash(second), StashOutcome::Stashed);
    }

    #[test]
    fn take_children_only_returns_matching_parent() {
        let mut pool = OrphanPool::new();
        pool.stash(work_orphan(1, 2));
        pool.stash(work_orphan(2, 2));
        assert_eq!(pool.take_children(&Hash256([1; 32])).len(), 1);
        assert_eq!(pool.len(), 1);
    }
}
