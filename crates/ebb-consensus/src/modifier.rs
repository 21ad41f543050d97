//! Stake modifier generation.
//!
//! The stake modifier is 64 bits of collective entropy that scrambles
//! future stake kernels, regenerated once per modifier interval rather
//! than per block so a staker cannot grind it. Generation selects up to
//! 64 blocks from the prior selection interval, one per bit round, each
//! round bounded by a geometrically growing section of the interval.
//! The selected block's entropy bit lands at the round's bit position.
//!
//! Selection favors stake blocks: the lowest selection hash wins each
//! round, and stake candidates have theirs right-shifted by 32 bits, so
//! a work block rarely beats one.
//!
//! A 32-bit checksum chains each block's modifier state onto its
//! parent's, pinned at fixed heights by the modifier checkpoint table.

use std::collections::HashSet;

use ebb_core::constants::{
    ENTROPY_BIT_TABLE, ENTROPY_SWITCH_HEIGHT, MODIFIER_INTERVAL, MODIFIER_INTERVAL_RATIO,
};
use ebb_core::types::{Hash256, OutPoint, sha256d};
use tracing::debug;

const MODIFIER_BITS: usize = 64;

/// A block eligible for modifier selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub hash: Hash256,
    pub timestamp: u64,
    pub entropy_bit: bool,
    /// The stake kernel hash for stake blocks, `None` for work blocks.
    pub kernel_hash: Option<Hash256>,
}

/// Length of one selection section.
///
/// Sections grow with the round index; the 64 of them partition the
/// selection interval.
pub fn section_interval(round: u64) -> u64 {
    MODIFIER_INTERVAL * 63 / (63 + (63 - round) * (MODIFIER_INTERVAL_RATIO - 1))
}

/// Total length of the selection interval covered by all 64 rounds.
pub fn selection_interval() -> u64 {
    (0..MODIFIER_BITS as u64).map(section_interval).sum()
}

/// A block's entropy bit.
///
/// From the activation height on, the low bit of the block hash; before
/// it, a bit from the pregenerated table indexed by height.
pub fn entropy_bit(block_hash: &Hash256, height: u64) -> bool {
    if height >= ENTROPY_SWITCH_HEIGHT {
        block_hash.low_u64() & 1 == 1
    } else {
        (ENTROPY_BIT_TABLE >> height) & 1 == 1
    }
}

/// The stake kernel hash recorded on stake-block index entries: binds the
/// modifier in force to the spent outpoint and the stake time.
pub fn kernel_hash(modifier: u64, stake: &OutPoint, stake_time: u64) -> Hash256 {
    let mut data = Vec::with_capacity(8 + 32 + 8 + 8);
    data.extend_from_slice(&modifier.to_le_bytes());
    data.extend_from_slice(stake.txid.as_bytes());
    data.extend_from_slice(&stake.index.to_le_bytes());
    data.extend_from_slice(&stake_time.to_le_bytes());
    sha256d(&data)
}

/// Selection hash for one candidate: double SHA-256 of the kernel-or-block
/// hash and the previous modifier, right-shifted for stake blocks.
fn selection_hash(candidate: &Candidate, prev_modifier: u64) -> u64 {
    let proof = candidate.kernel_hash.as_ref().unwrap_or(&candidate.hash);
    let mut data = Vec::with_capacity(32 + 8);
    data.extend_from_slice(proof.as_bytes());
    data.extend_from_slice(&prev_modifier.to_le_bytes());
    let hash = sha256d(&data).low_u64();
    if candidate.kernel_hash.is_some() {
        hash >> 32
    } else {
        hash
    }
}

/// Compute the modifier in force for a block whose parent is at
/// `parent_time`.
///
/// Returns `(modifier, generated)`. If the parent's timestamp has not
/// crossed into a new modifier interval since `prev_modifier_time`, the
/// previous modifier is reused and `generated` is false. Otherwise a new
/// modifier is produced from `candidates`, the blocks of the prior
/// selection interval (any order; sorted internally by timestamp then
/// hash).
pub fn compute_next_modifier(
    prev_modifier: u64,
    prev_modifier_time: u64,
    parent_time: u64,
    candidates: &[Candidate],
) -> (u64, bool) {
    if prev_modifier_time / MODIFIER_INTERVAL >= parent_time / MODIFIER_INTERVAL {
        return (prev_modifier, false);
    }

    let mut sorted: Vec<&Candidate> = candidates.iter().collect();
    sorted.sort_by_key(|c| (c.timestamp, c.hash));

    let start =
        (parent_time / MODIFIER_INTERVAL * MODIFIER_INTERVAL).saturating_sub(selection_interval());
    let mut stop = start;
    let mut selected: HashSet<Hash256> = HashSet::new();
    let mut modifier: u64 = 0;

    let rounds = sorted.len().min(MODIFIER_BITS);
    for round in 0..rounds {
        stop += section_interval(round as u64);

        // The first unselected candidate always qualifies; candidates past
        // the section stop can only be beaten, not scanned fresh.
        let mut best: Option<(&Candidate, u64)> = None;
        for &candidate in &sorted {
            if selected.contains(&candidate.hash) {
                continue;
            }
            if best.is_some() && candidate.timestamp > stop {
                break;
            }
            let hash = selection_hash(candidate, prev_modifier);
            match best {
                Some((_, best_hash)) if hash >= best_hash => {}
                _ => best = Some((candidate, hash)),
            }
        }

        // rounds <= unselected candidates, so a choice always exists
        if let Some((chosen, _)) = best {
            modifier |= (chosen.entropy_bit as u64) << round;
            selected.insert(chosen.hash);
        }
    }

    debug!(modifier, rounds, "generated stake modifier");
    (modifier, true)
}

/// Chained 32-bit checksum over a block's modifier state.
///
/// Folds the parent's checksum with the entry's flags, its kernel hash
/// (zero for work blocks), and the modifier in force.
pub fn modifier_checksum(
    prev_checksum: u32,
    flags: u32,
    kernel_hash: &Hash256,
    modifier: u64,
) -> u32 {
    let mut data = Vec::with_capacity(4 + 4 + 32 + 8);
    data.extend_from_slice(&prev_checksum.to_le_bytes());
    data.extend_from_slice(&flags.to_le_bytes());
    data.extend_from_slice(kernel_hash.as_bytes());
    data.extend_from_slice(&modifier.to_le_bytes());
    let hash = sha256d(&data);
    u32::from_le_bytes([hash.0[0], hash.0[1], hash.0[2], hash.0[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn candidate(byte: u8, timestamp: u64, entropy: bool, stake: bool) -> Candidate {
        Candidate {
            hash: Hash256([byte; 32]),
            timestamp,
            entropy_bit: entropy,
            kernel_hash: stake.then(|| Hash256([byte.wrapping_add(100); 32])),
        }
    }

    // --- Sections ---

    #[test]
    fn sections_grow_with_round() {
        for round in 0..63 {
            assert!(section_interval(round) <= section_interval(round + 1));
        }
        // First section is a third of the interval scale, last the whole.
        assert_eq!(section_interval(0), MODIFIER_INTERVAL * 63 / 189);
        assert_eq!(section_interval(63), MODIFIER_INTERVAL);
    }

    #[test]
    fn selection_interval_sums_sections() {
        let sum: u64 = (0..64).map(section_interval).sum();
        assert_eq!(selection_interval(), sum);
        assert!(selection_interval() > MODIFIER_INTERVAL);
    }

    // --- Entropy bits ---

    #[test]
    fn entropy_bit_before_activation_reads_table() {
        for height in 0..ENTROPY_SWITCH_HEIGHT {
            let expected = (ENTROPY_BIT_TABLE >> height) & 1 == 1;
            // Hash content must not matter below the activation height.
            assert_eq!(entropy_bit(&Hash256([0xFF; 32]), height), expected);
            assert_eq!(entropy_bit(&Hash256::ZERO, height), expected);
        }
    }

    #[test]
    fn entropy_bit_after_activation_reads_hash() {
        let mut even = [0u8; 32];
        even[0] = 0x02;
        let mut odd = [0u8; 32];
        odd[0] = 0x03;
        assert!(!entropy_bit(&Hash256(even), ENTROPY_SWITCH_HEIGHT));
        assert!(entropy_bit(&Hash256(odd), ENTROPY_SWITCH_HEIGHT));
    }

    // --- Modifier generation ---

    #[test]
    fn reuses_modifier_within_interval() {
        let base = 100 * MODIFIER_INTERVAL;
        let (modifier, generated) =
            compute_next_modifier(42, base, base + MODIFIER_INTERVAL - 1, &[]);
        assert_eq!(modifier, 42);
        assert!(!generated);
    }

    #[test]
    fn generates_on_interval_boundary() {
        let base = 100 * MODIFIER_INTERVAL;
        let (_, generated) = compute_next_modifier(42, base, base + MODIFIER_INTERVAL, &[]);
        assert!(generated);
    }

    #[test]
    fn all_set_entropy_bits_fill_low_rounds() {
        let base = 100 * MODIFIER_INTERVAL;
        let candidates: Vec<Candidate> = (0..3)
            .map(|i| candidate(i + 1, base - 1000 + i as u64, true, false))
            .collect();
        let (modifier, generated) =
            compute_next_modifier(7, base, base + MODIFIER_INTERVAL, &candidates);
        assert!(generated);
        // Three rounds, all entropy bits set.
        assert_eq!(modifier, 0b111);
    }

    #[test]
    fn clear_entropy_bits_yield_zero_modifier() {
        let base = 100 * MODIFIER_INTERVAL;
        let candidates: Vec<Candidate> = (0..5)
            .map(|i| candidate(i + 1, base - 1000 + i as u64, false, i % 2 == 0))
            .collect();
        let (modifier, _) =
            compute_next_modifier(7, base, base + MODIFIER_INTERVAL, &candidates);
        assert_eq!(modifier, 0);
    }

    #[test]
    fn generation_depends_on_previous_modifier() {
        // Candidates inside the first selection section, so every round
        // ranks all of them by selection hash and the previous modifier
        // steers which entropy bits land where. Expected values mirror
        // the double-SHA-256 selection byte for byte.
        let parent = 101 * MODIFIER_INTERVAL;
        let start = parent / MODIFIER_INTERVAL * MODIFIER_INTERVAL - selection_interval();
        let candidates: Vec<Candidate> = (0..16)
            .map(|i| candidate(i + 1, start + 10 * i as u64, i % 3 == 0, i % 2 == 0))
            .collect();
        let (a, generated) = compute_next_modifier(1, 100 * MODIFIER_INTERVAL, parent, &candidates);
        assert!(generated);
        let (b, _) = compute_next_modifier(2, 100 * MODIFIER_INTERVAL, parent, &candidates);
        assert_eq!(a, 0xA129);
        assert_eq!(b, 0x5143);
    }

    #[test]
    fn selection_shift_favors_stake_candidates() {
        // The two share a proof hash: the work candidate's block hash
        // equals the stake candidate's kernel hash, so only the shift
        // separates their selection hashes.
        let stake = candidate(3, 0, false, true);
        let work = candidate(103, 0, false, false);
        assert_eq!(selection_hash(&stake, 9), selection_hash(&work, 9) >> 32);
        assert!(selection_hash(&stake, 9) <= selection_hash(&work, 9));
        assert!(selection_hash(&stake, 9) < (1u64 << 32));
    }

    proptest! {
        #[test]
        fn generation_ignores_candidate_order(seed in 0u64..1000) {
            let base = 100 * MODIFIER_INTERVAL;
            let mut candidates: Vec<Candidate> = (0..12)
                .map(|i| candidate(i + 1, base - 3000 + 17 * i as u64, (seed >> i) & 1 == 1, i % 2 == 1))
                .collect();
            let (forward, _) =
                compute_next_modifier(seed, base, base + MODIFIER_INTERVAL, &candidates);
            candidates.reverse();
            let (reversed, _) =
                compute_next_modifier(seed, base, base + MODIFIER_INTERVAL, &candidates);
            prop_assert_eq!(forward, reversed);
        }
    }

    // --- Kernel hash and checksum ---

    #[test]
    fn kernel_hash_binds_all_inputs() {
        let stake = OutPoint { txid: Hash256([0x11; 32]), index: 1 };
        let base = kernel_hash(5, &stake, 1_700_000_000);
        assert_ne!(base, kernel_hash(6, &stake, 1_700_000_000));
        assert_ne!(base, kernel_hash(5, &OutPoint { txid: Hash256([0x11; 32]), index: 2 }, 1_700_000_000));
        assert_ne!(base, kernel_hash(5, &stake, 1_700_000_001));
        assert_eq!(base, kernel_hash(5, &stake, 1_700_000_000));
    }

    #[test]
    fn checksum_chains_previous_value() {
        let kernel = Hash256([0x22; 32]);
        let a = modifier_checksum(0, 1, &kernel, 99);
        let b = modifier_checksum(a, 1, &kernel, 99);
        assert_ne!(a, b);
        assert_eq!(a, modifier_checksum(0, 1, &kernel, 99));
    }

    #[test]
    fn checksum_binds_flags_and_modifier() {
        let kernel = Hash256::ZERO;
        let base = modifier_checksum(7, 1, &kernel, 99);
        assert_ne!(base, modifier_checksum(7, 3, &kernel, 99));
        assert_ne!(base, modifier_checksum(7, 1, &kernel, 98));
        assert_ne!(base, modifier_checksum(7, 1, &Hash256([1; 32]), 99));
    }
}
