//! Protocol constants. All monetary values in drips (1 EBB = 10^6 drips).

pub const COIN: u64 = 1_000_000;
pub const CENT: u64 = 10_000;

/// Hard cap on total money in circulation.
pub const MAX_MONEY: u64 = 2_000_000_000 * COIN;

/// Easiest allowed proof-of-work target. Trust formulas use this as the
/// work-trust base in the current regime.
pub const POW_TARGET_LIMIT: u64 = u64::MAX >> 4;

/// Base for proof-of-stake block trust, standing in for 2^256 over the
/// 64-bit compact target domain. Only the ordering of trust values matters.
pub const STAKE_TRUST_BASE: u128 = u128::MAX;

/// Block timestamp after which the current trust regime applies; earlier
/// blocks are scored under the legacy regime.
pub const PROTOCOL_SWITCH_TIME: u64 = 1_600_000_000;

/// Number of preceding blocks scanned when classifying a block's trust
/// contribution in the current regime.
pub const TRUST_SCAN_WINDOW: u64 = 12;

/// Confirmations required before a coinbase or coinstake output may be spent.
pub const COINBASE_MATURITY: u64 = 100;

/// Lock-time values below this are block heights; at or above, timestamps.
pub const LOCKTIME_THRESHOLD: u64 = 500_000_000;

/// Maximum seconds a block timestamp may sit ahead of its parent's.
pub const MAX_FORWARD_DRIFT: u64 = 2 * 60 * 60;

/// Ceiling on cumulative signature operations per block, including
/// pay-to-script-hash redeem-script sigops.
pub const MAX_BLOCK_SIGOPS: u32 = 20_000;

pub const MAX_BLOCK_SIZE: usize = 1_048_576;
pub const MAX_TX_SIZE: usize = 100_000;
pub const MAX_COINBASE_DATA: usize = 100;
pub const MIN_TX_FEE: u64 = CENT;

/// Cap on coins minted by a single proof-of-work block, before fees.
pub const MAX_MINT_PROOF_OF_WORK: u64 = 9_999 * COIN;

/// Minimum age before an output accrues stake weight.
pub const STAKE_MIN_AGE: u64 = 30 * 24 * 60 * 60;
/// Age past which an output accrues no further stake weight.
pub const STAKE_MAX_AGE: u64 = 90 * 24 * 60 * 60;

/// Seconds between stake modifier recomputations. Within one interval the
/// previous modifier is reused unchanged.
pub const MODIFIER_INTERVAL: u64 = 6 * 60 * 60;

/// Shrink ratio for the per-round selection interval sections.
pub const MODIFIER_INTERVAL_RATIO: u64 = 3;

/// Height at and after which a block's entropy bit is the low bit of its
/// hash. Below it, the bit comes from [`ENTROPY_BIT_TABLE`].
pub const ENTROPY_SWITCH_HEIGHT: u64 = 64;

/// Pregenerated entropy bits for blocks below [`ENTROPY_SWITCH_HEIGHT`],
/// one bit per height starting at bit 0.
pub const ENTROPY_BIT_TABLE: u64 = 0x4DEB_91C0_A274_6F35;

/// Hard-coded checkpoints: (height, block_hash) pairs.
///
/// A block at a checkpoint height whose hash differs is rejected outright.
/// Currently only genesis-adjacent entries; populated as the network
/// produces known-good blocks.
pub const CHECKPOINTS: &[(u64, [u8; 32])] = &[];

/// Hard-coded stake modifier checksums: (height, checksum) pairs, verified
/// as entries are accepted. A mismatch is fatal for the block.
pub const MODIFIER_CHECKPOINTS: &[(u64, u32)] = &[];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_constants_consistent() {
        assert_eq!(COIN / CENT, 100);
        assert!(MAX_MINT_PROOF_OF_WORK < MAX_MONEY);
        assert!(MIN_TX_FEE < COIN);
    }

    #[test]
    fn stake_age_window_ordered() {
        assert!(STAKE_MIN_AGE < STAKE_MAX_AGE);
    }

    #[test]
    fn pow_limit_below_u64_max() {
        // Leaves headroom so target+1 never overflows in trust math.
        assert!(POW_TARGET_LIMIT < u64::MAX);
    }

    #[test]
    fn entropy_table_covers_switch_window() {
        // One bit per height below the switch fits in the u64 table.
        assert!(ENTROPY_SWITCH_HEIGHT <= 64);
    }

    #[test]
    fn locktime_threshold_is_canonical() {
        assert_eq!(LOCKTIME_THRESHOLD, 500_000_000);
    }
}
