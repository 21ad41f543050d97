//! Block reward computation.
//!
//! Work blocks earn a subsidy that falls with the fourth root of
//! difficulty: sixteen times the difficulty halves the payout. Stake
//! blocks earn interest on coin-age, roughly one percent per coin-year.

use crate::constants::{
    CENT, COIN, MAX_MINT_PROOF_OF_WORK, POW_TARGET_LIMIT, STAKE_MAX_AGE, STAKE_MIN_AGE,
};

const SECONDS_PER_DAY: u128 = 24 * 60 * 60;

/// Proof-of-work subsidy for a block mined at the given difficulty target.
///
/// The subsidy `s` satisfies `s^4 / limit^4 = target / target_limit`,
/// found by binary search over whole cents. Targets are scaled down by
/// 2^16 so the fourth powers stay inside u128.
pub fn pow_reward(difficulty_target: u64) -> u64 {
    let limit_cents = (MAX_MINT_PROOF_OF_WORK / CENT) as u128;
    let scaled_limit = (POW_TARGET_LIMIT >> 16) as u128;
    let rhs = limit_cents.pow(4) * ((difficulty_target >> 16) as u128);

    let mut lower: u128 = 1;
    let mut upper = limit_cents;
    while upper - lower > 1 {
        let mid = (lower + upper) / 2;
        if mid.pow(4) * scaled_limit > rhs {
            upper = mid;
        } else {
            lower = mid;
        }
    }

    let subsidy = upper as u64 * CENT;
    subsidy.min(MAX_MINT_PROOF_OF_WORK)
}

/// Stake reward for the given coin-age, in coin-days.
///
/// Pays 33/(365 * 33 + 8) of a cent per coin-day, an effective annual
/// rate of one percent with the leap-year correction baked in.
pub fn stake_reward(coin_days: u64) -> u64 {
    ((coin_days as u128 * 33 * CENT as u128) / (365 * 33 + 8)) as u64
}

/// Cent-seconds earned by an output of `value` held from `from_time` to
/// `to_time`.
///
/// Outputs younger than the minimum stake age earn nothing; the counted
/// holding period is capped at the maximum stake age.
pub fn cent_seconds(value: u64, from_time: u64, to_time: u64) -> u128 {
    if to_time < from_time + STAKE_MIN_AGE {
        return 0;
    }
    let span = (to_time - from_time).min(STAKE_MAX_AGE);
    value as u128 * span as u128 / CENT as u128
}

/// Aggregate accumulated cent-seconds into whole coin-days.
pub fn coin_days(cent_seconds: u128) -> u64 {
    (cent_seconds * CENT as u128 / COIN as u128 / SECONDS_PER_DAY) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Proof-of-work subsidy ---

    #[test]
    fn pow_reward_at_target_limit_is_max_mint() {
        assert_eq!(pow_reward(POW_TARGET_LIMIT), MAX_MINT_PROOF_OF_WORK);
    }

    #[test]
    fn pow_reward_decreases_with_difficulty() {
        let easy = pow_reward(POW_TARGET_LIMIT);
        let harder = pow_reward(POW_TARGET_LIMIT / 16);
        let hardest = pow_reward(POW_TARGET_LIMIT / 256);
        assert!(easy > harder);
        assert!(harder > hardest);
    }

    #[test]
    fn pow_reward_halves_every_sixteenfold_difficulty() {
        // s^4 proportional to target: target/16 halves the subsidy.
        let base = pow_reward(POW_TARGET_LIMIT);
        let halved = pow_reward(POW_TARGET_LIMIT / 16);
        let delta = (base as i64 / 2 - halved as i64).abs();
        // Whole-cent quantization allows a cent of slack.
        assert!(delta <= CENT as i64, "base {base}, halved {halved}");
    }

    #[test]
    fn pow_reward_is_whole_cents() {
        for target in [POW_TARGET_LIMIT, POW_TARGET_LIMIT / 7, POW_TARGET_LIMIT / 1000] {
            assert_eq!(pow_reward(target) % CENT, 0);
        }
    }

    #[test]
    fn pow_reward_never_exceeds_mint_limit() {
        for target in [0, 1, POW_TARGET_LIMIT / 2, POW_TARGET_LIMIT] {
            assert!(pow_reward(target) <= MAX_MINT_PROOF_OF_WORK);
        }
    }

    // --- Stake reward ---

    #[test]
    fn stake_reward_zero_coin_days() {
        assert_eq!(stake_reward(0), 0);
    }

    #[test]
    fn stake_reward_one_coin_year_is_one_percent() {
        // 365 coin-days on one coin pays out just under one cent.
        let reward = stake_reward(365);
        assert!(reward <= CENT);
        assert!(reward >= CENT * 99 / 100);
    }

    #[test]
    fn stake_reward_scales_linearly() {
        assert_eq!(stake_reward(2000), 2 * stake_reward(1000));
    }

    // --- Coin age ---

    #[test]
    fn cent_seconds_below_min_age_is_zero() {
        let t0 = 1_700_000_000;
        assert_eq!(cent_seconds(COIN, t0, t0 + STAKE_MIN_AGE - 1), 0);
        assert!(cent_seconds(COIN, t0, t0 + STAKE_MIN_AGE) > 0);
    }

    #[test]
    fn cent_seconds_capped_at_max_age() {
        let t0 = 1_700_000_000;
        let capped = cent_seconds(COIN, t0, t0 + STAKE_MAX_AGE);
        assert_eq!(cent_seconds(COIN, t0, t0 + STAKE_MAX_AGE * 3), capped);
    }

    #[test]
    fn coin_days_from_one_coin_one_day() {
        // One coin held exactly one day past nothing: value * 86400 / CENT
        // cent-seconds aggregate back to one coin-day.
        let cs = COIN as u128 * SECONDS_PER_DAY / CENT as u128;
        assert_eq!(coin_days(cs), 1);
    }

    #[test]
    fn coin_days_rounds_down() {
        let cs = COIN as u128 * (SECONDS_PER_DAY - 1) / CENT as u128;
        assert_eq!(coin_days(cs), 0);
    }
}
