//! Staking return calculations.

use crate::types::Balance;

/// Milliseconds per year (accounting for leap years).
pub const MS_PER_YEAR: f64 = 365.24219 * 24.0 * 60.0 * 60.0 * 1000.0;

/// Default era duration when the runtime does not expose one (24 hours).
pub const DEFAULT_ERA_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

/// Calculate APY from era reward data.
///
/// ```text
/// erasInAYear = MS_PER_YEAR / eraDurationInMs
/// rewardPct = eraReward / invested
/// APY = (1 + rewardPct)^erasInAYear - 1
/// ```
///
/// # Returns
/// APY as a decimal (e.g., 0.15 for 15%)
pub fn get_era_apy(era_reward: Balance, invested: Balance, era_duration_ms: u64) -> f64 {
    if invested == 0 || era_duration_ms == 0 {
        return 0.0;
    }

    let eras_in_year = MS_PER_YEAR / era_duration_ms as f64;
    let reward_pct = era_reward as f64 / invested as f64;

    (1.0 + reward_pct).powf(eras_in_year) - 1.0
}

/// Network-wide staking APR in percent, rounded to two decimals.
///
/// Uses the last completed era's total validator payout against the total
/// stake exposed in that era.
pub fn staking_apr_percent(era_reward: Balance, total_stake: Balance, era_duration_ms: u64) -> f64 {
    let apy = get_era_apy(era_reward, total_stake, era_duration_ms);
    if !apy.is_finite() {
        return 0.0;
    }
    (apy * 10_000.0).round() / 100.0
}
