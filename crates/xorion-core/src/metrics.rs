//! Network metric derivations.
//!
//! Pure functions over values read from chain state; the chain crate does
//! the querying and hands the raw inputs to [`derive_metrics`].

use primitive_types::U256;

use crate::apy::staking_apr_percent;
use crate::display::format_balance;
use crate::types::{Balance, BlockNumber, ChainProperties, NetworkMetrics, TransactionActivity};

/// Fraction digits used for the formatted total value locked.
const TVL_FRACTION_DIGITS: usize = 2;

/// Raw chain readings feeding one metrics snapshot.
#[derive(Debug, Clone, Default)]
pub struct MetricsInputs {
    pub total_validators: u32,
    /// Validators in the current session set.
    pub validators_online: u32,
    /// `active` field of every staking ledger.
    pub ledger_active_stakes: Vec<Balance>,
    pub finalized_height: BlockNumber,
    /// Validator payout and total stake of the last completed era.
    pub last_era_reward: Option<Balance>,
    pub last_era_total_stake: Option<Balance>,
    pub era_duration_ms: u64,
    /// `Timestamp.Now` at the head and at `block_span` blocks earlier.
    pub head_timestamp_ms: Option<u64>,
    pub past_timestamp_ms: Option<u64>,
    pub block_span: u32,
}

/// Percentage of validators online, rounded, 0 when there are none.
pub fn network_health_percent(online: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (online as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Exact sum of stakes in a 256-bit accumulator.
pub fn sum_stakes<I>(stakes: I) -> U256
where
    I: IntoIterator<Item = Balance>,
{
    stakes
        .into_iter()
        .fold(U256::zero(), |acc, stake| acc.saturating_add(U256::from(stake)))
}

/// Average seconds per block between two timestamps `span` blocks apart.
pub fn average_block_time_secs(head_ms: u64, past_ms: u64, span: u32) -> f64 {
    if span == 0 || head_ms <= past_ms {
        return 0.0;
    }
    let secs = (head_ms - past_ms) as f64 / 1000.0 / span as f64;
    (secs * 100.0).round() / 100.0
}

/// Build a metrics snapshot from raw readings.
///
/// Transaction counts come from the most recent activity window, if any.
pub fn derive_metrics(
    inputs: &MetricsInputs,
    properties: &ChainProperties,
    activity: Option<&TransactionActivity>,
    now_ms: u64,
) -> NetworkMetrics {
    let tvl_raw = sum_stakes(inputs.ledger_active_stakes.iter().copied()).to_string();
    let total_value_locked = format_balance(&tvl_raw, properties.token_decimals, TVL_FRACTION_DIGITS);

    let staking_apr = match (inputs.last_era_reward, inputs.last_era_total_stake) {
        (Some(reward), Some(stake)) => staking_apr_percent(reward, stake, inputs.era_duration_ms),
        _ => 0.0,
    };

    let avg_block_time_secs = match (inputs.head_timestamp_ms, inputs.past_timestamp_ms) {
        (Some(head), Some(past)) => average_block_time_secs(head, past, inputs.block_span),
        _ => 0.0,
    };

    NetworkMetrics {
        validators_online: inputs.validators_online,
        total_validators: inputs.total_validators,
        staking_apr,
        avg_block_time_secs,
        total_transactions: activity.map(|a| a.signed_transaction_count()).unwrap_or(0),
        total_value_locked,
        total_value_locked_raw: tvl_raw,
        network_health_percent: network_health_percent(inputs.validators_online, inputs.total_validators),
        active_addresses: activity.map(|a| a.active_addresses()).unwrap_or(0),
        finalized_height: inputs.finalized_height,
        last_updated_ms: now_ms,
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_health_percent_in_range(online in any::<u32>(), total in any::<u32>()) {
            let pct = network_health_percent(online, total);
            prop_assert!(pct <= 100);
            if total == 0 {
                prop_assert_eq!(pct, 0);
            }
        }

        #[test]
        fn test_sum_matches_pairwise(a in any::<u64>(), b in any::<u64>()) {
            let total = sum_stakes([a as u128, b as u128]);
            prop_assert_eq!(total, U256::from(a as u128 + b as u128));
        }
    }
}
