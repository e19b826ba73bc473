//! Staking pallet queries.

use subxt::dynamic::{At, DecodedValueThunk, Value};
use xorion_core::Balance;

use crate::client::ChainClient;
use crate::error::ChainError;
use crate::rpc::AccountBytes;

impl ChainClient {
    /// Get every registered validator stash.
    pub async fn get_validators(&self) -> Result<Vec<AccountBytes>, ChainError> {
        let storage_query = subxt::dynamic::storage("Staking", "Validators", ());

        let mut validators = Vec::new();
        let mut iter = self
            .client()
            .storage()
            .at_latest()
            .await?
            .iter(storage_query)
            .await?;

        while let Some(result) = iter.next().await {
            let kv = result?;
            // Twox64Concat(AccountId): the account is the key suffix.
            if let Some(account) = account_suffix(&kv.key_bytes) {
                validators.push(account);
            }
        }

        tracing::debug!("Found {} registered validators", validators.len());
        Ok(validators)
    }

    /// Get the `active` balance of every staking ledger.
    pub async fn get_ledger_active_stakes(&self) -> Result<Vec<Balance>, ChainError> {
        let storage_query = subxt::dynamic::storage("Staking", "Ledger", ());

        let mut stakes = Vec::new();
        let mut iter = self
            .client()
            .storage()
            .at_latest()
            .await?
            .iter(storage_query)
            .await?;

        while let Some(result) = iter.next().await {
            let kv = result?;
            let value: DecodedValueThunk = kv.value;
            let decoded = value.to_value()?;

            // StakingLedger = { stash, total, active, unlocking, .. }
            let active = decoded
                .at("active")
                .and_then(|v: &Value<u32>| v.as_u128())
                .unwrap_or(0);
            stakes.push(active);
        }

        Ok(stakes)
    }

    /// Get the total validator reward for an era.
    pub async fn get_era_validator_reward(&self, era: u32) -> Result<Option<Balance>, ChainError> {
        self.fetch_era_balance("ErasValidatorReward", era).await
    }

    /// Get the total stake backing validators in an era.
    pub async fn get_era_total_stake(&self, era: u32) -> Result<Option<Balance>, ChainError> {
        self.fetch_era_balance("ErasTotalStake", era).await
    }

    async fn fetch_era_balance(&self, entry: &str, era: u32) -> Result<Option<Balance>, ChainError> {
        let storage_query =
            subxt::dynamic::storage("Staking", entry, vec![Value::u128(era as u128)]);

        let result: Option<DecodedValueThunk> = self
            .client()
            .storage()
            .at_latest()
            .await?
            .fetch(&storage_query)
            .await?;

        Ok(result
            .and_then(|v| v.to_value().ok())
            .and_then(|v| v.as_u128()))
    }
}

pub(crate) fn account_suffix(key_bytes: &[u8]) -> Option<AccountBytes> {
    key_bytes
        .len()
        .checked_sub(32)
        .and_then(|start| key_bytes[start..].try_into().ok())
}
