//! Era queries.

use subxt::dynamic::{At, DecodedValueThunk, Value};
use xorion_core::DEFAULT_ERA_DURATION_MS;

use crate::client::ChainClient;
use crate::error::ChainError;
use crate::rpc::ActiveEra;

impl ChainClient {
    /// Get the active era, if staking has started.
    pub async fn get_active_era(&self) -> Result<Option<ActiveEra>, ChainError> {
        let storage_query = subxt::dynamic::storage("Staking", "ActiveEra", ());

        let result: Option<DecodedValueThunk> = self
            .client()
            .storage()
            .at_latest()
            .await?
            .fetch(&storage_query)
            .await?;

        let Some(value) = result else {
            tracing::debug!("ActiveEra storage returned None");
            return Ok(None);
        };

        let decoded = value.to_value()?;

        // ActiveEraInfo = { index: u32, start: Option<u64> }
        let index = decoded
            .at("index")
            .ok_or_else(|| ChainError::InvalidData("Missing era index".into()))?
            .as_u128()
            .ok_or_else(|| ChainError::InvalidData("Invalid era index".into()))?
            as u32;

        let start_ms = decoded
            .at("start")
            .and_then(|v: &Value<u32>| v.at(0))
            .and_then(|v: &Value<u32>| v.as_u128())
            .map(|ms| ms as u64);

        Ok(Some(ActiveEra { index, start_ms }))
    }

    /// Era length in milliseconds.
    ///
    /// BABE chains derive it from `SessionsPerEra * EpochDuration *
    /// ExpectedBlockTime`. Otherwise `MaxEraDuration` caps the one-day
    /// default.
    pub async fn get_era_duration_ms(&self) -> Result<u64, ChainError> {
        if let (Ok(sessions_per_era), Ok(epoch_duration), Ok(expected_block_time)) = (
            self.get_constant_u32("Staking", "SessionsPerEra"),
            self.get_constant_u64("Babe", "EpochDuration"),
            self.get_constant_u64("Babe", "ExpectedBlockTime"),
        ) {
            return Ok(sessions_per_era as u64 * epoch_duration * expected_block_time);
        }

        if let Ok(max_era) = self.get_constant_u64("Staking", "MaxEraDuration")
            && max_era > 0
        {
            return Ok(DEFAULT_ERA_DURATION_MS.min(max_era));
        }

        tracing::warn!("Could not determine era duration from chain, using 24 hour default");
        Ok(DEFAULT_ERA_DURATION_MS)
    }

    fn get_constant_u32(&self, pallet: &str, name: &str) -> Result<u32, ChainError> {
        self.get_constant_u128(pallet, name).map(|v| v as u32)
    }

    fn get_constant_u64(&self, pallet: &str, name: &str) -> Result<u64, ChainError> {
        self.get_constant_u128(pallet, name).map(|v| v as u64)
    }

    fn get_constant_u128(&self, pallet: &str, name: &str) -> Result<u128, ChainError> {
        let constant = subxt::dynamic::constant(pallet, name);
        let value = self.client().constants().at(&constant)?;
        let decoded = value.to_value()?;
        decoded.as_u128().ok_or_else(|| {
            ChainError::InvalidData(format!("Invalid constant {}::{}", pallet, name))
        })
    }
}
