//! Session and timestamp queries.

use subxt::dynamic::DecodedValueThunk;
use subxt::utils::H256;

use crate::client::{ChainClient, to_field_value};
use crate::error::ChainError;
use crate::rpc::{AccountBytes, BlockHash, FieldValue};

impl ChainClient {
    /// Get the validator set of the current session.
    pub async fn get_session_validators(&self) -> Result<Vec<AccountBytes>, ChainError> {
        let storage_query = subxt::dynamic::storage("Session", "Validators", ());

        let result: Option<DecodedValueThunk> = self
            .client()
            .storage()
            .at_latest()
            .await?
            .fetch(&storage_query)
            .await?;

        let Some(value) = result else {
            return Ok(Vec::new());
        };

        // Vec<AccountId32>
        let validators = match to_field_value(value.to_value()?) {
            FieldValue::Composite(fields) => fields
                .iter()
                .filter_map(|f| f.value.as_account())
                .collect(),
            other => other.as_account().into_iter().collect(),
        };
        Ok(validators)
    }

    /// Get `Timestamp.Now` as of a given block.
    pub async fn get_timestamp_at(&self, hash: BlockHash) -> Result<Option<u64>, ChainError> {
        let storage_query = subxt::dynamic::storage("Timestamp", "Now", ());

        let result: Option<DecodedValueThunk> = self
            .client()
            .storage()
            .at(H256::from(hash))
            .fetch(&storage_query)
            .await?;

        Ok(result
            .and_then(|v| v.to_value().ok())
            .and_then(|v| v.as_u128())
            .map(|now| now as u64))
    }
}
