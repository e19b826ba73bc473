//! Live chain client over subxt.
//!
//! Raw JSON-RPC covers headers, hashes and node properties; block bodies,
//! events and storage go through subxt's metadata-driven decoding.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as Json;
use subxt::backend::rpc::RpcClient;
use subxt::ext::scale_value::{Composite, Primitive, Value, ValueDef};
use subxt::ext::subxt_rpcs::client::{RpcParams, rpc_params};
use subxt::utils::H256;
use subxt::{OnlineClient, PolkadotConfig};
use xorion_core::{Balance, BlockNumber, ChainProperties};

use crate::codec::decode_era;
use crate::error::ChainError;
use crate::rpc::{
    AccountBytes, ActiveEra, BlockHash, ChainRpc, Connector, EventPhase, FieldValue, NamedField,
    RawBlock, RawEvent, RawExtrinsic, RawHeader,
};

/// A connected node.
pub struct ChainClient {
    endpoint: String,
    rpc: RpcClient,
    client: OnlineClient<PolkadotConfig>,
}

impl ChainClient {
    /// Open a WebSocket connection and load the runtime metadata.
    pub async fn connect(endpoint: &str) -> Result<Self, ChainError> {
        tracing::info!("Trying {}", endpoint);

        let rpc = RpcClient::from_url(endpoint)
            .await
            .map_err(|e| ChainError::Connection(format!("{}: {}", endpoint, e)))?;
        let client = OnlineClient::<PolkadotConfig>::from_rpc_client(rpc.clone())
            .await
            .map_err(|e| ChainError::Connection(format!("{}: {}", endpoint, e)))?;

        if let Ok(name) = rpc
            .request::<String>("system_chain", rpc_params![])
            .await
        {
            tracing::info!("Connected to {} via {}", name, endpoint);
        } else {
            tracing::info!("Connected via {}", endpoint);
        }

        let runtime = client.runtime_version();
        tracing::debug!(
            "Runtime version {} (tx version {})",
            runtime.spec_version,
            runtime.transaction_version
        );

        Ok(Self {
            endpoint: endpoint.to_string(),
            rpc,
            client,
        })
    }

    /// Get the underlying subxt client.
    pub fn client(&self) -> &OnlineClient<PolkadotConfig> {
        &self.client
    }

    async fn request(
        &self,
        method: &str,
        params: RpcParams,
    ) -> Result<Json, ChainError> {
        self.rpc
            .request::<Json>(method, params)
            .await
            .map_err(|e| ChainError::Rpc(format!("{}: {}", method, e)))
    }

    async fn load_extrinsics(&self, hash: BlockHash) -> Result<Vec<RawExtrinsic>, ChainError> {
        let block = self.client.blocks().at(H256::from(hash)).await?;
        let extrinsics = block.extrinsics().await?;

        let mut out = Vec::new();
        for ext in extrinsics.iter() {
            let bytes = ext.bytes();
            let args = match ext.field_values() {
                Ok(fields) => composite_fields(fields),
                Err(e) => {
                    tracing::debug!("Undecodable args at extrinsic {}: {}", ext.index(), e);
                    Vec::new()
                }
            };
            let extensions = ext.transaction_extensions();

            out.push(RawExtrinsic {
                index: ext.index(),
                hash: sp_crypto_hashing::blake2_256(bytes),
                pallet: ext.pallet_name()?.to_string(),
                call: ext.variant_name()?.to_string(),
                signer: ext.address_bytes().and_then(signer_from_address),
                args,
                nonce: extensions.as_ref().and_then(|e| e.nonce()),
                tip: extensions.as_ref().and_then(|e| e.tip()),
                era: extensions.as_ref().and_then(|e| {
                    e.iter()
                        .find(|x| x.name() == "CheckMortality")
                        .and_then(|x| decode_era(x.bytes()))
                }),
                signature: ext.signature_bytes().map(strip_signature_variant),
                encoded_len: bytes.len(),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl ChainRpc for ChainClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn ping(&self) -> Result<(), ChainError> {
        self.request("system_health", rpc_params![]).await?;
        Ok(())
    }

    async fn properties(&self, fallback: &ChainProperties) -> Result<ChainProperties, ChainError> {
        let json = self
            .request("system_properties", rpc_params![])
            .await?;
        Ok(parse_properties(&json, fallback))
    }

    async fn finalized_head(&self) -> Result<BlockHash, ChainError> {
        let json = self
            .request("chain_getFinalizedHead", rpc_params![])
            .await?;
        json.as_str()
            .ok_or_else(|| ChainError::InvalidData("finalized head is not a string".into()))
            .and_then(parse_hash)
    }

    async fn header(&self, hash: BlockHash) -> Result<RawHeader, ChainError> {
        let json = self
            .request("chain_getHeader", rpc_params![hex_param(&hash)])
            .await?;
        parse_header(&json, hash)
    }

    async fn block_hash(&self, number: BlockNumber) -> Result<Option<BlockHash>, ChainError> {
        let json = self
            .request("chain_getBlockHash", rpc_params![number])
            .await?;
        json.as_str().map(parse_hash).transpose()
    }

    async fn block(&self, hash: BlockHash) -> Result<RawBlock, ChainError> {
        let (header, extrinsics) = tokio::try_join!(self.header(hash), self.load_extrinsics(hash))?;
        Ok(RawBlock { header, extrinsics })
    }

    async fn events(&self, hash: BlockHash) -> Result<Vec<RawEvent>, ChainError> {
        let events = self.client.events().at(H256::from(hash)).await?;

        let mut out = Vec::new();
        for event in events.iter() {
            let event = event?;
            let phase = match event.phase() {
                subxt::events::Phase::ApplyExtrinsic(i) => EventPhase::ApplyExtrinsic(i),
                subxt::events::Phase::Finalization => EventPhase::Finalization,
                subxt::events::Phase::Initialization => EventPhase::Initialization,
            };
            out.push(RawEvent {
                phase,
                pallet: event.pallet_name().to_string(),
                variant: event.variant_name().to_string(),
                fields: composite_fields(event.field_values()?),
            });
        }
        Ok(out)
    }

    async fn validators(&self) -> Result<Vec<AccountBytes>, ChainError> {
        self.get_validators().await
    }

    async fn session_validators(&self) -> Result<Vec<AccountBytes>, ChainError> {
        self.get_session_validators().await
    }

    async fn active_era(&self) -> Result<Option<ActiveEra>, ChainError> {
        self.get_active_era().await
    }

    async fn era_duration_ms(&self) -> Result<u64, ChainError> {
        self.get_era_duration_ms().await
    }

    async fn ledger_active_stakes(&self) -> Result<Vec<Balance>, ChainError> {
        self.get_ledger_active_stakes().await
    }

    async fn era_validator_reward(&self, era: u32) -> Result<Option<Balance>, ChainError> {
        self.get_era_validator_reward(era).await
    }

    async fn era_total_stake(&self, era: u32) -> Result<Option<Balance>, ChainError> {
        self.get_era_total_stake(era).await
    }

    async fn timestamp_at(&self, hash: BlockHash) -> Result<Option<u64>, ChainError> {
        self.get_timestamp_at(hash).await
    }

    async fn close(&self) {
        // The socket closes once the last handle to the client drops.
        tracing::debug!("Releasing client for {}", self.endpoint);
    }
}

/// Opens [`ChainClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubxtConnector;

#[async_trait]
impl Connector for SubxtConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainRpc>, ChainError> {
        let client = ChainClient::connect(endpoint).await?;
        Ok(Arc::new(client))
    }
}

fn hex_param(hash: &BlockHash) -> String {
    format!("0x{}", hex::encode(hash))
}

fn parse_hash(text: &str) -> Result<BlockHash, ChainError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    let mut hash = [0u8; 32];
    hex::decode_to_slice(digits, &mut hash)
        .map_err(|e| ChainError::InvalidData(format!("bad hash {}: {}", text, e)))?;
    Ok(hash)
}

fn parse_header(json: &Json, hash: BlockHash) -> Result<RawHeader, ChainError> {
    let number = json
        .get("number")
        .and_then(Json::as_str)
        .and_then(|n| u32::from_str_radix(n.trim_start_matches("0x"), 16).ok())
        .ok_or_else(|| ChainError::InvalidData("header without number".into()))?;
    let parent_hash = json
        .get("parentHash")
        .and_then(Json::as_str)
        .ok_or_else(|| ChainError::InvalidData("header without parentHash".into()))
        .and_then(parse_hash)?;
    let digest_logs = json
        .pointer("/digest/logs")
        .and_then(Json::as_array)
        .map(|logs| {
            logs.iter()
                .filter_map(Json::as_str)
                .filter_map(|log| hex::decode(log.trim_start_matches("0x")).ok())
                .collect()
        })
        .unwrap_or_default();

    Ok(RawHeader {
        number,
        hash,
        parent_hash,
        digest_logs,
    })
}

/// Nodes report `tokenSymbol`/`tokenDecimals` either as a scalar or as a
/// list whose first entry is the native token.
fn parse_properties(json: &Json, fallback: &ChainProperties) -> ChainProperties {
    fn first(value: Option<&Json>) -> Option<&Json> {
        match value {
            Some(Json::Array(items)) => items.first(),
            other => other,
        }
    }

    ChainProperties {
        token_symbol: first(json.get("tokenSymbol"))
            .and_then(Json::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| fallback.token_symbol.clone()),
        token_decimals: first(json.get("tokenDecimals"))
            .and_then(Json::as_u64)
            .and_then(|d| u8::try_from(d).ok())
            .unwrap_or(fallback.token_decimals),
        ss58_format: json
            .get("ss58Format")
            .and_then(Json::as_u64)
            .and_then(|f| u16::try_from(f).ok())
            .unwrap_or(fallback.ss58_format),
    }
}

/// `MultiAddress::Id` (variant 0) or a bare `AccountId32`.
fn signer_from_address(bytes: &[u8]) -> Option<AccountBytes> {
    match bytes.len() {
        33 if bytes[0] == 0 => bytes[1..].try_into().ok(),
        32 => bytes.try_into().ok(),
        _ => None,
    }
}

/// Drop the `MultiSignature` variant byte.
fn strip_signature_variant(bytes: &[u8]) -> Vec<u8> {
    match bytes.len() {
        65 | 66 => bytes[1..].to_vec(),
        _ => bytes.to_vec(),
    }
}

pub(crate) fn composite_fields(composite: Composite<u32>) -> Vec<NamedField> {
    match composite {
        Composite::Named(fields) => fields
            .into_iter()
            .map(|(name, value)| NamedField {
                name: Some(name),
                value: to_field_value(value),
            })
            .collect(),
        Composite::Unnamed(values) => values
            .into_iter()
            .map(|value| NamedField::unnamed(to_field_value(value)))
            .collect(),
    }
}

/// Byte string held by an unnamed composite of `u8`s.
fn byte_sequence(composite: &Composite<u32>) -> Option<Vec<u8>> {
    let Composite::Unnamed(values) = composite else {
        return None;
    };
    if values.is_empty() {
        return None;
    }
    values
        .iter()
        .map(|v| match &v.value {
            ValueDef::Primitive(Primitive::U128(n)) => u8::try_from(*n).ok(),
            _ => None,
        })
        .collect()
}

pub(crate) fn to_field_value(value: Value<u32>) -> FieldValue {
    match value.value {
        ValueDef::Primitive(Primitive::Bool(b)) => FieldValue::Bool(b),
        ValueDef::Primitive(Primitive::U128(n)) => FieldValue::Number(n),
        ValueDef::Primitive(Primitive::I128(n)) => match u128::try_from(n) {
            Ok(n) => FieldValue::Number(n),
            Err(_) => FieldValue::Text(n.to_string()),
        },
        ValueDef::Primitive(Primitive::String(s)) => FieldValue::Text(s),
        ValueDef::Primitive(Primitive::Char(c)) => FieldValue::Text(c.to_string()),
        ValueDef::Primitive(Primitive::U256(bytes)) | ValueDef::Primitive(Primitive::I256(bytes)) => {
            FieldValue::Bytes(bytes.to_vec())
        }
        ValueDef::BitSequence(bits) => FieldValue::Text(format!("{:?}", bits)),
        ValueDef::Variant(variant) => FieldValue::Variant {
            name: variant.name,
            fields: composite_fields(variant.values),
        },
        ValueDef::Composite(composite) => {
            if let Some(bytes) = byte_sequence(&composite) {
                return FieldValue::Bytes(bytes);
            }
            // AccountId32 decodes as a newtype around 32 bytes.
            if let Composite::Unnamed(values) = &composite
                && let [inner] = values.as_slice()
                && let ValueDef::Composite(inner) = &inner.value
                && let Some(bytes) = byte_sequence(inner)
                && let Ok(account) = <[u8; 32]>::try_from(bytes.as_slice())
            {
                return FieldValue::Account(account);
            }
            FieldValue::Composite(composite_fields(composite))
        }
    }
}
