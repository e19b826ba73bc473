//! Transport seam between the explorer services and a chain node.
//!
//! Everything above this module talks to a node through [`ChainRpc`] and
//! the neutral raw types defined here, so the services never see subxt
//! types. The live implementation is [`crate::client::ChainClient`].

use std::sync::Arc;

use async_trait::async_trait;
use xorion_core::{Balance, BlockNumber, ChainProperties, Era};

use crate::error::ChainError;
use crate::ss58::{encode_ss58, hex_hash};

pub type BlockHash = [u8; 32];
pub type AccountBytes = [u8; 32];

/// A decoded call argument or event field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Account(AccountBytes),
    Number(u128),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Composite(Vec<NamedField>),
    Variant { name: String, fields: Vec<NamedField> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedField {
    pub name: Option<String>,
    pub value: FieldValue,
}

impl NamedField {
    pub fn named(name: &str, value: FieldValue) -> Self {
        Self {
            name: Some(name.to_string()),
            value,
        }
    }

    pub fn unnamed(value: FieldValue) -> Self {
        Self { name: None, value }
    }
}

impl FieldValue {
    /// Account behind this value, looking through `MultiAddress::Id` and
    /// single-field wrappers.
    pub fn as_account(&self) -> Option<AccountBytes> {
        match self {
            FieldValue::Account(account) => Some(*account),
            FieldValue::Variant { name, fields } if name == "Id" && fields.len() == 1 => {
                fields[0].value.as_account()
            }
            FieldValue::Composite(fields) if fields.len() == 1 => fields[0].value.as_account(),
            _ => None,
        }
    }

    /// Numeric value, looking through single-field wrappers such as `Compact`.
    pub fn as_amount(&self) -> Option<u128> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Composite(fields) if fields.len() == 1 => fields[0].value.as_amount(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Human-readable rendering; accounts use the chain's SS58 prefix.
    pub fn render(&self, ss58_format: u16) -> String {
        match self {
            FieldValue::Account(account) => encode_ss58(account, ss58_format),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Text(text) => text.clone(),
            FieldValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
            FieldValue::Composite(fields) => render_fields(fields, ss58_format),
            FieldValue::Variant { name, fields } if fields.is_empty() => name.clone(),
            FieldValue::Variant { name, fields } => {
                // Single-account addresses read better without the wrapper.
                if let Some(account) = self.as_account() {
                    return encode_ss58(&account, ss58_format);
                }
                format!("{}{}", name, render_fields(fields, ss58_format))
            }
        }
    }
}

fn render_fields(fields: &[NamedField], ss58_format: u16) -> String {
    if fields.iter().all(|f| f.name.is_some()) && !fields.is_empty() {
        let inner: Vec<String> = fields
            .iter()
            .map(|f| {
                format!(
                    "{}: {}",
                    f.name.as_deref().unwrap_or_default(),
                    f.value.render(ss58_format)
                )
            })
            .collect();
        format!("{{ {} }}", inner.join(", "))
    } else {
        let inner: Vec<String> = fields.iter().map(|f| f.value.render(ss58_format)).collect();
        format!("({})", inner.join(", "))
    }
}

/// Block header fields the explorer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    pub number: BlockNumber,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    /// SCALE-encoded digest items.
    pub digest_logs: Vec<Vec<u8>>,
}

/// One extrinsic of a block, decoded against the runtime metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtrinsic {
    pub index: u32,
    /// blake2-256 of the encoded extrinsic.
    pub hash: BlockHash,
    pub pallet: String,
    pub call: String,
    pub signer: Option<AccountBytes>,
    pub args: Vec<NamedField>,
    pub nonce: Option<u64>,
    pub tip: Option<Balance>,
    pub era: Option<Era>,
    pub signature: Option<Vec<u8>>,
    pub encoded_len: usize,
}

impl RawExtrinsic {
    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    pub fn arg(&self, name: &str) -> Option<&FieldValue> {
        self.args
            .iter()
            .find(|f| f.name.as_deref() == Some(name))
            .map(|f| &f.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub header: RawHeader,
    pub extrinsics: Vec<RawExtrinsic>,
}

impl RawBlock {
    pub fn hash_hex(&self) -> String {
        hex_hash(&self.header.hash)
    }

    /// Sum of the encoded extrinsic lengths.
    pub fn approximate_size(&self) -> usize {
        self.extrinsics.iter().map(|e| e.encoded_len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub phase: EventPhase,
    pub pallet: String,
    pub variant: String,
    pub fields: Vec<NamedField>,
}

impl RawEvent {
    pub fn is(&self, pallet: &str, variant: &str) -> bool {
        self.pallet.eq_ignore_ascii_case(pallet) && self.variant == variant
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|f| f.name.as_deref() == Some(name))
            .map(|f| &f.value)
    }
}

/// `Staking.ActiveEra`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveEra {
    pub index: u32,
    pub start_ms: Option<u64>,
}

/// Read access to a chain node.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Endpoint this client talks to.
    fn endpoint(&self) -> &str;

    /// Cheap round trip used by the health check.
    async fn ping(&self) -> Result<(), ChainError>;

    /// `system_properties`, with anything the node omits left at the
    /// fallback values.
    async fn properties(&self, fallback: &ChainProperties) -> Result<ChainProperties, ChainError>;

    async fn finalized_head(&self) -> Result<BlockHash, ChainError>;

    async fn header(&self, hash: BlockHash) -> Result<RawHeader, ChainError>;

    async fn block_hash(&self, number: BlockNumber) -> Result<Option<BlockHash>, ChainError>;

    async fn block(&self, hash: BlockHash) -> Result<RawBlock, ChainError>;

    async fn events(&self, hash: BlockHash) -> Result<Vec<RawEvent>, ChainError>;

    /// Every registered validator (`Staking.Validators` keys).
    async fn validators(&self) -> Result<Vec<AccountBytes>, ChainError>;

    /// The validator set of the current session.
    async fn session_validators(&self) -> Result<Vec<AccountBytes>, ChainError>;

    async fn active_era(&self) -> Result<Option<ActiveEra>, ChainError>;

    async fn era_duration_ms(&self) -> Result<u64, ChainError>;

    /// `active` of every staking ledger.
    async fn ledger_active_stakes(&self) -> Result<Vec<Balance>, ChainError>;

    async fn era_validator_reward(&self, era: u32) -> Result<Option<Balance>, ChainError>;

    async fn era_total_stake(&self, era: u32) -> Result<Option<Balance>, ChainError>;

    /// `Timestamp.Now` at the given block.
    async fn timestamp_at(&self, hash: BlockHash) -> Result<Option<u64>, ChainError>;

    /// Release the underlying transport.
    async fn close(&self);
}

/// Opens clients to endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainRpc>, ChainError>;
}
