//! Core domain types for the Xorion explorer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub type Balance = u128;
pub type BlockNumber = u32;

/// Token and address properties of the connected chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainProperties {
    pub token_symbol: String,
    pub token_decimals: u8,
    pub ss58_format: u16,
}

impl Default for ChainProperties {
    fn default() -> Self {
        Self {
            token_symbol: "XOR".to_string(),
            token_decimals: 18,
            ss58_format: 42,
        }
    }
}

/// Connection status for the chain client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Connected, but the last health probe exceeded the latency threshold.
    Degraded,
    Error,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Degraded => "Degraded",
            ConnectionStatus::Error => "Error",
        }
    }

    /// Whether a live client handle exists in this state.
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Degraded)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot of the connection manager state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Endpoint of the live client, or of the last successful connection.
    pub current_endpoint: Option<String>,
    pub last_error: Option<String>,
    /// Round-trip time of the last health probe.
    pub latency: Option<Duration>,
    /// Failed connection cycles since the last success.
    pub consecutive_attempts: u32,
    /// Unix time (ms) of the last successful connection.
    pub last_connected_at_ms: Option<u64>,
}

/// Aggregate network metrics, recomputed on each refresh.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub validators_online: u32,
    pub total_validators: u32,
    /// Annualised staking return in percent.
    pub staking_apr: f64,
    /// Average block time in seconds.
    pub avg_block_time_secs: f64,
    pub total_transactions: u64,
    /// Total value locked, formatted in whole tokens.
    pub total_value_locked: String,
    /// Total value locked in minor units (decimal string, may exceed u128).
    pub total_value_locked_raw: String,
    pub network_health_percent: u8,
    pub active_addresses: u32,
    pub finalized_height: BlockNumber,
    pub last_updated_ms: u64,
}

/// Transfer semantics detected for an extrinsic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInfo {
    pub from: String,
    pub to: String,
    pub amount: Balance,
    pub asset_symbol: String,
}

/// Staking operation tag for an extrinsic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakingOperation {
    Bond,
    BondExtra,
    Unbond,
    Rebond,
    WithdrawUnbonded,
    Nominate,
    Chill,
    Validate,
    SetPayee,
    PoolJoin,
    PoolBondExtra,
    PoolClaimPayout,
    PoolUnbond,
    PoolWithdrawUnbonded,
}

impl StakingOperation {
    /// Map a `Staking` call name onto an operation.
    pub fn from_staking_call(method: &str) -> Option<Self> {
        match method {
            "bond" => Some(Self::Bond),
            "bond_extra" => Some(Self::BondExtra),
            "unbond" => Some(Self::Unbond),
            "rebond" => Some(Self::Rebond),
            "withdraw_unbonded" => Some(Self::WithdrawUnbonded),
            "nominate" => Some(Self::Nominate),
            "chill" | "chill_other" => Some(Self::Chill),
            "validate" => Some(Self::Validate),
            "set_payee" => Some(Self::SetPayee),
            _ => None,
        }
    }

    /// Map a `NominationPools` call name onto an operation.
    pub fn from_pool_call(method: &str) -> Option<Self> {
        match method {
            "join" => Some(Self::PoolJoin),
            "bond_extra" | "bond_extra_other" => Some(Self::PoolBondExtra),
            "claim_payout" | "claim_payout_other" => Some(Self::PoolClaimPayout),
            "unbond" => Some(Self::PoolUnbond),
            "withdraw_unbonded" => Some(Self::PoolWithdrawUnbonded),
            "nominate" => Some(Self::Nominate),
            "chill" => Some(Self::Chill),
            _ => None,
        }
    }

    /// Get display label for the operation.
    pub fn label(&self) -> &'static str {
        match self {
            StakingOperation::Bond => "Bond",
            StakingOperation::BondExtra => "Bond Extra",
            StakingOperation::Unbond => "Unbond",
            StakingOperation::Rebond => "Rebond",
            StakingOperation::WithdrawUnbonded => "Withdraw Unbonded",
            StakingOperation::Nominate => "Nominate",
            StakingOperation::Chill => "Chill",
            StakingOperation::Validate => "Validate",
            StakingOperation::SetPayee => "Set Payee",
            StakingOperation::PoolJoin => "Join Pool",
            StakingOperation::PoolBondExtra => "Pool Bond Extra",
            StakingOperation::PoolClaimPayout => "Claim Pool Rewards",
            StakingOperation::PoolUnbond => "Pool Unbond",
            StakingOperation::PoolWithdrawUnbonded => "Pool Withdraw",
        }
    }
}

/// An event rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub pallet: String,
    pub variant: String,
    pub fields: Vec<String>,
}

/// A named call argument rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedArg {
    pub name: String,
    pub value: String,
}

/// Transaction reconstructed from historical block data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// 0x-prefixed lowercase hex.
    pub hash: String,
    pub block_number: BlockNumber,
    pub block_hash: String,
    pub extrinsic_index: u32,
    pub pallet: String,
    pub method: String,
    pub signer: Option<String>,
    pub timestamp_ms: Option<u64>,
    pub success: bool,
    pub fee: Balance,
    pub arg_summaries: Vec<String>,
    pub transfer: Option<TransferInfo>,
    pub staking: Option<StakingOperation>,
    pub events: Vec<DecodedEvent>,
}

impl Transaction {
    pub fn is_transfer(&self) -> bool {
        self.transfer.is_some()
    }

    /// `pallet.method` label.
    pub fn call_label(&self) -> String {
        format!("{}.{}", self.pallet, self.method)
    }
}

/// Block summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: BlockNumber,
    pub hash: String,
    pub timestamp_ms: Option<u64>,
    pub extrinsic_count: u32,
    pub proposer: Option<String>,
    pub approximate_size_bytes: usize,
}

/// Transaction era (mortality).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Era {
    /// Immortal transaction (never expires).
    Immortal,
    /// Mortal transaction with period and phase.
    Mortal { period: u64, phase: u64 },
}

impl std::fmt::Display for Era {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Era::Immortal => write!(f, "Immortal"),
            Era::Mortal { period, phase } => write!(f, "Mortal({}/{})", period, phase),
        }
    }
}

/// Full transaction detail, built only on explicit lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub transaction: Transaction,
    pub nonce: Option<u64>,
    pub tip: Option<Balance>,
    pub era: Option<Era>,
    /// 0x-prefixed signature bytes.
    pub signature: Option<String>,
    pub args: Vec<DecodedArg>,
    pub is_decoded: bool,
}

/// Recent blocks and their transactions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransactionActivity {
    /// Newest first.
    pub transactions: Vec<Transaction>,
    /// Newest first.
    pub blocks: Vec<Block>,
    pub finalized_height: BlockNumber,
    pub fetched_at_ms: u64,
}

impl TransactionActivity {
    /// Distinct signers across the window.
    pub fn active_addresses(&self) -> u32 {
        let signers: std::collections::HashSet<&str> = self
            .transactions
            .iter()
            .filter_map(|tx| tx.signer.as_deref())
            .collect();
        signers.len() as u32
    }

    pub fn signed_transaction_count(&self) -> u64 {
        self.transactions
            .iter()
            .filter(|tx| tx.signer.is_some())
            .count() as u64
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
