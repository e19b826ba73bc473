//! Explorer configuration.
//!
//! Every tunable of the connection manager, metrics aggregator, activity
//! reconstructor and transaction locator lives here. Values come from the
//! built-in defaults, optionally a JSON file, and `XORION_*` environment
//! variables (in that order of precedence, lowest first).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ChainProperties;

/// Endpoint used when `XORION_RPC_ENDPOINTS` is not set.
pub const DEFAULT_RPC_ENDPOINT: &str = "wss://rpc.xorion.network";

/// Configuration error type.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A value failed to parse or validate.
    #[error("Invalid {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// How much trust to put in the positional fields of a transfer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferEventPolicy {
    /// Only accept events whose leading fields are account, account, amount.
    #[default]
    Structural,
    /// Accept any event with at least three fields as (from, to, amount).
    Positional,
}

impl std::str::FromStr for TransferEventPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structural" => Ok(TransferEventPolicy::Structural),
            "positional" => Ok(TransferEventPolicy::Positional),
            other => Err(format!(
                "unknown policy '{}', expected structural or positional",
                other
            )),
        }
    }
}

/// Connection manager tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub connect_timeout_ms: u64,
    /// Failed connection cycles after which automatic reconnects stop.
    pub max_reconnect_attempts: u32,
    pub backoff_floor_ms: u64,
    pub backoff_ceiling_ms: u64,
    pub health_check_interval_ms: u64,
    /// Probe round trips above this demote the connection to degraded.
    pub latency_threshold_ms: u64,
    /// Pause between disconnect and connect on a manual reconnect.
    pub reconnect_pause_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            max_reconnect_attempts: 10,
            backoff_floor_ms: 1_000,
            backoff_ceiling_ms: 30_000,
            health_check_interval_ms: 30_000,
            latency_threshold_ms: 2_000,
            reconnect_pause_ms: 500,
        }
    }
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn backoff_floor(&self) -> Duration {
        Duration::from_millis(self.backoff_floor_ms)
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.backoff_ceiling_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn latency_threshold(&self) -> Duration {
        Duration::from_millis(self.latency_threshold_ms)
    }

    pub fn reconnect_pause(&self) -> Duration {
        Duration::from_millis(self.reconnect_pause_ms)
    }
}

/// Metrics aggregator tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Snapshots younger than this are served from cache.
    pub ttl_ms: u64,
    /// Hard limit for one full metrics fetch.
    pub timeout_ms: u64,
    /// Blocks between the two timestamps used for the average block time.
    pub block_time_span: u32,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            timeout_ms: 15_000,
            block_time_span: 10,
        }
    }
}

impl MetricsSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Transaction reconstructor tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivitySettings {
    /// Number of most recent finalized blocks scanned per refresh.
    pub block_window: u32,
    pub max_transactions: usize,
    /// Blocks fetched concurrently.
    pub concurrency: usize,
    /// Keep unsigned inherents (`Timestamp.set` and friends) in the list.
    pub include_inherents: bool,
    pub transfer_event_policy: TransferEventPolicy,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            block_window: 10,
            max_transactions: 50,
            concurrency: 4,
            include_inherents: false,
            transfer_event_policy: TransferEventPolicy::Structural,
        }
    }
}

/// Transaction locator tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupSettings {
    /// Maximum number of blocks walked back from the finalized head.
    pub depth: u32,
    pub timeout_ms: u64,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            depth: 100,
            timeout_ms: 30_000,
        }
    }
}

impl LookupSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Complete explorer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// RPC endpoints in preference order.
    pub endpoints: Vec<String>,
    pub connection: ConnectionSettings,
    pub metrics: MetricsSettings,
    pub activity: ActivitySettings,
    pub lookup: LookupSettings,
    pub chain: ChainProperties,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![DEFAULT_RPC_ENDPOINT.to_string()],
            connection: ConnectionSettings::default(),
            metrics: MetricsSettings::default(),
            activity: ActivitySettings::default(),
            lookup: LookupSettings::default(),
            chain: ChainProperties::default(),
        }
    }
}

impl ExplorerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `XORION_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("XORION_RPC_ENDPOINTS") {
            let endpoints = parse_endpoint_list(&raw);
            if !endpoints.is_empty() {
                self.endpoints = endpoints;
            }
        }

        let conn = &mut self.connection;
        override_parsed(&lookup, "XORION_CONNECT_TIMEOUT_MS", &mut conn.connect_timeout_ms)?;
        override_parsed(&lookup, "XORION_MAX_RECONNECT_ATTEMPTS", &mut conn.max_reconnect_attempts)?;
        override_parsed(&lookup, "XORION_BACKOFF_FLOOR_MS", &mut conn.backoff_floor_ms)?;
        override_parsed(&lookup, "XORION_BACKOFF_CEILING_MS", &mut conn.backoff_ceiling_ms)?;
        override_parsed(&lookup, "XORION_HEALTH_CHECK_INTERVAL_MS", &mut conn.health_check_interval_ms)?;
        override_parsed(&lookup, "XORION_LATENCY_THRESHOLD_MS", &mut conn.latency_threshold_ms)?;

        override_parsed(&lookup, "XORION_METRICS_TTL_MS", &mut self.metrics.ttl_ms)?;
        override_parsed(&lookup, "XORION_METRICS_TIMEOUT_MS", &mut self.metrics.timeout_ms)?;

        override_parsed(&lookup, "XORION_ACTIVITY_BLOCKS", &mut self.activity.block_window)?;
        override_parsed(&lookup, "XORION_ACTIVITY_MAX_TRANSACTIONS", &mut self.activity.max_transactions)?;
        override_parsed(&lookup, "XORION_TRANSFER_EVENT_POLICY", &mut self.activity.transfer_event_policy)?;

        override_parsed(&lookup, "XORION_LOOKUP_DEPTH", &mut self.lookup.depth)?;
        override_parsed(&lookup, "XORION_LOOKUP_TIMEOUT_MS", &mut self.lookup.timeout_ms)?;

        if let Some(symbol) = lookup("XORION_TOKEN_SYMBOL") {
            self.chain.token_symbol = symbol;
        }
        override_parsed(&lookup, "XORION_TOKEN_DECIMALS", &mut self.chain.token_decimals)?;
        override_parsed(&lookup, "XORION_SS58_FORMAT", &mut self.chain.ss58_format)?;

        self.validate()
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(invalid("endpoints", "at least one RPC endpoint is required"));
        }
        let conn = &self.connection;
        if conn.backoff_floor_ms == 0 {
            return Err(invalid("backoff_floor_ms", "must be greater than zero"));
        }
        if conn.backoff_floor_ms > conn.backoff_ceiling_ms {
            return Err(invalid("backoff_ceiling_ms", "must not be below the backoff floor"));
        }
        if conn.health_check_interval_ms == 0 {
            return Err(invalid("health_check_interval_ms", "must be greater than zero"));
        }
        if self.activity.concurrency == 0 {
            return Err(invalid("activity.concurrency", "must be greater than zero"));
        }
        if self.chain.token_decimals > 38 {
            return Err(invalid("token_decimals", "must be at most 38"));
        }
        Ok(())
    }
}

/// Split a comma or whitespace separated endpoint list.
pub fn parse_endpoint_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
