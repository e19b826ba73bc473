//! Core domain logic for the Xorion explorer.
//!
//! This crate provides:
//! - Domain types shared by the chain client and frontends (`types` module)
//! - Balance formatting (`display` module)
//! - Staking return maths (`apy` module)
//! - Network metric derivations (`metrics` module)
//! - Explorer configuration (`config` module)

pub mod apy;
pub mod config;
pub mod display;
pub mod metrics;
pub mod types;

pub use apy::*;
pub use config::{
    ActivitySettings, ConfigError, ConnectionSettings, ExplorerConfig, LookupSettings,
    MetricsSettings, TransferEventPolicy, DEFAULT_RPC_ENDPOINT,
};
pub use display::*;
pub use metrics::*;
pub use types::*;
