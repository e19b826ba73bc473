//! Chain access and explorer services for Xorion.

pub mod activity;
pub mod cache;
pub mod client;
pub mod codec;
pub mod connection;
pub mod deadline;
pub mod error;
pub mod explorer;
pub mod locator;
pub mod metrics;
pub mod queries;
pub mod rpc;
pub mod ss58;

#[cfg(test)]
mod mock;

pub use activity::{ActivityReconstructor, window_heights};
pub use client::{ChainClient, SubxtConnector};
pub use connection::{ConnectionManager, LiveClient};
pub use error::*;
pub use explorer::{Explorer, ExplorerSnapshot};
pub use locator::{TransactionLocator, normalize_hash};
pub use metrics::MetricsAggregator;
pub use rpc::{ChainRpc, Connector};
pub use ss58::{encode_ss58, hex_hash};
