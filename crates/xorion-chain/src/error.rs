//! Error types for chain operations.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Failed to connect to chain: {0}")]
    Connection(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage query failed: {0}")]
    Storage(String),

    #[error("Subxt error: {0}")]
    Subxt(#[from] subxt::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] subxt::error::DecodeError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Not connected to a chain node")]
    NotConnected,

    #[error("Client was replaced while the request was in flight")]
    Superseded,

    #[error("Invalid transaction hash: {0}")]
    InvalidHash(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl ChainError {
    /// Whether the failure came from the deadline rather than the node.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChainError::Timeout { .. })
    }
}
