//! Recent transaction activity.
//!
//! Rebuilds the last few finalized blocks into [`Transaction`] and
//! [`Block`] records. Blocks are fetched with bounded concurrency and any
//! block that fails is skipped, so one bad block never sinks the batch.

pub mod block;
pub mod fee;
pub mod transfer;

use std::sync::{Arc, RwLock};

use futures::stream::{self, StreamExt};
use xorion_core::{
    ActivitySettings, Block, BlockNumber, ChainProperties, Transaction, TransactionActivity,
};

use crate::codec::author_index;
use crate::connection::ConnectionManager;
use crate::error::ChainError;
use crate::rpc::{AccountBytes, ChainRpc};

use block::{BlockContext, block_summary, block_timestamp};

/// Heights of the `window` most recent blocks, newest first.
pub fn window_heights(head: BlockNumber, window: u32) -> Vec<BlockNumber> {
    (0..window).map_while(|offset| head.checked_sub(offset)).collect()
}

pub struct ActivityReconstructor {
    connection: ConnectionManager,
    settings: ActivitySettings,
    properties: Arc<RwLock<ChainProperties>>,
}

impl ActivityReconstructor {
    pub fn new(
        connection: ConnectionManager,
        settings: ActivitySettings,
        properties: Arc<RwLock<ChainProperties>>,
    ) -> Self {
        Self {
            connection,
            settings,
            properties,
        }
    }

    pub async fn fetch_recent_transaction_activity(
        &self,
    ) -> Result<TransactionActivity, ChainError> {
        let live = self.connection.client().ok_or(ChainError::NotConnected)?;
        let rpc = live.rpc.as_ref();
        let properties = self
            .properties
            .read()
            .map(|p| p.clone())
            .unwrap_or_default();

        let head_hash = rpc.finalized_head().await?;
        let head = rpc.header(head_hash).await?;
        let heights = window_heights(head.number, self.settings.block_window);

        let authorities = match rpc.session_validators().await {
            Ok(authorities) => authorities,
            Err(e) => {
                tracing::debug!("No session validators for proposer lookup: {}", e);
                Vec::new()
            }
        };

        let results: Vec<(BlockNumber, Result<(Block, Vec<Transaction>), ChainError>)> =
            stream::iter(heights)
                .map(|height| {
                    let properties = &properties;
                    let authorities = &authorities;
                    async move {
                        let result = self.load_block(rpc, height, properties, authorities).await;
                        (height, result)
                    }
                })
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;

        let mut blocks = Vec::new();
        let mut transactions = Vec::new();
        for (height, result) in results {
            match result {
                Ok((block, txs)) => {
                    blocks.push(block);
                    transactions.extend(txs);
                }
                Err(e) => tracing::warn!("Skipping block {}: {}", height, e),
            }
        }

        if !self.connection.is_current(live.id) {
            return Err(ChainError::Superseded);
        }

        blocks.sort_by(|a, b| b.height.cmp(&a.height));
        transactions.sort_by(|a, b| {
            b.block_number
                .cmp(&a.block_number)
                .then(a.extrinsic_index.cmp(&b.extrinsic_index))
        });
        transactions.truncate(self.settings.max_transactions);

        tracing::debug!(
            "Reconstructed {} transactions from {} blocks",
            transactions.len(),
            blocks.len()
        );

        Ok(TransactionActivity {
            transactions,
            blocks,
            finalized_height: head.number,
            fetched_at_ms: xorion_core::now_ms(),
        })
    }

    async fn load_block(
        &self,
        rpc: &dyn ChainRpc,
        height: BlockNumber,
        properties: &ChainProperties,
        authorities: &[AccountBytes],
    ) -> Result<(Block, Vec<Transaction>), ChainError> {
        let hash = rpc
            .block_hash(height)
            .await?
            .ok_or_else(|| ChainError::InvalidData(format!("No hash for block {}", height)))?;
        let (raw, events) = tokio::try_join!(rpc.block(hash), rpc.events(hash))?;

        let timestamp_ms = block_timestamp(&raw);
        let proposer = author_index(&raw.header.digest_logs, authorities.len())
            .and_then(|i| authorities.get(i));
        let summary = block_summary(&raw, timestamp_ms, proposer, properties);

        let ctx = BlockContext {
            block: &raw,
            events: &events,
            timestamp_ms,
            properties,
            policy: self.settings.transfer_event_policy,
        };
        let transactions = raw
            .extrinsics
            .iter()
            .filter(|ext| self.settings.include_inherents || ext.is_signed())
            .map(|ext| ctx.transaction(ext))
            .collect();

        Ok((summary, transactions))
    }
}
