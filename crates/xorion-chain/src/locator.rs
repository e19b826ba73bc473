//! Transaction lookup by hash.

use std::sync::{Arc, RwLock};

use xorion_core::{ChainProperties, LookupSettings, TransactionDetail, TransferEventPolicy};

use crate::activity::block::{BlockContext, block_timestamp};
use crate::connection::ConnectionManager;
use crate::deadline::{Deadline, with_deadline};
use crate::error::ChainError;
use crate::rpc::{BlockHash, ChainRpc};

/// Parse a user-supplied extrinsic hash.
///
/// Accepts an optional `0x`/`0X` prefix and either case; anything other
/// than 64 hex digits is rejected.
pub fn normalize_hash(input: &str) -> Result<BlockHash, ChainError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.len() != 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ChainError::InvalidHash(input.to_string()));
    }

    let mut hash = [0u8; 32];
    hex::decode_to_slice(digits.to_ascii_lowercase(), &mut hash)
        .map_err(|_| ChainError::InvalidHash(input.to_string()))?;
    Ok(hash)
}

pub struct TransactionLocator {
    connection: ConnectionManager,
    settings: LookupSettings,
    policy: TransferEventPolicy,
    properties: Arc<RwLock<ChainProperties>>,
}

impl TransactionLocator {
    pub fn new(
        connection: ConnectionManager,
        settings: LookupSettings,
        policy: TransferEventPolicy,
        properties: Arc<RwLock<ChainProperties>>,
    ) -> Self {
        Self {
            connection,
            settings,
            policy,
            properties,
        }
    }

    /// Search recent finalized blocks for an extrinsic.
    ///
    /// `Ok(None)` means the whole window was searched without a match;
    /// running out of time is `Err(ChainError::Timeout)`. A result from a
    /// client that was replaced during the search is discarded.
    pub async fn find_by_hash(&self, hash: &str) -> Result<Option<TransactionDetail>, ChainError> {
        let target = normalize_hash(hash)?;
        let live = self.connection.client().ok_or(ChainError::NotConnected)?;
        let limit = self.settings.timeout();

        match with_deadline(limit, self.search(live.rpc.as_ref(), target)).await {
            Deadline::Completed(_) if !self.connection.is_current(live.id) => {
                tracing::debug!("Dropping lookup result from superseded client");
                Err(ChainError::Superseded)
            }
            Deadline::Completed(result) => result,
            Deadline::TimedOut => {
                tracing::warn!("Lookup of {} timed out after {:?}", hash, limit);
                Err(ChainError::Timeout {
                    operation: "transaction lookup",
                    after: limit,
                })
            }
        }
    }

    async fn search(
        &self,
        rpc: &dyn ChainRpc,
        target: BlockHash,
    ) -> Result<Option<TransactionDetail>, ChainError> {
        let properties = self
            .properties
            .read()
            .map(|p| p.clone())
            .unwrap_or_default();

        let mut hash = rpc.finalized_head().await?;
        let mut number = rpc.header(hash).await?.number;

        for _ in 0..self.settings.depth {
            match tokio::try_join!(rpc.block(hash), rpc.events(hash)) {
                Ok((block, events)) => {
                    if let Some(ext) = block.extrinsics.iter().find(|e| e.hash == target) {
                        tracing::info!("Found extrinsic in block {}", number);
                        let ctx = BlockContext {
                            block: &block,
                            events: &events,
                            timestamp_ms: block_timestamp(&block),
                            properties: &properties,
                            policy: self.policy,
                        };
                        return Ok(Some(ctx.detail(ext)));
                    }
                    if number == 0 {
                        break;
                    }
                    hash = block.header.parent_hash;
                }
                Err(e) => {
                    tracing::warn!("Skipping block {} during lookup: {}", number, e);
                    if number == 0 {
                        break;
                    }
                    match rpc.block_hash(number - 1).await {
                        Ok(Some(parent)) => hash = parent,
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!("Lookup stopped below block {}: {}", number, e);
                            break;
                        }
                    }
                }
            }
            number -= 1;
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnector, MockNode, account, ext_hash, multi_address, signed_ext};
    use crate::rpc::{FieldValue, NamedField};
    use crate::ss58::hex_hash;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use xorion_core::{ConnectionSettings, Era};

    async fn locator(node: Arc<MockNode>, settings: LookupSettings) -> TransactionLocator {
        let manager = ConnectionManager::spawn(
            vec!["wss://node".into()],
            ConnectionSettings::default(),
            MockConnector::new(node),
        );
        manager.connect(None).await;
        TransactionLocator::new(
            manager,
            settings,
            TransferEventPolicy::Structural,
            Arc::new(RwLock::new(ChainProperties::default())),
        )
    }

    fn node_with_transfer_at(number: u32, height: u32) -> Arc<MockNode> {
        let node = MockNode::with_chain(height);
        node.push_block(
            number,
            vec![signed_ext(
                number,
                1,
                "Balances",
                "transfer_keep_alive",
                account(1),
                vec![
                    NamedField::named("dest", multi_address(2)),
                    NamedField::named("value", FieldValue::Number(42)),
                ],
            )],
            vec![],
        );
        node
    }

    #[test]
    fn test_normalize_hash_variants() {
        let lower = format!("0x{}", "ab".repeat(32));
        let upper = format!("0X{}", "AB".repeat(32));
        let bare = "aB".repeat(32);
        let expected = [0xABu8; 32];
        assert_eq!(normalize_hash(&lower).unwrap(), expected);
        assert_eq!(normalize_hash(&upper).unwrap(), expected);
        assert_eq!(normalize_hash(&bare).unwrap(), expected);
    }

    #[test]
    fn test_normalize_hash_rejects_bad_input() {
        assert!(matches!(normalize_hash("0x1234"), Err(ChainError::InvalidHash(_))));
        assert!(matches!(
            normalize_hash(&"zz".repeat(32)),
            Err(ChainError::InvalidHash(_))
        ));
        assert!(matches!(normalize_hash(""), Err(ChainError::InvalidHash(_))));
    }

    #[tokio::test]
    async fn test_finds_extrinsic_with_any_hash_spelling() {
        let node = node_with_transfer_at(7, 10);
        let locator = locator(node, LookupSettings::default()).await;
        let hash = hex_hash(&ext_hash(7, 1));

        for spelling in [hash.clone(), hash.to_uppercase().replacen("0X", "0x", 1), hash[2..].to_string()] {
            let detail = locator
                .find_by_hash(&spelling)
                .await
                .expect("lookup")
                .expect("found");
            assert!(detail.is_decoded);
            assert_eq!(detail.transaction.block_number, 7);
            assert_eq!(detail.transaction.hash, hash);
            assert_eq!(detail.era, Some(Era::Mortal { period: 64, phase: 7 }));
            assert_eq!(detail.transaction.transfer.as_ref().map(|t| t.amount), Some(42));
        }
    }

    #[tokio::test]
    async fn test_not_found_within_depth() {
        let node = node_with_transfer_at(2, 10);
        let settings = LookupSettings {
            depth: 5,
            ..Default::default()
        };
        let node_ref = node.clone();
        let locator = locator(node, settings).await;

        let result = locator.find_by_hash(&hex_hash(&ext_hash(2, 1))).await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(node_ref.block_requests.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_stops_at_genesis() {
        let node = MockNode::with_chain(3);
        let node_ref = node.clone();
        let locator = locator(node, LookupSettings::default()).await;

        let result = locator.find_by_hash(&"11".repeat(32)).await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(node_ref.block_requests.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_unavailable_block_is_skipped() {
        let node = node_with_transfer_at(5, 8);
        node.update(|s| {
            s.unavailable.insert(7);
        });
        let locator = locator(node, LookupSettings::default()).await;

        let detail = locator
            .find_by_hash(&hex_hash(&ext_hash(5, 1)))
            .await
            .expect("lookup");
        assert_eq!(detail.map(|d| d.transaction.block_number), Some(5));
    }

    #[tokio::test]
    async fn test_last_block_of_window_is_searched() {
        let settings = LookupSettings {
            depth: 5,
            ..Default::default()
        };

        // Head 10 with depth 5 covers blocks 10 down to 6.
        let locator_in = locator(node_with_transfer_at(6, 10), settings.clone()).await;
        let found = locator_in
            .find_by_hash(&hex_hash(&ext_hash(6, 1)))
            .await
            .expect("lookup");
        assert_eq!(found.map(|d| d.transaction.block_number), Some(6));

        let locator_out = locator(node_with_transfer_at(5, 10), settings).await;
        let missing = locator_out.find_by_hash(&hex_hash(&ext_hash(5, 1))).await;
        assert!(matches!(missing, Ok(None)));
    }

    #[tokio::test]
    async fn test_failed_parent_hash_ends_search_without_error() {
        let node = node_with_transfer_at(5, 10);
        node.update(|s| {
            s.unavailable.insert(9);
            s.hash_lookup_fails = true;
        });
        let node_ref = node.clone();
        let locator = locator(node, LookupSettings::default()).await;

        let result = locator.find_by_hash(&hex_hash(&ext_hash(5, 1))).await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(node_ref.block_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_during_search_discards_result() {
        let node = node_with_transfer_at(2, 20);
        node.update(|s| s.block_delay = Duration::from_millis(100));
        let manager = ConnectionManager::spawn(
            vec!["wss://node".into()],
            ConnectionSettings::default(),
            MockConnector::new(node),
        );
        manager.connect(None).await;
        let locator = TransactionLocator::new(
            manager.clone(),
            LookupSettings {
                depth: 100,
                timeout_ms: 30_000,
            },
            TransferEventPolicy::Structural,
            Arc::new(RwLock::new(ChainProperties::default())),
        );

        let hash = hex_hash(&ext_hash(2, 1));
        let (result, state) = tokio::join!(locator.find_by_hash(&hash), async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            manager.reconnect().await
        });

        assert!(state.status.is_live());
        assert!(matches!(result, Err(ChainError::Superseded)));
        // The same lookup on the new client succeeds.
        let detail = locator.find_by_hash(&hash).await.expect("lookup");
        assert_eq!(detail.map(|d| d.transaction.block_number), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_from_not_found() {
        let node = MockNode::with_chain(200);
        node.update(|s| s.block_delay = Duration::from_secs(1));
        let settings = LookupSettings {
            depth: 100,
            timeout_ms: 30_000,
        };
        let locator = locator(node, settings).await;

        let result = locator.find_by_hash(&"22".repeat(32)).await;
        assert!(matches!(result, Err(ChainError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_invalid_hash_checked_before_connection() {
        let manager = ConnectionManager::spawn(
            vec![],
            ConnectionSettings::default(),
            MockConnector::new(MockNode::with_chain(1)),
        );
        let locator = TransactionLocator::new(
            manager,
            LookupSettings::default(),
            TransferEventPolicy::Structural,
            Arc::new(RwLock::new(ChainProperties::default())),
        );
        assert!(matches!(
            locator.find_by_hash("nope").await,
            Err(ChainError::InvalidHash(_))
        ));
        assert!(matches!(
            locator.find_by_hash(&"33".repeat(32)).await,
            Err(ChainError::NotConnected)
        ));
    }
}
