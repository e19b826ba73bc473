//! Smoke test against a running node.
//!
//! Run with: XORION_RPC_ENDPOINTS=ws://127.0.0.1:9944 cargo test --test live_node -- --ignored --nocapture

use std::time::Duration;

use xorion_chain::Explorer;
use xorion_core::{ConnectionStatus, ExplorerConfig};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("xorion_chain=debug,info")
        .try_init();
}

fn live_config() -> ExplorerConfig {
    ExplorerConfig::from_env().expect("Invalid explorer environment")
}

#[tokio::test]
#[ignore = "requires a running node"]
async fn live_snapshot() {
    init_logging();
    let explorer = Explorer::new(live_config());

    let state = explorer.connect(None).await;
    assert!(
        matches!(state.status, ConnectionStatus::Connected | ConnectionStatus::Degraded),
        "connection failed: {:?}",
        state.last_error
    );
    println!("Connected to {:?}", state.current_endpoint);

    let activity = explorer
        .fetch_recent_transaction_activity()
        .await
        .expect("No activity");
    println!(
        "Finalized #{}: {} blocks, {} transactions",
        activity.finalized_height,
        activity.blocks.len(),
        activity.transactions.len()
    );
    assert!(!activity.blocks.is_empty());
    assert!(activity.blocks.windows(2).all(|w| w[0].height > w[1].height));

    let metrics = explorer.fetch_metrics().await.expect("No metrics");
    println!(
        "Validators {}/{} | TVL {} | APR {:.2}% | block time {:.2}s",
        metrics.validators_online,
        metrics.total_validators,
        metrics.total_value_locked,
        metrics.staking_apr,
        metrics.avg_block_time_secs
    );
    assert!(metrics.finalized_height >= activity.finalized_height);

    explorer.disconnect().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(explorer.connection().status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
#[ignore = "requires a running node"]
async fn live_lookup_of_recent_extrinsic() {
    init_logging();
    let explorer = Explorer::new(live_config());
    explorer.connect(None).await;

    let activity = explorer
        .fetch_recent_transaction_activity()
        .await
        .expect("No activity");
    let Some(tx) = activity.transactions.first() else {
        println!("No signed extrinsics in the recent window; nothing to look up");
        return;
    };

    let detail = explorer
        .find_by_hash(&tx.hash)
        .await
        .expect("Lookup failed")
        .expect("Recent extrinsic not found");
    assert_eq!(detail.transaction.hash, tx.hash);
    assert_eq!(detail.transaction.block_number, tx.block_number);
}
