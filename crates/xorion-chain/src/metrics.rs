//! Network metrics aggregation.

use std::sync::{Arc, Mutex, RwLock};

use xorion_core::{
    ChainProperties, DEFAULT_ERA_DURATION_MS, MetricsInputs, MetricsSettings, NetworkMetrics,
    TransactionActivity, derive_metrics,
};

use crate::cache::ResponseCache;
use crate::connection::ConnectionManager;
use crate::deadline::{Deadline, with_deadline};
use crate::error::ChainError;
use crate::rpc::ChainRpc;

/// Reads chain state into [`NetworkMetrics`], cached for a short TTL.
pub struct MetricsAggregator {
    connection: ConnectionManager,
    settings: MetricsSettings,
    properties: Arc<RwLock<ChainProperties>>,
    cache: Mutex<ResponseCache<NetworkMetrics>>,
    last_error: Mutex<Option<String>>,
}

impl MetricsAggregator {
    pub fn new(
        connection: ConnectionManager,
        settings: MetricsSettings,
        properties: Arc<RwLock<ChainProperties>>,
    ) -> Self {
        Self {
            cache: Mutex::new(ResponseCache::new(settings.ttl())),
            connection,
            settings,
            properties,
            last_error: Mutex::new(None),
        }
    }

    /// Current metrics.
    ///
    /// Returns `None` when not connected. On failure or timeout the error is
    /// recorded and the last good snapshot, if any, is returned.
    pub async fn fetch_metrics(
        &self,
        activity: Option<&TransactionActivity>,
    ) -> Option<NetworkMetrics> {
        let live = self.connection.client()?;

        if let Some(cached) = self.cache.lock().ok().and_then(|c| c.get()) {
            tracing::debug!("Serving cached metrics");
            return Some(with_activity(cached, activity));
        }

        let reading = read_inputs(live.rpc.as_ref(), self.settings.block_time_span);
        let result = match with_deadline(self.settings.timeout(), reading).await {
            Deadline::Completed(result) => result,
            Deadline::TimedOut => Err(ChainError::Timeout {
                operation: "metrics fetch",
                after: self.settings.timeout(),
            }),
        };

        match result {
            Ok(_) if !self.connection.is_current(live.id) => {
                self.record_error(ChainError::Superseded);
                self.stale().map(|m| with_activity(m, activity))
            }
            Ok(inputs) => {
                let properties = self
                    .properties
                    .read()
                    .map(|p| p.clone())
                    .unwrap_or_default();
                let metrics = derive_metrics(&inputs, &properties, activity, xorion_core::now_ms());
                if let Ok(mut cache) = self.cache.lock() {
                    cache.set(metrics.clone());
                }
                if let Ok(mut last_error) = self.last_error.lock() {
                    *last_error = None;
                }
                Some(metrics)
            }
            Err(e) => {
                self.record_error(e);
                self.stale().map(|m| with_activity(m, activity))
            }
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Drop the cached snapshot, e.g. after switching nodes.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.invalidate();
        }
    }

    fn record_error(&self, error: ChainError) {
        tracing::warn!("Metrics fetch failed: {}", error);
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = Some(error.to_string());
        }
    }

    fn stale(&self) -> Option<NetworkMetrics> {
        self.cache.lock().ok().and_then(|c| c.last())
    }
}

/// Transaction counts track the activity window, not the chain snapshot.
fn with_activity(
    mut metrics: NetworkMetrics,
    activity: Option<&TransactionActivity>,
) -> NetworkMetrics {
    if let Some(activity) = activity {
        metrics.total_transactions = activity.signed_transaction_count();
        metrics.active_addresses = activity.active_addresses();
    }
    metrics
}

/// Gather every reading behind one snapshot.
async fn read_inputs(rpc: &dyn ChainRpc, block_span: u32) -> Result<MetricsInputs, ChainError> {
    let (validators, session, active_era, stakes, head_hash) = tokio::try_join!(
        rpc.validators(),
        rpc.session_validators(),
        rpc.active_era(),
        rpc.ledger_active_stakes(),
        rpc.finalized_head(),
    )?;
    let head = rpc.header(head_hash).await?;

    let mut inputs = MetricsInputs {
        total_validators: validators.len() as u32,
        validators_online: session.len() as u32,
        ledger_active_stakes: stakes,
        finalized_height: head.number,
        era_duration_ms: DEFAULT_ERA_DURATION_MS,
        block_span,
        ..Default::default()
    };

    // APR uses the last completed era.
    if let Some(previous) = active_era.and_then(|era| era.index.checked_sub(1)) {
        match tokio::try_join!(
            rpc.era_validator_reward(previous),
            rpc.era_total_stake(previous),
            rpc.era_duration_ms(),
        ) {
            Ok((reward, stake, duration)) => {
                inputs.last_era_reward = reward;
                inputs.last_era_total_stake = stake;
                if duration > 0 {
                    inputs.era_duration_ms = duration;
                }
            }
            Err(e) => tracing::debug!("Era reward data unavailable: {}", e),
        }
    }

    match block_time_samples(rpc, head_hash, head.number, block_span).await {
        Ok((head_ms, past_ms)) => {
            inputs.head_timestamp_ms = head_ms;
            inputs.past_timestamp_ms = past_ms;
        }
        Err(e) => tracing::debug!("Block time samples unavailable: {}", e),
    }

    Ok(inputs)
}

async fn block_time_samples(
    rpc: &dyn ChainRpc,
    head_hash: [u8; 32],
    head_number: u32,
    span: u32,
) -> Result<(Option<u64>, Option<u64>), ChainError> {
    let Some(past_number) = head_number.checked_sub(span).filter(|_| span > 0) else {
        return Ok((None, None));
    };
    let Some(past_hash) = rpc.block_hash(past_number).await? else {
        return Ok((None, None));
    };
    tokio::try_join!(rpc.timestamp_at(head_hash), rpc.timestamp_at(past_hash))
}
