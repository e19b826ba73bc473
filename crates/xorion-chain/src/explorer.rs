//! Explorer facade.
//!
//! Wires the connection manager to the metrics, activity and lookup
//! services and keeps the latest results for display.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use xorion_core::{
    ChainProperties, ConnectionState, ExplorerConfig, NetworkMetrics, TransactionActivity,
    TransactionDetail,
};

use crate::activity::ActivityReconstructor;
use crate::client::SubxtConnector;
use crate::connection::ConnectionManager;
use crate::error::ChainError;
use crate::locator::TransactionLocator;
use crate::metrics::MetricsAggregator;
use crate::rpc::Connector;

/// Everything a front end needs to draw one frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExplorerSnapshot {
    pub connection: ConnectionState,
    pub properties: ChainProperties,
    pub metrics: Option<NetworkMetrics>,
    pub activity: Option<TransactionActivity>,
    pub metrics_error: Option<String>,
    pub activity_error: Option<String>,
}

#[derive(Default)]
struct Latest {
    metrics: Option<NetworkMetrics>,
    activity: Option<TransactionActivity>,
    activity_error: Option<String>,
}

pub struct Explorer {
    config: ExplorerConfig,
    connection: ConnectionManager,
    properties: Arc<RwLock<ChainProperties>>,
    metrics: MetricsAggregator,
    activity: ActivityReconstructor,
    locator: TransactionLocator,
    latest: RwLock<Latest>,
    activity_ticket: AtomicU64,
}

impl Explorer {
    /// Build an explorer over live nodes. Must be called inside a tokio runtime.
    pub fn new(config: ExplorerConfig) -> Self {
        Self::with_connector(config, Arc::new(SubxtConnector))
    }

    pub fn with_connector(config: ExplorerConfig, connector: Arc<dyn Connector>) -> Self {
        let connection = ConnectionManager::spawn(
            config.endpoints.clone(),
            config.connection.clone(),
            connector,
        );
        let properties = Arc::new(RwLock::new(config.chain.clone()));

        Self {
            metrics: MetricsAggregator::new(
                connection.clone(),
                config.metrics.clone(),
                Arc::clone(&properties),
            ),
            activity: ActivityReconstructor::new(
                connection.clone(),
                config.activity.clone(),
                Arc::clone(&properties),
            ),
            locator: TransactionLocator::new(
                connection.clone(),
                config.lookup.clone(),
                config.activity.transfer_event_policy,
                Arc::clone(&properties),
            ),
            connection,
            properties,
            config,
            latest: RwLock::new(Latest::default()),
            activity_ticket: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn properties(&self) -> ChainProperties {
        self.properties
            .read()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Connect and, on success, refresh token properties from the node.
    pub async fn connect(&self, endpoint: Option<&str>) -> ConnectionState {
        let state = self.connection.connect(endpoint).await;
        if state.status.is_live() {
            self.metrics.invalidate();
            self.refresh_properties().await;
        }
        state
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    pub async fn reconnect(&self) -> ConnectionState {
        let state = self.connection.reconnect().await;
        if state.status.is_live() {
            self.metrics.invalidate();
            self.refresh_properties().await;
        }
        state
    }

    async fn refresh_properties(&self) {
        let Some(live) = self.connection.client() else {
            return;
        };
        let fallback = self.config.chain.clone();
        match live.rpc.properties(&fallback).await {
            Ok(properties) => {
                tracing::info!(
                    "Chain token {} ({} decimals, ss58 {})",
                    properties.token_symbol,
                    properties.token_decimals,
                    properties.ss58_format
                );
                if let Ok(mut current) = self.properties.write() {
                    *current = properties;
                }
            }
            Err(e) => tracing::warn!("Could not read chain properties: {}", e),
        }
    }

    /// Refresh metrics using the latest activity window for transaction counts.
    pub async fn fetch_metrics(&self) -> Option<NetworkMetrics> {
        let activity = self.latest.read().ok().and_then(|l| l.activity.clone());
        let metrics = self.metrics.fetch_metrics(activity.as_ref()).await;
        if metrics.is_some() {
            if let Ok(mut latest) = self.latest.write() {
                latest.metrics = metrics.clone();
            }
        }
        metrics
    }

    /// Refresh recent activity. A result that finishes after a newer request
    /// started is returned to its caller but not stored.
    pub async fn fetch_recent_transaction_activity(&self) -> Option<TransactionActivity> {
        let ticket = self.activity_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.activity.fetch_recent_transaction_activity().await;
        let is_latest = self.activity_ticket.load(Ordering::SeqCst) == ticket;

        match result {
            Ok(activity) => {
                if is_latest {
                    if let Ok(mut latest) = self.latest.write() {
                        latest.activity = Some(activity.clone());
                        latest.activity_error = None;
                    }
                } else {
                    tracing::debug!("Dropping superseded activity result");
                }
                Some(activity)
            }
            Err(e) => {
                tracing::warn!("Activity refresh failed: {}", e);
                if is_latest {
                    if let Ok(mut latest) = self.latest.write() {
                        latest.activity_error = Some(e.to_string());
                    }
                }
                None
            }
        }
    }

    pub async fn find_by_hash(&self, hash: &str) -> Result<Option<TransactionDetail>, ChainError> {
        self.locator.find_by_hash(hash).await
    }

    pub fn snapshot(&self) -> ExplorerSnapshot {
        let latest = self.latest.read();
        let (metrics, activity, activity_error) = match latest {
            Ok(l) => (l.metrics.clone(), l.activity.clone(), l.activity_error.clone()),
            Err(_) => (None, None, None),
        };
        ExplorerSnapshot {
            connection: self.connection.state(),
            properties: self.properties(),
            metrics,
            activity,
            metrics_error: self.metrics.last_error(),
            activity_error,
        }
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Refresh activity then metrics on every tick until cancelled. Ticks
    /// while disconnected are skipped.
    pub async fn run_polling(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!("Polling started (interval: {:?})", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_once().await,
                _ = cancel.cancelled() => {
                    tracing::info!("Polling cancelled");
                    break;
                }
            }
        }
    }

    async fn poll_once(&self) {
        if !self.connection.status().is_live() {
            tracing::debug!("Not connected; skipping poll");
            return;
        }
        self.fetch_recent_transaction_activity().await;
        self.fetch_metrics().await;
    }
}
