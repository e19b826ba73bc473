//! In-memory node used by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use xorion_core::{Balance, BlockNumber, ChainProperties};

use crate::error::ChainError;
use crate::rpc::{
    AccountBytes, ActiveEra, BlockHash, ChainRpc, Connector, EventPhase, FieldValue, NamedField,
    RawBlock, RawEvent, RawExtrinsic, RawHeader,
};

/// Genesis timestamp of the fake chain; blocks are six seconds apart.
pub const GENESIS_MS: u64 = 1_700_000_000_000;
pub const BLOCK_MS: u64 = 6_000;

#[derive(Default)]
pub struct NodeState {
    pub blocks: BTreeMap<BlockNumber, (RawBlock, Vec<RawEvent>)>,
    pub unavailable: HashSet<BlockNumber>,
    pub properties: Option<ChainProperties>,
    pub validators: Vec<AccountBytes>,
    pub session_validators: Vec<AccountBytes>,
    pub ledger_stakes: Vec<Balance>,
    pub active_era: Option<ActiveEra>,
    pub era_rewards: HashMap<u32, Balance>,
    pub era_stakes: HashMap<u32, Balance>,
    pub era_duration_ms: u64,
    pub ping_latency: Duration,
    pub ping_fails: bool,
    pub block_delay: Duration,
    pub hash_lookup_fails: bool,
    pub storage_delay: Duration,
    pub storage_fails: bool,
}

/// Shared state behind every client the connector hands out.
#[derive(Default)]
pub struct MockNode {
    state: Mutex<NodeState>,
    pub block_requests: AtomicUsize,
    pub closed_clients: AtomicUsize,
}

impl MockNode {
    /// A node with blocks `0..=height`, each carrying only a timestamp inherent.
    pub fn with_chain(height: BlockNumber) -> Arc<Self> {
        let node = Arc::new(Self::default());
        for number in 0..=height {
            node.push_block(number, Vec::new(), Vec::new());
        }
        node
    }

    pub fn update<F: FnOnce(&mut NodeState)>(&self, f: F) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }

    fn read<T, F: FnOnce(&NodeState) -> T>(&self, f: F) -> T {
        match self.state.lock() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// Insert block `number` with the timestamp inherent at index 0
    /// followed by `extrinsics`.
    pub fn push_block(&self, number: BlockNumber, extrinsics: Vec<RawExtrinsic>, events: Vec<RawEvent>) {
        let mut all = vec![timestamp_ext(number)];
        all.extend(extrinsics);
        let block = RawBlock {
            header: header(number),
            extrinsics: all,
        };
        self.update(|s| {
            s.blocks.insert(number, (block, events));
        });
    }

    fn number_of(&self, hash: &BlockHash) -> Result<BlockNumber, ChainError> {
        let number = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
        if hash == &block_hash_of(number) && self.read(|s| s.blocks.contains_key(&number)) {
            Ok(number)
        } else {
            Err(ChainError::Rpc(format!("unknown block 0x{}", hex::encode(hash))))
        }
    }
}

pub fn account(seed: u8) -> AccountBytes {
    [seed; 32]
}

pub fn block_hash_of(number: BlockNumber) -> BlockHash {
    let mut hash = [0xB1u8; 32];
    hash[..4].copy_from_slice(&number.to_be_bytes());
    hash
}

pub fn ext_hash(number: BlockNumber, index: u32) -> BlockHash {
    let mut hash = [0xE0u8; 32];
    hash[..4].copy_from_slice(&number.to_be_bytes());
    hash[4..8].copy_from_slice(&index.to_be_bytes());
    hash
}

pub fn header(number: BlockNumber) -> RawHeader {
    RawHeader {
        number,
        hash: block_hash_of(number),
        parent_hash: block_hash_of(number.saturating_sub(1)),
        digest_logs: Vec::new(),
    }
}

pub fn block_timestamp(number: BlockNumber) -> u64 {
    GENESIS_MS + number as u64 * BLOCK_MS
}

pub fn timestamp_ext(number: BlockNumber) -> RawExtrinsic {
    RawExtrinsic {
        index: 0,
        hash: ext_hash(number, 0),
        pallet: "Timestamp".into(),
        call: "set".into(),
        signer: None,
        args: vec![NamedField::named(
            "now",
            FieldValue::Number(block_timestamp(number) as u128),
        )],
        nonce: None,
        tip: None,
        era: None,
        signature: None,
        encoded_len: 10,
    }
}

pub fn signed_ext(
    number: BlockNumber,
    index: u32,
    pallet: &str,
    call: &str,
    signer: AccountBytes,
    args: Vec<NamedField>,
) -> RawExtrinsic {
    RawExtrinsic {
        index,
        hash: ext_hash(number, index),
        pallet: pallet.into(),
        call: call.into(),
        signer: Some(signer),
        args,
        nonce: Some(index as u64),
        tip: Some(0),
        era: Some(xorion_core::Era::Mortal { period: 64, phase: 7 }),
        signature: Some(vec![0x5A; 64]),
        encoded_len: 140,
    }
}

pub fn event(index: u32, pallet: &str, variant: &str, fields: Vec<NamedField>) -> RawEvent {
    RawEvent {
        phase: EventPhase::ApplyExtrinsic(index),
        pallet: pallet.into(),
        variant: variant.into(),
        fields,
    }
}

/// `MultiAddress::Id(account)` as decoded from call arguments.
pub fn multi_address(seed: u8) -> FieldValue {
    FieldValue::Variant {
        name: "Id".into(),
        fields: vec![NamedField::unnamed(FieldValue::Account(account(seed)))],
    }
}

pub struct MockChain {
    endpoint: String,
    node: Arc<MockNode>,
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

impl MockChain {
    async fn storage<T, F: FnOnce(&NodeState) -> T>(&self, f: F) -> Result<T, ChainError> {
        let (delay, fails) = self.node.read(|s| (s.storage_delay, s.storage_fails));
        pause(delay).await;
        if fails {
            return Err(ChainError::Storage("storage unavailable".into()));
        }
        Ok(self.node.read(f))
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn ping(&self) -> Result<(), ChainError> {
        let (latency, fails) = self.node.read(|s| (s.ping_latency, s.ping_fails));
        pause(latency).await;
        if fails {
            return Err(ChainError::Rpc("connection reset".into()));
        }
        Ok(())
    }

    async fn properties(&self, fallback: &ChainProperties) -> Result<ChainProperties, ChainError> {
        Ok(self
            .node
            .read(|s| s.properties.clone())
            .unwrap_or_else(|| fallback.clone()))
    }

    async fn finalized_head(&self) -> Result<BlockHash, ChainError> {
        self.node
            .read(|s| s.blocks.keys().next_back().copied())
            .map(block_hash_of)
            .ok_or_else(|| ChainError::Rpc("empty chain".into()))
    }

    async fn header(&self, hash: BlockHash) -> Result<RawHeader, ChainError> {
        let number = self.node.number_of(&hash)?;
        Ok(header(number))
    }

    async fn block_hash(&self, number: BlockNumber) -> Result<Option<BlockHash>, ChainError> {
        if self.node.read(|s| s.hash_lookup_fails) {
            return Err(ChainError::Rpc("chain_getBlockHash failed".into()));
        }
        Ok(self
            .node
            .read(|s| s.blocks.contains_key(&number))
            .then(|| block_hash_of(number)))
    }

    async fn block(&self, hash: BlockHash) -> Result<RawBlock, ChainError> {
        self.node.block_requests.fetch_add(1, Ordering::SeqCst);
        let delay = self.node.read(|s| s.block_delay);
        pause(delay).await;
        let number = self.node.number_of(&hash)?;
        self.node.read(|s| {
            if s.unavailable.contains(&number) {
                return Err(ChainError::Rpc(format!("block {} unavailable", number)));
            }
            s.blocks
                .get(&number)
                .map(|(block, _)| block.clone())
                .ok_or_else(|| ChainError::Rpc("missing block".into()))
        })
    }

    async fn events(&self, hash: BlockHash) -> Result<Vec<RawEvent>, ChainError> {
        let number = self.node.number_of(&hash)?;
        Ok(self
            .node
            .read(|s| s.blocks.get(&number).map(|(_, events)| events.clone()))
            .unwrap_or_default())
    }

    async fn validators(&self) -> Result<Vec<AccountBytes>, ChainError> {
        self.storage(|s| s.validators.clone()).await
    }

    async fn session_validators(&self) -> Result<Vec<AccountBytes>, ChainError> {
        self.storage(|s| s.session_validators.clone()).await
    }

    async fn active_era(&self) -> Result<Option<ActiveEra>, ChainError> {
        self.storage(|s| s.active_era).await
    }

    async fn era_duration_ms(&self) -> Result<u64, ChainError> {
        self.storage(|s| s.era_duration_ms).await
    }

    async fn ledger_active_stakes(&self) -> Result<Vec<Balance>, ChainError> {
        self.storage(|s| s.ledger_stakes.clone()).await
    }

    async fn era_validator_reward(&self, era: u32) -> Result<Option<Balance>, ChainError> {
        self.storage(|s| s.era_rewards.get(&era).copied()).await
    }

    async fn era_total_stake(&self, era: u32) -> Result<Option<Balance>, ChainError> {
        self.storage(|s| s.era_stakes.get(&era).copied()).await
    }

    async fn timestamp_at(&self, hash: BlockHash) -> Result<Option<u64>, ChainError> {
        let number = self.node.number_of(&hash)?;
        Ok(Some(block_timestamp(number)))
    }

    async fn close(&self) {
        self.node.closed_clients.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out [`MockChain`] clients; endpoints can be marked down.
pub struct MockConnector {
    node: Arc<MockNode>,
    down: Mutex<HashSet<String>>,
    connect_delay: Mutex<Duration>,
    attempts: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(node: Arc<MockNode>) -> Arc<Self> {
        Arc::new(Self {
            node,
            down: Mutex::new(HashSet::new()),
            connect_delay: Mutex::new(Duration::ZERO),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn set_down(&self, endpoint: &str, down: bool) {
        if let Ok(mut set) = self.down.lock() {
            if down {
                set.insert(endpoint.to_string());
            } else {
                set.remove(endpoint);
            }
        }
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.connect_delay.lock() {
            *d = delay;
        }
    }

    /// Endpoints tried so far, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainRpc>, ChainError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(endpoint.to_string());
        }
        let delay = self.connect_delay.lock().map(|d| *d).unwrap_or_default();
        pause(delay).await;

        let is_down = self.down.lock().map(|d| d.contains(endpoint)).unwrap_or(false);
        if is_down {
            return Err(ChainError::Connection(format!("{} refused connection", endpoint)));
        }
        Ok(Arc::new(MockChain {
            endpoint: endpoint.to_string(),
            node: Arc::clone(&self.node),
        }))
    }
}
