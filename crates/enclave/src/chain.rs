//! Chain collaborator trait and event stream.
//!
//! The enclave never talks to a ledger directly; everything goes through
//! [`ChainClient`] so tests can swap in [`MockChain`] and drive block
//! production by hand.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use fow_core::{CityId, Interval, PlayerAddr, TileHash};
use fow_zk::Proof;

/// Events the enclave subscribes to. Delivery order within one block is
/// `TileCommitted`* then `SpawnAttempted`/`MoveFinalized`, then `NewBlock`.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A new block was produced.
    NewBlock { height: u64 },
    /// A spawn transaction for `player` was executed (or rejected).
    SpawnAttempted { player: PlayerAddr, success: bool },
    /// A move transaction was finalized; the hashes identify the claim.
    MoveFinalized { hash_from: TileHash, hash_to: TileHash },
    /// A tile commitment was appended to the on-chain hash history.
    TileCommitted { hash: TileHash },
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain write failed: {0}")]
    Write(String),
    #[error("chain read failed: {0}")]
    Read(String),
    #[error("chain event subscription failed: {0}")]
    Subscribe(String),
}

/// A spawn transaction as the enclave submits it.
#[derive(Debug, Clone)]
pub struct SpawnSubmission {
    pub player: PlayerAddr,
    pub hash_prev: TileHash,
    pub hash_spawn: TileHash,
    pub proof: Proof,
    /// Enclave attestation over `(block, hash_prev, hash_spawn)`.
    pub signature: Vec<u8>,
    pub block: u64,
}

/// A move transaction as the enclave submits it.
#[derive(Debug, Clone)]
pub struct MoveSubmission {
    pub hash_from: TileHash,
    pub hash_to: TileHash,
    pub proof: Proof,
    /// Enclave attestation over `(block, hash_from, hash_to)`.
    pub signature: Vec<u8>,
    pub block: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Subscribe to the chain event stream.
    async fn subscribe_events(&self) -> Result<broadcast::Receiver<ChainEvent>, ChainError>;

    /// Submit a spawn transaction. Execution outcome arrives later as
    /// [`ChainEvent::SpawnAttempted`].
    async fn submit_spawn(&self, spawn: SpawnSubmission) -> Result<(), ChainError>;

    /// Submit a move transaction. Finalization arrives later as
    /// [`ChainEvent::MoveFinalized`].
    async fn submit_move(&self, mv: MoveSubmission) -> Result<(), ChainError>;

    /// Publish the hash of the enclave's committed randomness. Called once,
    /// when the seal key is first generated.
    async fn commit_randomness(&self, hash_rand: [u8; 32]) -> Result<(), ChainError>;

    /// Current resource interval.
    async fn current_interval(&self) -> Result<Interval, ChainError>;

    /// Authoritative troop count for a city center, managed on-chain.
    async fn city_center_troops(&self, city: CityId) -> Result<u32, ChainError>;

    /// Current block height.
    async fn block_height(&self) -> Result<u64, ChainError>;

    /// Full set of tile hashes ever committed on-chain. Used to validate
    /// records replayed from the data-availability layer during recovery.
    async fn hash_history(&self) -> Result<HashSet<TileHash>, ChainError>;
}

// ============================================================================
// Mock chain for tests
// ============================================================================

#[derive(Debug, Default)]
struct MockChainInner {
    height: u64,
    interval: Interval,
    city_troops: std::collections::HashMap<CityId, u32>,
    history: HashSet<TileHash>,
    spawns: Vec<SpawnSubmission>,
    moves: Vec<MoveSubmission>,
    committed_rand: Option<[u8; 32]>,
    fail_writes: bool,
}

/// In-memory [`ChainClient`] with manual block production.
///
/// Tests call [`MockChain::advance_block`], [`MockChain::finalize_move`] and
/// [`MockChain::resolve_spawn`] to play the role of the ledger.
#[derive(Clone)]
pub struct MockChain {
    inner: Arc<Mutex<MockChainInner>>,
    events: broadcast::Sender<ChainEvent>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(MockChainInner::default())),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockChainInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make chain writes fail until further notice.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn set_interval(&self, interval: Interval) {
        self.lock().interval = interval;
    }

    pub fn set_city_center_troops(&self, city: CityId, troops: u32) {
        self.lock().city_troops.insert(city, troops);
    }

    /// Append a hash to the on-chain history and emit `TileCommitted`.
    pub fn commit_tile(&self, hash: TileHash) {
        self.lock().history.insert(hash);
        let _ = self.events.send(ChainEvent::TileCommitted { hash });
    }

    /// Produce the next block and emit `NewBlock`.
    pub fn advance_block(&self) -> u64 {
        let height = {
            let mut inner = self.lock();
            inner.height += 1;
            inner.height
        };
        let _ = self.events.send(ChainEvent::NewBlock { height });
        height
    }

    /// Finalize a move: commit both hashes, then emit `MoveFinalized`.
    pub fn finalize_move(&self, hash_from: TileHash, hash_to: TileHash) {
        self.commit_tile(hash_from);
        self.commit_tile(hash_to);
        let _ = self.events.send(ChainEvent::MoveFinalized { hash_from, hash_to });
    }

    /// Resolve a pending spawn. On success the spawn tile hash joins the
    /// history before the event fires.
    pub fn resolve_spawn(&self, player: PlayerAddr, success: bool, spawn_hash: Option<TileHash>) {
        if success && let Some(hash) = spawn_hash {
            self.commit_tile(hash);
        }
        let _ = self.events.send(ChainEvent::SpawnAttempted { player, success });
    }

    pub fn submitted_spawns(&self) -> Vec<SpawnSubmission> {
        self.lock().spawns.clone()
    }

    pub fn submitted_moves(&self) -> Vec<MoveSubmission> {
        self.lock().moves.clone()
    }

    pub fn committed_randomness(&self) -> Option<[u8; 32]> {
        self.lock().committed_rand
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn subscribe_events(&self) -> Result<broadcast::Receiver<ChainEvent>, ChainError> {
        Ok(self.events.subscribe())
    }

    async fn submit_spawn(&self, spawn: SpawnSubmission) -> Result<(), ChainError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(ChainError::Write("mock write failure".into()));
        }
        inner.spawns.push(spawn);
        Ok(())
    }

    async fn submit_move(&self, mv: MoveSubmission) -> Result<(), ChainError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(ChainError::Write("mock write failure".into()));
        }
        inner.moves.push(mv);
        Ok(())
    }

    async fn commit_randomness(&self, hash_rand: [u8; 32]) -> Result<(), ChainError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(ChainError::Write("mock write failure".into()));
        }
        inner.committed_rand = Some(hash_rand);
        Ok(())
    }

    async fn current_interval(&self) -> Result<Interval, ChainError> {
        Ok(self.lock().interval)
    }

    async fn city_center_troops(&self, city: CityId) -> Result<u32, ChainError> {
        self.lock()
            .city_troops
            .get(&city)
            .copied()
            .ok_or_else(|| ChainError::Read(format!("unknown city {}", city.0)))
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        Ok(self.lock().height)
    }

    async fn hash_history(&self) -> Result<HashSet<TileHash>, ChainError> {
        Ok(self.lock().history.clone())
    }
}
