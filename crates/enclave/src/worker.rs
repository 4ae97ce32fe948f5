//! The single serialized worker.
//!
//! All mutable enclave state (board, claims, sessions, outbox, recovery
//! driver) lives inside one task consuming one mpsc channel. Every handle
//! and chain listener funnels through that channel, so state transitions
//! are totally ordered without any locking.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use fow_core::{
    AccessKey, Board, CityId, Interval, Location, Player, PlayerAddr, Randomness, TerrainParams,
    Tile, TileHash, compute_from_tile, compute_onto_tile, compute_updated_troops,
};
use fow_zk::{MoveWitness, SpawnWitness, VirtualTileWitness, Witness};

use crate::chain::{ChainClient, ChainEvent};
use crate::claims::{ClaimRegistry, ClaimedMove, ClaimedSpawn, MoveKey};
use crate::config::EnclaveConfig;
use crate::da::{
    DaError, EncryptedTileRecord, Outbox, PeerId, RecoveryDriver, RecoverySummary, Replay, SealKey,
};
use crate::error::{EnclaveError, Result};
use crate::events::{DaEvent, DisplayEvent, Event, EventBus};
use crate::session::{SessionId, SessionRegistry};
use crate::visibility::{MoveUpdate, fan_out};

/// Message bytes the enclave signs when attesting a proposal. Both spawn
/// and move attestations bind the block height and the two result hashes.
pub fn attestation_message(block: u64, first: &TileHash, second: &TileHash) -> Vec<u8> {
    let mut msg = Vec::with_capacity(10 + 8 + 64);
    msg.extend_from_slice(b"fow.attest");
    msg.extend_from_slice(&block.to_le_bytes());
    msg.extend_from_slice(first.as_bytes());
    msg.extend_from_slice(second.as_bytes());
    msg
}

/// What a successful login tells the client.
#[derive(Debug, Clone)]
pub struct LoginAck {
    pub player: PlayerAddr,
    pub spawned: bool,
}

/// A registered spawn claim, ready for proving and chain submission.
#[derive(Debug, Clone)]
pub struct SpawnProposal {
    pub player: PlayerAddr,
    pub witness: Witness,
    pub signature: Vec<u8>,
    pub hash_prev: TileHash,
    pub hash_spawn: TileHash,
    pub block: u64,
}

/// A registered move claim, ready for proving and chain submission.
#[derive(Debug, Clone)]
pub struct MoveProposal {
    pub witness: Witness,
    pub signature: Vec<u8>,
    pub hash_from: TileHash,
    pub hash_to: TileHash,
    pub block: u64,
}

/// Handshake result for a freshly connected DA peer.
#[derive(Debug, Clone, Copy)]
pub struct DaHandshake {
    pub peer: PeerId,
    /// When set, the peer must replay its stored records (starting at
    /// `next_index`) before normal draining begins.
    pub recovering: bool,
    pub next_index: u64,
}

pub enum Command {
    OpenSession {
        reply: oneshot::Sender<SessionId>,
    },
    CloseSession {
        session: SessionId,
    },
    Challenge {
        session: SessionId,
        reply: oneshot::Sender<Result<String>>,
    },
    Login {
        session: SessionId,
        address: String,
        symbol: String,
        signature: String,
        reply: oneshot::Sender<Result<LoginAck>>,
    },
    ProposeSpawn {
        session: SessionId,
        loc: Location,
        blind: u128,
        reply: oneshot::Sender<Result<SpawnProposal>>,
    },
    ProposeMove {
        session: SessionId,
        from: Location,
        to: Location,
        troops: u32,
        reply: oneshot::Sender<Result<MoveProposal>>,
    },
    Decrypt {
        session: SessionId,
        loc: Location,
        reply: oneshot::Sender<Result<Tile>>,
    },
    Chain(ChainEvent),
    DaConnect {
        reply: oneshot::Sender<Result<DaHandshake>>,
    },
    DaFetch {
        peer: PeerId,
        reply: oneshot::Sender<Result<Option<EncryptedTileRecord>>>,
    },
    DaAck {
        peer: PeerId,
        reply: oneshot::Sender<Result<()>>,
    },
    DaRecoveredTile {
        peer: PeerId,
        record: EncryptedTileRecord,
        reply: oneshot::Sender<Result<u64>>,
    },
    DaRecoveryFinished {
        peer: PeerId,
        reply: oneshot::Sender<Result<RecoverySummary>>,
    },
    DaDisconnect {
        peer: PeerId,
    },
    // Read-only queries, mostly for the handle's convenience APIs.
    GetTile {
        loc: Location,
        reply: oneshot::Sender<Tile>,
    },
    IsSpawned {
        player: PlayerAddr,
        reply: oneshot::Sender<bool>,
    },
    CityTiles {
        city: CityId,
        reply: oneshot::Sender<BTreeSet<Location>>,
    },
    PendingMoves {
        reply: oneshot::Sender<usize>,
    },
    OutboxDepth {
        reply: oneshot::Sender<usize>,
    },
    BlockHeight {
        reply: oneshot::Sender<u64>,
    },
}

pub struct EnclaveWorker {
    board: Board,
    params: TerrainParams,
    randomness: Randomness,
    claims: ClaimRegistry,
    sessions: SessionRegistry,
    symbols: HashMap<PlayerAddr, String>,
    outbox: Outbox,
    seal_key: SealKey,
    signer: SigningKey,
    chain: Arc<dyn ChainClient>,
    bus: EventBus,
    rx: mpsc::Receiver<Command>,
    block_height: u64,
    recovery: Option<RecoveryDriver>,
    spawn_resources: u32,
    next_city_id: u32,
}

impl EnclaveWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: &EnclaveConfig,
        seal_key: SealKey,
        signer: SigningKey,
        chain: Arc<dyn ChainClient>,
        bus: EventBus,
        rx: mpsc::Receiver<Command>,
        block_height: u64,
        recovery: Option<RecoveryDriver>,
    ) -> Self {
        let randomness = seal_key.commitment().randomness;
        Self {
            board: Board::new(config.terrain),
            params: config.terrain,
            randomness,
            claims: ClaimRegistry::new(config.claim_lifespan),
            sessions: SessionRegistry::new(),
            symbols: HashMap::new(),
            outbox: Outbox::new(),
            seal_key,
            signer,
            chain,
            bus,
            rx,
            block_height,
            recovery,
            spawn_resources: config.spawn_resources,
            // City id 0 is the unowned sentinel.
            next_city_id: 1,
        }
    }

    pub async fn run(mut self) {
        info!(target: "enclave::worker", height = self.block_height, "worker started");
        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
        }
        info!(target: "enclave::worker", "command channel closed, worker stopping");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::OpenSession { reply } => {
                let _ = reply.send(self.sessions.open());
            }
            Command::CloseSession { session } => {
                self.sessions.close(session);
            }
            Command::Challenge { session, reply } => {
                let result = self
                    .sessions
                    .issue_challenge(session)
                    .map(hex::encode);
                self.finish_session_command(session, &result);
                let _ = reply.send(result);
            }
            Command::Login {
                session,
                address,
                symbol,
                signature,
                reply,
            } => {
                let result = self.login(session, &address, symbol, &signature);
                self.finish_session_command(session, &result);
                let _ = reply.send(result);
            }
            Command::ProposeSpawn {
                session,
                loc,
                blind,
                reply,
            } => {
                let result = self.propose_spawn(session, loc, blind).await;
                self.finish_session_command(session, &result);
                let _ = reply.send(result);
            }
            Command::ProposeMove {
                session,
                from,
                to,
                troops,
                reply,
            } => {
                let result = self.propose_move(session, from, to, troops).await;
                self.finish_session_command(session, &result);
                let _ = reply.send(result);
            }
            Command::Decrypt {
                session,
                loc,
                reply,
            } => {
                let result = self.decrypt(session, loc);
                self.finish_session_command(session, &result);
                let _ = reply.send(result);
            }
            Command::Chain(event) => self.on_chain_event(event),
            Command::DaConnect { reply } => {
                let _ = reply.send(self.da_connect());
            }
            Command::DaFetch { peer, reply } => {
                let result = self.outbox.front(peer).map(|r| r.cloned());
                let _ = reply.send(result.map_err(EnclaveError::from));
            }
            Command::DaAck { peer, reply } => {
                let result = self.outbox.ack(peer).map(|_| ());
                let _ = reply.send(result.map_err(EnclaveError::from));
            }
            Command::DaRecoveredTile {
                peer,
                record,
                reply,
            } => {
                let _ = reply.send(self.da_recovered_tile(peer, &record));
            }
            Command::DaRecoveryFinished { peer, reply } => {
                let _ = reply.send(self.da_recovery_finished(peer));
            }
            Command::DaDisconnect { peer } => {
                self.outbox.disconnect(peer);
            }
            Command::GetTile { loc, reply } => {
                let _ = reply.send(self.board.get_tile(loc, &self.randomness));
            }
            Command::IsSpawned { player, reply } => {
                let _ = reply.send(self.board.is_spawned(&player));
            }
            Command::CityTiles { city, reply } => {
                let _ = reply.send(self.board.city_tiles(city));
            }
            Command::PendingMoves { reply } => {
                let _ = reply.send(self.claims.pending_moves());
            }
            Command::OutboxDepth { reply } => {
                let _ = reply.send(self.outbox.depth());
            }
            Command::BlockHeight { reply } => {
                let _ = reply.send(self.block_height);
            }
        }
    }

    /// Validation and conflict failures terminate the offending session.
    fn finish_session_command<T>(&mut self, session: SessionId, result: &Result<T>) {
        if let Err(err) = result
            && err.terminates_session()
        {
            warn!(target: "enclave::session", %session, %err, "terminating session");
            self.sessions.close(session);
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.recovery.is_some() {
            return Err(EnclaveError::Recovering);
        }
        Ok(())
    }

    fn fresh_key(&self) -> AccessKey {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        AccessKey::from_bytes(bytes)
    }

    fn attest(&self, block: u64, first: &TileHash, second: &TileHash) -> Vec<u8> {
        let message = attestation_message(block, first, second);
        self.signer.sign(&message).to_bytes().to_vec()
    }

    async fn updated_troops(&self, tile: &Tile, interval: Interval) -> Result<u32> {
        let center_troops = if tile.is_city_center() {
            self.chain.city_center_troops(tile.city_id).await?
        } else {
            0
        };
        Ok(compute_updated_troops(tile, center_troops, interval))
    }

    // ------------------------------------------------------------------
    // Player commands
    // ------------------------------------------------------------------

    fn login(
        &mut self,
        session: SessionId,
        address: &str,
        symbol: String,
        signature: &str,
    ) -> Result<LoginAck> {
        self.ensure_live()?;
        let player = self.sessions.login(session, address, signature)?;
        self.symbols.insert(player.clone(), symbol);
        Ok(LoginAck {
            spawned: self.board.is_spawned(&player),
            player,
        })
    }

    async fn propose_spawn(
        &mut self,
        session: SessionId,
        loc: Location,
        blind: u128,
    ) -> Result<SpawnProposal> {
        self.ensure_live()?;
        let player = self.sessions.player_of(session)?.clone();
        if !self.claims.may_propose(&player, self.block_height) {
            return Err(EnclaveError::Conflict(format!(
                "{player} already proposed in block {}",
                self.block_height
            )));
        }
        if self.board.is_spawned(&player) {
            return Err(EnclaveError::Conflict(format!("{player} already spawned")));
        }
        if self.claims.has_pending_spawn(&player) {
            return Err(EnclaveError::Conflict(format!(
                "{player} has a spawn claim pending"
            )));
        }

        let prev = self.board.get_tile(loc, &self.randomness);
        if !prev.is_unowned() {
            return Err(EnclaveError::Validation(format!(
                "spawn target {loc:?} is already owned"
            )));
        }
        if prev.is_hill() || prev.is_water() {
            return Err(EnclaveError::Validation(format!(
                "spawn target {loc:?} is impassable"
            )));
        }

        let symbol = self
            .symbols
            .get(&player)
            .cloned()
            .ok_or_else(|| EnclaveError::Validation("player has no display symbol".into()))?;
        let interval = self.chain.current_interval().await?;
        let city = CityId(self.next_city_id);
        self.next_city_id += 1;

        let spawn_tile = Tile::city_center(
            Player::new(symbol, player.clone()),
            loc,
            self.spawn_resources,
            city,
            interval,
            self.fresh_key(),
        );
        let hash_prev = prev.hash();
        let hash_spawn = spawn_tile.hash();
        let signature = self.attest(self.block_height, &hash_prev, &hash_spawn);
        let witness = Witness::Spawn(SpawnWitness {
            prev_tile: prev.clone(),
            spawn_tile: spawn_tile.clone(),
            blind,
        });

        self.claims.register_spawn(
            player.clone(),
            ClaimedSpawn {
                virtual_tile: prev,
                spawn_tile,
                block_submitted: self.block_height,
            },
        );
        self.claims.note_proposal(player.clone(), self.block_height);

        Ok(SpawnProposal {
            player,
            witness,
            signature,
            hash_prev,
            hash_spawn,
            block: self.block_height,
        })
    }

    async fn propose_move(
        &mut self,
        session: SessionId,
        from: Location,
        to: Location,
        troops: u32,
    ) -> Result<MoveProposal> {
        self.ensure_live()?;
        let player = self.sessions.player_of(session)?.clone();
        if !self.claims.may_propose(&player, self.block_height) {
            return Err(EnclaveError::Conflict(format!(
                "{player} already proposed in block {}",
                self.block_height
            )));
        }
        if from == to || !from.nearby().contains(&to) {
            return Err(EnclaveError::Validation(format!(
                "move target {to:?} is not adjacent to {from:?}"
            )));
        }

        let t_from = self.board.get_tile(from, &self.randomness);
        if t_from.owner.address != player {
            return Err(EnclaveError::Validation(format!(
                "{player} does not own the source tile {from:?}"
            )));
        }
        let t_to = self.board.get_tile(to, &self.randomness);

        let interval = self.chain.current_interval().await?;
        let source_updated = self.updated_troops(&t_from, interval).await?;
        let target_updated = self.updated_troops(&t_to, interval).await?;

        let u_from = compute_from_tile(&t_from, source_updated, troops, interval, self.fresh_key())?;
        let u_to = compute_onto_tile(
            &t_to,
            &t_from,
            &u_from,
            target_updated,
            troops,
            interval,
            self.fresh_key(),
        )?;

        // An unrecorded destination needs its synthesis proven against the
        // committed randomness; a recorded one is proven under the full
        // move circuit.
        let witness = if self.board.has_recorded_tile(to) {
            Witness::Move(MoveWitness {
                t_from: t_from.clone(),
                t_to: t_to.clone(),
                u_from: u_from.clone(),
                u_to: u_to.clone(),
                source_updated_troops: source_updated,
                target_updated_troops: target_updated,
                troops_moved: troops,
                current_interval: interval,
            })
        } else {
            Witness::VirtualTile(VirtualTileWitness {
                tile: t_to.clone(),
                randomness: self.randomness,
                params: self.params,
            })
        };

        let hash_from = u_from.hash();
        let hash_to = u_to.hash();
        let signature = self.attest(self.block_height, &hash_from, &hash_to);

        let records = [self.seal_key.seal(&u_from)?, self.seal_key.seal(&u_to)?];
        for record in &records {
            self.outbox.enqueue(record.clone());
        }
        self.bus.publish(Event::Da(DaEvent::RecordQueued {
            depth: self.outbox.depth(),
        }));

        self.claims.register_move(
            MoveKey {
                from: hash_from,
                to: hash_to,
            },
            ClaimedMove {
                u_from,
                u_to,
                block_submitted: self.block_height,
                records,
            },
        );
        self.claims.note_proposal(player, self.block_height);

        Ok(MoveProposal {
            witness,
            signature,
            hash_from,
            hash_to,
            block: self.block_height,
        })
    }

    fn decrypt(&mut self, session: SessionId, loc: Location) -> Result<Tile> {
        self.ensure_live()?;
        let player = self.sessions.player_of(session)?.clone();
        if self.board.no_fog(loc, &player, &self.randomness) {
            Ok(self.board.get_tile(loc, &self.randomness))
        } else {
            Ok(Tile::mystery(loc))
        }
    }

    // ------------------------------------------------------------------
    // Chain events
    // ------------------------------------------------------------------

    fn on_chain_event(&mut self, event: ChainEvent) {
        match event {
            ChainEvent::NewBlock { height } => {
                self.block_height = height;
                for (key, claim) in self.claims.expire(height) {
                    info!(
                        target: "enclave::claims",
                        from = %key.from,
                        to = %key.to,
                        submitted = claim.block_submitted,
                        height,
                        "move claim expired unfinalized"
                    );
                }
                for (player, claim) in self.claims.expire_spawns(height) {
                    info!(
                        target: "enclave::claims",
                        %player,
                        submitted = claim.block_submitted,
                        height,
                        "spawn claim expired unresolved"
                    );
                }
            }
            ChainEvent::TileCommitted { hash } => {
                if let Some(driver) = &mut self.recovery {
                    driver.note_committed(hash);
                }
            }
            ChainEvent::MoveFinalized { hash_from, hash_to } => {
                self.apply_move(hash_from, hash_to);
            }
            ChainEvent::SpawnAttempted { player, success } => {
                self.apply_spawn(player, success);
            }
        }
    }

    fn apply_move(&mut self, hash_from: TileHash, hash_to: TileHash) {
        let key = MoveKey {
            from: hash_from,
            to: hash_to,
        };
        let Some(claim) = self.claims.take_move(&key) else {
            // Finalizations from before a restart, or for claims already
            // swept, are not ours to apply.
            warn!(
                target: "enclave::claims",
                from = %hash_from,
                to = %hash_to,
                "finalization for unknown move claim ignored"
            );
            return;
        };

        let old_target = self.board.get_tile(claim.u_to.loc, &self.randomness);
        let previous_owner = old_target.owner.address.clone();
        let captured_city = (old_target.is_city_center()
            && !old_target.is_unowned()
            && old_target.owner.address != claim.u_to.owner.address)
            .then(|| self.board.city_tiles(old_target.city_id));

        self.board.set_tile(claim.u_from.clone());
        self.board.set_tile(claim.u_to.clone());
        info!(
            target: "enclave::worker",
            from = ?claim.u_from.loc,
            to = ?claim.u_to.loc,
            captured = captured_city.is_some(),
            "move applied"
        );

        let update = MoveUpdate {
            source: claim.u_from.loc,
            target: claim.u_to.loc,
            new_owner: claim.u_to.owner.address.clone(),
            previous_owner,
            captured_city,
        };
        self.push_display_updates(&update);
    }

    fn apply_spawn(&mut self, player: PlayerAddr, success: bool) {
        let Some(claim) = self.claims.take_spawn(&player) else {
            warn!(
                target: "enclave::claims",
                %player,
                "spawn resolution for unknown claim ignored"
            );
            return;
        };
        if !success {
            info!(target: "enclave::worker", %player, "spawn rejected on-chain");
            self.bus
                .publish(Event::Display(DisplayEvent::TrySpawn { player }));
            return;
        }

        let tile = claim.spawn_tile;
        self.board.set_tile(tile.clone());
        info!(
            target: "enclave::worker",
            %player,
            loc = ?tile.loc,
            city = %tile.city_id,
            "spawn applied"
        );

        match self.seal_key.seal(&tile) {
            Ok(record) => {
                self.outbox.enqueue(record);
                self.bus.publish(Event::Da(DaEvent::RecordQueued {
                    depth: self.outbox.depth(),
                }));
            }
            Err(err) => {
                tracing::error!(target: "enclave::da", %err, "failed to seal spawn tile");
            }
        }

        let update = MoveUpdate {
            source: tile.loc,
            target: tile.loc,
            new_owner: player,
            previous_owner: PlayerAddr::default(),
            captured_city: None,
        };
        self.push_display_updates(&update);
    }

    fn push_display_updates(&self, update: &MoveUpdate) {
        for (player, locations) in fan_out(&self.board, &self.randomness, update) {
            self.bus.publish(Event::Display(DisplayEvent::UpdateDisplay {
                player,
                locations,
            }));
        }
    }

    // ------------------------------------------------------------------
    // Data-availability peer
    // ------------------------------------------------------------------

    fn da_connect(&mut self) -> Result<DaHandshake> {
        let peer = self.outbox.connect()?;
        let (recovering, next_index) = match &self.recovery {
            Some(driver) => (true, driver.next_index()),
            None => (false, 0),
        };
        Ok(DaHandshake {
            peer,
            recovering,
            next_index,
        })
    }

    fn check_da_peer(&self, peer: PeerId) -> Result<()> {
        if self.outbox.connected_peer() == Some(peer) {
            Ok(())
        } else {
            Err(DaError::UnknownPeer(peer.0).into())
        }
    }

    fn da_recovered_tile(&mut self, peer: PeerId, record: &EncryptedTileRecord) -> Result<u64> {
        self.check_da_peer(peer)?;
        let driver = self
            .recovery
            .as_mut()
            .ok_or(EnclaveError::Da(DaError::NotRecovering))?;
        if let Replay::Apply(tile) = driver.replay(&self.seal_key, record) {
            // Later records supersede earlier ones for the same location,
            // so replaying in index order reconstructs the final board.
            self.next_city_id = self.next_city_id.max(tile.city_id.0 + 1);
            self.board.set_tile(*tile);
        }
        Ok(self.recovery.as_ref().map(|d| d.next_index()).unwrap_or(0))
    }

    fn da_recovery_finished(&mut self, peer: PeerId) -> Result<RecoverySummary> {
        self.check_da_peer(peer)?;
        let driver = self
            .recovery
            .take()
            .ok_or(EnclaveError::Da(DaError::NotRecovering))?;
        let summary = driver.finish();
        self.bus.publish(Event::Da(summary.into()));
        Ok(summary)
    }
}
