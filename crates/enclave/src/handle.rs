//! Cloneable façade over the worker's command channel.
//!
//! Session transports, DA peer connections and tests all talk to the
//! enclave through a handle. Proof generation happens here, on the blocking
//! pool, so the worker task never stalls behind a prover.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

use fow_core::{CityId, Location, PlayerAddr, Tile};
use fow_zk::{ProofBundle, ProofOrchestrator, Witness};

use crate::chain::{ChainClient, MoveSubmission, SpawnSubmission};
use crate::da::{EncryptedTileRecord, PeerId, RecoverySummary};
use crate::error::{EnclaveError, Result};
use crate::events::{Event, EventBus, ProofEvent, Topic};
use crate::session::{self, ClientRequest, ServerMessage, SessionId};
use crate::worker::{Command, DaHandshake, LoginAck};

#[derive(Clone)]
pub struct EnclaveHandle {
    tx: mpsc::Sender<Command>,
    bus: EventBus,
    chain: Arc<dyn ChainClient>,
    orchestrator: Arc<ProofOrchestrator>,
}

impl EnclaveHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<Command>,
        bus: EventBus,
        chain: Arc<dyn ChainClient>,
        orchestrator: Arc<ProofOrchestrator>,
    ) -> Self {
        Self {
            tx,
            bus,
            chain,
            orchestrator,
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.bus.subscribe(topic)
    }

    async fn send<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| EnclaveError::CommandChannelClosed)?;
        rx.await.map_err(|_| EnclaveError::ReplyChannelClosed)
    }

    /// Terminating errors raised before a command reaches the worker still
    /// have to close the session.
    async fn guard_session<T>(&self, session: SessionId, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && err.terminates_session()
        {
            warn!(target: "enclave::session", %session, %err, "terminating session");
            let _ = self.tx.send(Command::CloseSession { session }).await;
        }
        result
    }

    async fn prove(&self, witness: Witness) -> Result<ProofBundle> {
        let circuit = witness.circuit();
        let orchestrator = Arc::clone(&self.orchestrator);
        let bundle = tokio::task::spawn_blocking(move || orchestrator.prove(&witness)).await?;
        self.bus.publish(Event::Proof(ProofEvent::Completed {
            circuit: circuit.as_str().to_string(),
            status: bundle.status,
        }));
        Ok(bundle)
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    pub async fn open_session(&self) -> Result<SessionId> {
        self.send(|reply| Command::OpenSession { reply }).await
    }

    pub async fn close_session(&self, session: SessionId) -> Result<()> {
        self.tx
            .send(Command::CloseSession { session })
            .await
            .map_err(|_| EnclaveError::CommandChannelClosed)
    }

    pub async fn challenge(&self, session: SessionId) -> Result<String> {
        self.send(|reply| Command::Challenge { session, reply })
            .await?
    }

    pub async fn login(
        &self,
        session: SessionId,
        address: &str,
        symbol: &str,
        signature: &str,
    ) -> Result<LoginAck> {
        self.send(|reply| Command::Login {
            session,
            address: address.to_string(),
            symbol: symbol.to_string(),
            signature: signature.to_string(),
            reply,
        })
        .await?
    }

    /// Serve one wire request, mapping the outcome to the matching
    /// [`ServerMessage`]. Failures come back as [`ServerMessage::Error`];
    /// terminating ones have already closed the session by the time the
    /// error message is built.
    pub async fn serve(&self, session: SessionId, request: ClientRequest) -> ServerMessage {
        let result = match request {
            ClientRequest::Challenge => self
                .challenge(session)
                .await
                .map(|nonce| ServerMessage::ChallengeResponse { nonce }),
            ClientRequest::Login {
                address,
                symbol,
                signature,
            } => self
                .login(session, &address, &symbol, &signature)
                .await
                .map(|ack| ServerMessage::LoginResponse {
                    address: ack.player.as_str().to_string(),
                    spawned: ack.spawned,
                }),
            ClientRequest::GetSpawnSignature { r, c, blind } => {
                self.get_spawn_signature(session, r, c, &blind).await
            }
            ClientRequest::GetMoveSignature {
                from_r,
                from_c,
                to_r,
                to_c,
                troops,
            } => {
                self.get_move_signature(session, from_r, from_c, to_r, to_c, troops)
                    .await
            }
            ClientRequest::Decrypt { r, c } => self
                .decrypt(session, r, c)
                .await
                .map(|tile| ServerMessage::DecryptResponse { tile }),
        };
        result.unwrap_or_else(|err| ServerMessage::Error {
            message: err.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Proposals
    // ------------------------------------------------------------------

    /// Full spawn flow: validate, register the claim, prove, attest, and
    /// submit on-chain. Always answers, even when proving fell all the way
    /// through to [`fow_zk::ProverStatus::Incomplete`].
    pub async fn get_spawn_signature(
        &self,
        session: SessionId,
        r: u32,
        c: u32,
        blind: &str,
    ) -> Result<ServerMessage> {
        let result = self.spawn_flow(session, r, c, blind).await;
        self.guard_session(session, result).await
    }

    async fn spawn_flow(
        &self,
        session: SessionId,
        r: u32,
        c: u32,
        blind: &str,
    ) -> Result<ServerMessage> {
        let loc = session::parse_location(r, c)?;
        let blind = session::parse_blind(blind)?;
        let proposal = self
            .send(|reply| Command::ProposeSpawn {
                session,
                loc,
                blind,
                reply,
            })
            .await??;

        let bundle = self.prove(proposal.witness.clone()).await?;
        if let Some(proof) = bundle.proof.clone() {
            let submission = SpawnSubmission {
                player: proposal.player.clone(),
                hash_prev: proposal.hash_prev,
                hash_spawn: proposal.hash_spawn,
                proof,
                signature: proposal.signature.clone(),
                block: proposal.block,
            };
            if let Err(err) = self.chain.submit_spawn(submission).await {
                warn!(target: "enclave::chain", %err, "spawn submission failed");
            }
        }
        Ok(ServerMessage::SpawnSignatureResponse {
            proof: bundle.proof,
            status: bundle.status,
            signature: hex::encode(&proposal.signature),
            hash_prev: hex::encode(proposal.hash_prev.as_bytes()),
            hash_spawn: hex::encode(proposal.hash_spawn.as_bytes()),
            block: proposal.block,
        })
    }

    /// Full move flow, mirroring [`EnclaveHandle::get_spawn_signature`].
    /// A failed chain write is logged and the claim is left to expire.
    pub async fn get_move_signature(
        &self,
        session: SessionId,
        from_r: u32,
        from_c: u32,
        to_r: u32,
        to_c: u32,
        troops: u32,
    ) -> Result<ServerMessage> {
        let result = self
            .move_flow(session, from_r, from_c, to_r, to_c, troops)
            .await;
        self.guard_session(session, result).await
    }

    async fn move_flow(
        &self,
        session: SessionId,
        from_r: u32,
        from_c: u32,
        to_r: u32,
        to_c: u32,
        troops: u32,
    ) -> Result<ServerMessage> {
        let from = session::parse_location(from_r, from_c)?;
        let to = session::parse_location(to_r, to_c)?;
        let proposal = self
            .send(|reply| Command::ProposeMove {
                session,
                from,
                to,
                troops,
                reply,
            })
            .await??;

        let bundle = self.prove(proposal.witness.clone()).await?;
        if let Some(proof) = bundle.proof.clone() {
            let submission = MoveSubmission {
                hash_from: proposal.hash_from,
                hash_to: proposal.hash_to,
                proof,
                signature: proposal.signature.clone(),
                block: proposal.block,
            };
            if let Err(err) = self.chain.submit_move(submission).await {
                warn!(target: "enclave::chain", %err, "move submission failed; claim will expire");
            }
        }
        Ok(ServerMessage::MoveSignatureResponse {
            proof: bundle.proof,
            status: bundle.status,
            signature: hex::encode(&proposal.signature),
            hash_from: hex::encode(proposal.hash_from.as_bytes()),
            hash_to: hex::encode(proposal.hash_to.as_bytes()),
            block: proposal.block,
        })
    }

    /// Fog-filtered tile view: the real tile when any of the surrounding
    /// 3x3 cells belongs to the requester, a mystery placeholder otherwise.
    pub async fn decrypt(&self, session: SessionId, r: u32, c: u32) -> Result<Tile> {
        let result = async {
            let loc = session::parse_location(r, c)?;
            self.send(|reply| Command::Decrypt {
                session,
                loc,
                reply,
            })
            .await?
        }
        .await;
        self.guard_session(session, result).await
    }

    // ------------------------------------------------------------------
    // Data-availability peer
    // ------------------------------------------------------------------

    pub async fn da_connect(&self) -> Result<DaHandshake> {
        self.send(|reply| Command::DaConnect { reply }).await?
    }

    pub async fn da_fetch(&self, peer: PeerId) -> Result<Option<EncryptedTileRecord>> {
        self.send(|reply| Command::DaFetch { peer, reply }).await?
    }

    pub async fn da_ack(&self, peer: PeerId) -> Result<()> {
        self.send(|reply| Command::DaAck { peer, reply }).await?
    }

    pub async fn da_recovered_tile(
        &self,
        peer: PeerId,
        record: EncryptedTileRecord,
    ) -> Result<u64> {
        self.send(|reply| Command::DaRecoveredTile {
            peer,
            record,
            reply,
        })
        .await?
    }

    pub async fn da_recovery_finished(&self, peer: PeerId) -> Result<RecoverySummary> {
        self.send(|reply| Command::DaRecoveryFinished { peer, reply })
            .await?
    }

    pub async fn da_disconnect(&self, peer: PeerId) -> Result<()> {
        self.tx
            .send(Command::DaDisconnect { peer })
            .await
            .map_err(|_| EnclaveError::CommandChannelClosed)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn tile(&self, loc: Location) -> Result<Tile> {
        self.send(|reply| Command::GetTile { loc, reply }).await
    }

    pub async fn is_spawned(&self, player: PlayerAddr) -> Result<bool> {
        self.send(|reply| Command::IsSpawned { player, reply }).await
    }

    pub async fn city_tiles(&self, city: CityId) -> Result<BTreeSet<Location>> {
        self.send(|reply| Command::CityTiles { city, reply }).await
    }

    pub async fn pending_moves(&self) -> Result<usize> {
        self.send(|reply| Command::PendingMoves { reply }).await
    }

    pub async fn outbox_depth(&self) -> Result<usize> {
        self.send(|reply| Command::OutboxDepth { reply }).await
    }

    pub async fn block_height(&self) -> Result<u64> {
        self.send(|reply| Command::BlockHeight { reply }).await
    }
}
