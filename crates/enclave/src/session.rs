//! Player sessions: challenge/login handshake and the request/response
//! vocabulary spoken over a session connection.
//!
//! A player's chain identity is an ed25519 verifying key (hex). Login proves
//! possession of the matching signing key by signing the session's challenge
//! nonce. Any validation or conflict failure terminates the session; the
//! transport layer is expected to drop the connection when it sees one.

use std::collections::HashMap;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;

use fow_core::{Location, PlayerAddr, Tile};
use fow_zk::{Proof, ProverStatus};

use crate::error::EnclaveError;
use crate::events::DisplayEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

// ============================================================================
// Wire messages
// ============================================================================

/// Requests a client may send over its session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientRequest {
    Challenge,
    Login {
        address: String,
        symbol: String,
        /// Hex ed25519 signature over the challenge nonce.
        signature: String,
    },
    GetSpawnSignature {
        r: u32,
        c: u32,
        /// Decimal blind factor for the spawn commitment.
        blind: String,
    },
    GetMoveSignature {
        from_r: u32,
        from_c: u32,
        to_r: u32,
        to_c: u32,
        troops: u32,
    },
    Decrypt {
        r: u32,
        c: u32,
    },
}

/// Responses and pushes a session may receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    ChallengeResponse {
        nonce: String,
    },
    LoginResponse {
        address: String,
        spawned: bool,
    },
    SpawnSignatureResponse {
        proof: Option<Proof>,
        status: ProverStatus,
        signature: String,
        hash_prev: String,
        hash_spawn: String,
        block: u64,
    },
    MoveSignatureResponse {
        proof: Option<Proof>,
        status: ProverStatus,
        signature: String,
        hash_from: String,
        hash_to: String,
        block: u64,
    },
    DecryptResponse {
        tile: Tile,
    },
    /// Push: cells changed in the player's view.
    UpdateDisplay {
        locations: Vec<Location>,
    },
    /// Push: the spawn transaction failed, try another spot.
    TrySpawn,
    Error {
        message: String,
    },
}

/// Display events address a single player; once the transport has routed
/// one to its session, the wire push drops the address.
impl From<DisplayEvent> for ServerMessage {
    fn from(event: DisplayEvent) -> Self {
        match event {
            DisplayEvent::UpdateDisplay { locations, .. } => ServerMessage::UpdateDisplay {
                locations: locations.into_iter().collect(),
            },
            DisplayEvent::TrySpawn { .. } => ServerMessage::TrySpawn,
        }
    }
}

// ============================================================================
// Boundary validation
// ============================================================================

/// Parse client coordinates, rejecting anything off the board.
pub fn parse_location(r: u32, c: u32) -> Result<Location, EnclaveError> {
    Ok(Location::try_new(r, c)?)
}

/// Blind factors arrive as decimal strings; anything non-numeric is a
/// protocol violation.
pub fn parse_blind(blind: &str) -> Result<u128, EnclaveError> {
    blind
        .parse::<u128>()
        .map_err(|_| EnclaveError::Validation(format!("blind factor is not numeric: {blind:?}")))
}

// ============================================================================
// Registry
// ============================================================================

struct SessionState {
    challenge: Option<[u8; 32]>,
    player: Option<PlayerAddr>,
}

/// Tracks open sessions, outstanding challenges, and which player is bound
/// to which session. One session per player and one player per session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionState>,
    by_player: HashMap<PlayerAddr, SessionId>,
    next_id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.sessions.insert(
            id,
            SessionState {
                challenge: None,
                player: None,
            },
        );
        id
    }

    /// Issue (or rotate) the login challenge for a session.
    pub fn issue_challenge(&mut self, session: SessionId) -> Result<[u8; 32], EnclaveError> {
        let state = self
            .sessions
            .get_mut(&session)
            .ok_or_else(|| EnclaveError::Validation(format!("unknown {session}")))?;
        let mut nonce = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        state.challenge = Some(nonce);
        Ok(nonce)
    }

    /// Complete login: verify the signature over the outstanding challenge
    /// against the address' verifying key, then bind player to session.
    pub fn login(
        &mut self,
        session: SessionId,
        address: &str,
        signature_hex: &str,
    ) -> Result<PlayerAddr, EnclaveError> {
        let player = PlayerAddr::new(address);
        if self.by_player.contains_key(&player) {
            return Err(EnclaveError::Conflict(format!(
                "player {player} is already logged in"
            )));
        }
        let state = self
            .sessions
            .get_mut(&session)
            .ok_or_else(|| EnclaveError::Validation(format!("unknown {session}")))?;
        if state.player.is_some() {
            return Err(EnclaveError::Conflict(format!(
                "{session} is already logged in"
            )));
        }
        let challenge = state
            .challenge
            .take()
            .ok_or_else(|| EnclaveError::Validation("login without a challenge".into()))?;

        let key = verifying_key(player.as_str())?;
        let signature = parse_signature(signature_hex)?;
        key.verify(&challenge, &signature)
            .map_err(|_| EnclaveError::Validation("challenge signature does not verify".into()))?;

        state.player = Some(player.clone());
        self.by_player.insert(player.clone(), session);
        info!(target: "enclave::session", %session, %player, "login complete");
        Ok(player)
    }

    /// The player bound to a session, for request authorization.
    pub fn player_of(&self, session: SessionId) -> Result<&PlayerAddr, EnclaveError> {
        self.sessions
            .get(&session)
            .and_then(|s| s.player.as_ref())
            .ok_or_else(|| EnclaveError::Validation(format!("{session} is not logged in")))
    }

    pub fn is_logged_in(&self, player: &PlayerAddr) -> bool {
        self.by_player.contains_key(player)
    }

    /// Drop a session and release its player binding. Called both on clean
    /// disconnect and after a terminating error.
    pub fn close(&mut self, session: SessionId) {
        if let Some(state) = self.sessions.remove(&session)
            && let Some(player) = state.player
        {
            self.by_player.remove(&player);
            info!(target: "enclave::session", %session, %player, "session closed");
        }
    }
}

fn verifying_key(address: &str) -> Result<VerifyingKey, EnclaveError> {
    let bytes = hex::decode(address)
        .map_err(|_| EnclaveError::Validation("address is not valid hex".into()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| EnclaveError::Validation("address must be 32 bytes of hex".into()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| EnclaveError::Validation("address is not a valid verifying key".into()))
}

fn parse_signature(hex_sig: &str) -> Result<Signature, EnclaveError> {
    let bytes = hex::decode(hex_sig)
        .map_err(|_| EnclaveError::Validation("signature is not valid hex".into()))?;
    let bytes: [u8; 64] = bytes
        .try_into()
        .map_err(|_| EnclaveError::Validation("signature must be 64 bytes".into()))?;
    Ok(Signature::from_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair() -> (SigningKey, String) {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        let address = hex::encode(signing.verifying_key().to_bytes());
        (signing, address)
    }

    #[test]
    fn challenge_login_round_trip() {
        let mut registry = SessionRegistry::new();
        let (signing, address) = keypair();
        let session = registry.open();
        let nonce = registry.issue_challenge(session).unwrap();
        let signature = hex::encode(signing.sign(&nonce).to_bytes());

        let player = registry.login(session, &address, &signature).unwrap();
        assert_eq!(player, PlayerAddr::new(&address));
        assert!(registry.is_logged_in(&player));
        assert_eq!(registry.player_of(session).unwrap(), &player);
    }

    #[test]
    fn wrong_key_fails_login() {
        let mut registry = SessionRegistry::new();
        let (_victim, address) = keypair();
        let (attacker, _) = keypair();
        let session = registry.open();
        let nonce = registry.issue_challenge(session).unwrap();
        let signature = hex::encode(attacker.sign(&nonce).to_bytes());

        let err = registry.login(session, &address, &signature).unwrap_err();
        assert!(matches!(err, EnclaveError::Validation(_)));
    }

    #[test]
    fn double_login_is_a_conflict() {
        let mut registry = SessionRegistry::new();
        let (signing, address) = keypair();

        let first = registry.open();
        let nonce = registry.issue_challenge(first).unwrap();
        let sig = hex::encode(signing.sign(&nonce).to_bytes());
        registry.login(first, &address, &sig).unwrap();

        let second = registry.open();
        let nonce = registry.issue_challenge(second).unwrap();
        let sig = hex::encode(signing.sign(&nonce).to_bytes());
        let err = registry.login(second, &address, &sig).unwrap_err();
        assert!(matches!(err, EnclaveError::Conflict(_)));
    }

    #[test]
    fn rebinding_a_session_does_not_orphan_the_first_player() {
        let mut registry = SessionRegistry::new();
        let (alice, alice_addr) = keypair();
        let (bob, bob_addr) = keypair();

        let session = registry.open();
        let nonce = registry.issue_challenge(session).unwrap();
        let sig = hex::encode(alice.sign(&nonce).to_bytes());
        registry.login(session, &alice_addr, &sig).unwrap();

        // The session is already bound; a second identity is rejected and
        // the first binding survives.
        let nonce = registry.issue_challenge(session).unwrap();
        let sig = hex::encode(bob.sign(&nonce).to_bytes());
        let err = registry.login(session, &bob_addr, &sig).unwrap_err();
        assert!(matches!(err, EnclaveError::Conflict(_)));
        assert_eq!(
            registry.player_of(session).unwrap(),
            &PlayerAddr::new(&alice_addr)
        );

        // Closing the session releases the first player for a fresh login.
        registry.close(session);
        assert!(!registry.is_logged_in(&PlayerAddr::new(&alice_addr)));
        let retry = registry.open();
        let nonce = registry.issue_challenge(retry).unwrap();
        let sig = hex::encode(alice.sign(&nonce).to_bytes());
        registry.login(retry, &alice_addr, &sig).unwrap();
    }

    #[test]
    fn close_releases_the_player() {
        let mut registry = SessionRegistry::new();
        let (signing, address) = keypair();
        let session = registry.open();
        let nonce = registry.issue_challenge(session).unwrap();
        let sig = hex::encode(signing.sign(&nonce).to_bytes());
        let player = registry.login(session, &address, &sig).unwrap();

        registry.close(session);
        assert!(!registry.is_logged_in(&player));
    }

    #[test]
    fn challenge_is_single_use() {
        let mut registry = SessionRegistry::new();
        let (signing, address) = keypair();
        let session = registry.open();
        let nonce = registry.issue_challenge(session).unwrap();
        let sig = hex::encode(signing.sign(&nonce).to_bytes());

        // A failed login consumed the challenge; replaying needs a new one.
        let (other, _) = keypair();
        let bad = hex::encode(other.sign(&nonce).to_bytes());
        assert!(registry.login(session, &address, &bad).is_err());
        assert!(matches!(
            registry.login(session, &address, &sig).unwrap_err(),
            EnclaveError::Validation(_)
        ));
    }

    #[test]
    fn requests_use_tagged_camel_case_wire_shape() {
        let request: ClientRequest = serde_json::from_str(
            r#"{"type":"getMoveSignature","fromR":5,"fromC":5,"toR":5,"toC":6,"troops":20}"#,
        )
        .unwrap();
        assert!(matches!(
            request,
            ClientRequest::GetMoveSignature {
                from_r: 5,
                to_c: 6,
                troops: 20,
                ..
            }
        ));

        let push = serde_json::to_value(ServerMessage::TrySpawn).unwrap();
        assert_eq!(push["type"], "trySpawn");
    }

    #[test]
    fn display_events_map_to_wire_pushes() {
        let locations: std::collections::BTreeSet<Location> =
            [Location::new(5, 6), Location::new(5, 5)].into_iter().collect();
        let push: ServerMessage = DisplayEvent::UpdateDisplay {
            player: PlayerAddr::new("0xaa"),
            locations,
        }
        .into();
        match push {
            ServerMessage::UpdateDisplay { locations } => {
                assert_eq!(locations, vec![Location::new(5, 5), Location::new(5, 6)]);
            }
            other => panic!("unexpected push {other:?}"),
        }

        let push: ServerMessage = DisplayEvent::TrySpawn {
            player: PlayerAddr::new("0xaa"),
        }
        .into();
        assert!(matches!(push, ServerMessage::TrySpawn));
    }

    #[test]
    fn blind_factor_must_be_numeric() {
        assert_eq!(parse_blind("12345").unwrap(), 12345);
        assert!(parse_blind("0x12").is_err());
        assert!(parse_blind("twelve").is_err());
    }

    #[test]
    fn out_of_bounds_coordinates_are_rejected() {
        assert!(parse_location(0, 1023).is_ok());
        assert!(parse_location(0, 1024).is_err());
    }
}
