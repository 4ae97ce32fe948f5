//! Pending state transitions awaiting chain finalization.
//!
//! Nothing mutates the board at proposal time. A proposal only registers a
//! claim here; the matching chain event either applies it or discards it,
//! and unfinalized claims are swept once their lifespan elapses.

use std::collections::HashMap;

use tracing::debug;

use fow_core::{PlayerAddr, Tile, TileHash};

use crate::da::EncryptedTileRecord;

/// Identifies a pending move the way the chain does: by the hashes of both
/// resulting tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MoveKey {
    pub from: TileHash,
    pub to: TileHash,
}

/// A proposed move waiting for on-chain finalization.
#[derive(Clone, Debug)]
pub struct ClaimedMove {
    pub u_from: Tile,
    pub u_to: Tile,
    pub block_submitted: u64,
    /// Sealed copies of both result tiles, already on the DA queue. Kept so
    /// the claim is self-contained if the records ever need re-queueing.
    pub records: [EncryptedTileRecord; 2],
}

/// A proposed spawn waiting for the chain to accept or reject it. Keyed by
/// player; the chain event that resolves it carries only the player address.
#[derive(Clone, Debug)]
pub struct ClaimedSpawn {
    pub virtual_tile: Tile,
    pub spawn_tile: Tile,
    pub block_submitted: u64,
}

#[derive(Debug)]
pub struct ClaimRegistry {
    moves: HashMap<MoveKey, ClaimedMove>,
    spawns: HashMap<PlayerAddr, ClaimedSpawn>,
    last_proposed: HashMap<PlayerAddr, u64>,
    lifespan: u64,
}

impl ClaimRegistry {
    /// `lifespan` is the number of blocks a move claim stays pending: a
    /// claim submitted at height `h` survives through `h + lifespan` and is
    /// swept at `h + lifespan + 1`.
    pub fn new(lifespan: u64) -> Self {
        Self {
            moves: HashMap::new(),
            spawns: HashMap::new(),
            last_proposed: HashMap::new(),
            lifespan,
        }
    }

    /// One proposal (move or spawn) per player per block.
    pub fn may_propose(&self, player: &PlayerAddr, height: u64) -> bool {
        self.last_proposed.get(player).is_none_or(|&h| h < height)
    }

    pub fn note_proposal(&mut self, player: PlayerAddr, height: u64) {
        self.last_proposed.insert(player, height);
    }

    pub fn register_move(&mut self, key: MoveKey, claim: ClaimedMove) {
        debug!(
            target: "enclave::claims",
            from = %key.from,
            to = %key.to,
            block = claim.block_submitted,
            "move claim registered"
        );
        self.moves.insert(key, claim);
    }

    /// Resolve a finalized move. `None` for finalizations the registry does
    /// not know about (already swept, or produced before a restart); the
    /// caller logs and moves on.
    pub fn take_move(&mut self, key: &MoveKey) -> Option<ClaimedMove> {
        self.moves.remove(key)
    }

    pub fn pending_moves(&self) -> usize {
        self.moves.len()
    }

    pub fn register_spawn(&mut self, player: PlayerAddr, claim: ClaimedSpawn) {
        debug!(
            target: "enclave::claims",
            %player,
            block = claim.block_submitted,
            "spawn claim registered"
        );
        self.spawns.insert(player, claim);
    }

    pub fn take_spawn(&mut self, player: &PlayerAddr) -> Option<ClaimedSpawn> {
        self.spawns.remove(player)
    }

    pub fn has_pending_spawn(&self, player: &PlayerAddr) -> bool {
        self.spawns.contains_key(player)
    }

    /// Sweep move claims whose lifespan elapsed at `height`. Returns the
    /// expired claims so the caller can log them.
    pub fn expire(&mut self, height: u64) -> Vec<(MoveKey, ClaimedMove)> {
        let lifespan = self.lifespan;
        let expired: Vec<MoveKey> = self
            .moves
            .iter()
            .filter(|(_, claim)| claim.block_submitted + lifespan < height)
            .map(|(key, _)| *key)
            .collect();
        expired
            .into_iter()
            .filter_map(|key| self.moves.remove(&key).map(|claim| (key, claim)))
            .collect()
    }

    /// Sweep spawn claims on the same lifespan schedule. A spawn whose
    /// submission never landed gets no `SpawnAttempted` event, so the sweep
    /// is what unblocks the player for a retry.
    pub fn expire_spawns(&mut self, height: u64) -> Vec<(PlayerAddr, ClaimedSpawn)> {
        let lifespan = self.lifespan;
        let expired: Vec<PlayerAddr> = self
            .spawns
            .iter()
            .filter(|(_, claim)| claim.block_submitted + lifespan < height)
            .map(|(player, _)| player.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|player| {
                self.spawns
                    .remove(&player)
                    .map(|claim| (player.clone(), claim))
            })
            .collect()
    }
}
