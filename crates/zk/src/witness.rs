use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use fow_core::{Interval, Randomness, TerrainParams, Tile};

/// Named circuits the enclave can request proofs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Circuit {
    /// A virtual-tile commitment is correctly derived from the committed
    /// randomness and the public terrain parameters.
    VirtualTile,
    /// A move transition follows the troop rules.
    Move,
    /// A spawn claim is consistent with the pre-spawn terrain truth.
    Spawn,
}

impl Circuit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Circuit::VirtualTile => "virtual_tile",
            Circuit::Move => "move",
            Circuit::Spawn => "spawn",
        }
    }
}

/// Private inputs for the virtual-tile circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualTileWitness {
    pub tile: Tile,
    pub randomness: Randomness,
    pub params: TerrainParams,
}

/// Private inputs for the move circuit. `u_from`/`u_to` are the claimed
/// post-move tiles; the updated troop counts bake in water decay and the
/// chain-reported city totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveWitness {
    pub t_from: Tile,
    pub t_to: Tile,
    pub u_from: Tile,
    pub u_to: Tile,
    pub source_updated_troops: u32,
    pub target_updated_troops: u32,
    pub troops_moved: u32,
    pub current_interval: Interval,
}

/// Private inputs for the spawn circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnWitness {
    /// Terrain truth at the spawn location before the spawn.
    pub prev_tile: Tile,
    pub spawn_tile: Tile,
    /// Player-supplied blind factor for the spawn commitment.
    pub blind: u128,
}

/// A complete witness tagged with its circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Witness {
    VirtualTile(VirtualTileWitness),
    Move(MoveWitness),
    Spawn(SpawnWitness),
}

impl Witness {
    pub fn circuit(&self) -> Circuit {
        match self {
            Witness::VirtualTile(_) => Circuit::VirtualTile,
            Witness::Move(_) => Circuit::Move,
            Witness::Spawn(_) => Circuit::Spawn,
        }
    }

    /// The public signals a valid proof for this witness must expose.
    /// Backends are expected to reproduce exactly this vector.
    pub fn public_signals(&self) -> Vec<String> {
        match self {
            Witness::VirtualTile(w) => vec![
                hex::encode(Sha256::digest(w.randomness.as_bytes())),
                hex::encode(w.tile.hash().as_bytes()),
            ],
            Witness::Move(w) => vec![
                w.current_interval.to_string(),
                hex::encode(w.u_from.hash().as_bytes()),
                hex::encode(w.u_to.hash().as_bytes()),
                hex::encode(w.t_from.nullifier().as_bytes()),
                hex::encode(w.t_to.nullifier().as_bytes()),
            ],
            Witness::Spawn(w) => vec![
                hex::encode(w.prev_tile.hash().as_bytes()),
                hex::encode(w.spawn_tile.hash().as_bytes()),
                hex::encode(Sha256::digest(w.blind.to_le_bytes())),
            ],
        }
    }
}
