//! Deterministic fog-of-war game model shared by the enclave and provers.
//!
//! `fow-core` defines the canonical rules: locations, tiles, terrain
//! synthesis, the authoritative [`Board`], and the pure troop-movement
//! helpers. Everything here is side-effect free (the terrain memo aside)
//! so the same inputs always produce bit-identical outputs, which is what
//! crash recovery and proof generation rely on.
pub mod board;
pub mod location;
pub mod player;
pub mod terrain;
pub mod tile;
pub mod troops;

pub use board::{Board, BoardError};
pub use location::{COORDINATE_MAX, Location, LocationError};
pub use player::{Player, PlayerAddr};
pub use terrain::{Terrain, TerrainCache, TerrainParams};
pub use tile::{
    AccessKey, BONUS_TILE_TROOPS, CityId, Interval, Randomness, Tile, TileHash, TileKind,
};
pub use troops::{MoveRuleError, compute_from_tile, compute_onto_tile, compute_updated_troops};
