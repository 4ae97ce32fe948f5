//! In-process software proving backend.
//!
//! Fallback used when the fast backend is unavailable or misbehaves.
//! It re-executes the circuit semantics against `fow-core` and emits a
//! hash-transcript proof over the witness and its public signals. Slower
//! to verify on-chain than the native backend's output, but always
//! available.

use sha2::{Digest, Sha256};

use fow_core::{
    AccessKey, Terrain, TerrainCache, Tile, TileKind, compute_from_tile, compute_onto_tile,
};

use crate::prover::{Proof, ProofError, ProverBackend};
use crate::witness::{Circuit, MoveWitness, SpawnWitness, VirtualTileWitness, Witness};

#[derive(Debug, Clone, Default)]
pub struct SoftwareProver;

impl SoftwareProver {
    pub fn new() -> Self {
        Self
    }

    fn check_virtual_tile(&self, w: &VirtualTileWitness) -> Result<(), ProofError> {
        let key = AccessKey::derive(&w.randomness, w.tile.loc);
        let cache = TerrainCache::new(w.params);
        let expected = match cache.terrain_at(w.tile.loc) {
            Terrain::Hill => Tile::hill(w.tile.loc, key),
            Terrain::Water => Tile::water(w.tile.loc, key),
            Terrain::Bonus => Tile::bonus(w.tile.loc, key),
            Terrain::Bare => Tile::bare(w.tile.loc, key),
        };
        if expected != w.tile {
            return Err(ProofError::WitnessInconsistency(format!(
                "tile at {} is not the synthesized virtual tile",
                w.tile.loc
            )));
        }
        Ok(())
    }

    fn check_move(&self, w: &MoveWitness) -> Result<(), ProofError> {
        let u_from = compute_from_tile(
            &w.t_from,
            w.source_updated_troops,
            w.troops_moved,
            w.current_interval,
            w.u_from.access_key,
        )
        .map_err(|e| ProofError::WitnessInconsistency(e.to_string()))?;
        if u_from != w.u_from {
            return Err(ProofError::WitnessInconsistency(
                "claimed source tile does not follow the move rules".into(),
            ));
        }

        let u_to = compute_onto_tile(
            &w.t_to,
            &w.t_from,
            &u_from,
            w.target_updated_troops,
            w.troops_moved,
            w.current_interval,
            w.u_to.access_key,
        )
        .map_err(|e| ProofError::WitnessInconsistency(e.to_string()))?;
        if u_to != w.u_to {
            return Err(ProofError::WitnessInconsistency(
                "claimed target tile does not follow the move rules".into(),
            ));
        }
        Ok(())
    }

    fn check_spawn(&self, w: &SpawnWitness) -> Result<(), ProofError> {
        if !w.prev_tile.is_unowned() {
            return Err(ProofError::WitnessInconsistency(
                "spawn location was already owned".into(),
            ));
        }
        if w.prev_tile.is_hill() || w.prev_tile.is_water() {
            return Err(ProofError::WitnessInconsistency(
                "spawn location is impassable".into(),
            ));
        }
        if w.spawn_tile.kind != TileKind::CityCenter || w.spawn_tile.loc != w.prev_tile.loc {
            return Err(ProofError::WitnessInconsistency(
                "spawn tile is not a city center at the claimed location".into(),
            ));
        }
        Ok(())
    }
}

impl ProverBackend for SoftwareProver {
    fn name(&self) -> &'static str {
        "software"
    }

    fn prove(&self, circuit: Circuit, witness: &Witness) -> Result<Proof, ProofError> {
        match (circuit, witness) {
            (Circuit::VirtualTile, Witness::VirtualTile(w)) => self.check_virtual_tile(w)?,
            (Circuit::Move, Witness::Move(w)) => self.check_move(w)?,
            (Circuit::Spawn, Witness::Spawn(w)) => self.check_spawn(w)?,
            _ => {
                return Err(ProofError::WitnessInconsistency(format!(
                    "witness does not match circuit {}",
                    circuit.as_str()
                )));
            }
        }

        let public_signals = witness.public_signals();

        let mut transcript = Sha256::new();
        transcript.update(b"fow.software.proof");
        transcript.update(circuit.as_str().as_bytes());
        transcript.update(serde_json::to_vec(witness)?);
        for signal in &public_signals {
            transcript.update(signal.as_bytes());
        }

        Ok(Proof {
            bytes: transcript.finalize().to_vec(),
            public_signals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fow_core::{CityId, Location, Player, PlayerAddr, Randomness, TerrainParams};

    fn key(byte: u8) -> AccessKey {
        AccessKey::from_bytes([byte; 32])
    }

    #[test]
    fn proves_a_genuine_virtual_tile() {
        let rand = Randomness([1u8; 32]);
        let params = TerrainParams::default();
        let loc = Location::new(3, 4);
        let derived = AccessKey::derive(&rand, loc);
        let cache = TerrainCache::new(params);
        let tile = match cache.terrain_at(loc) {
            Terrain::Hill => Tile::hill(loc, derived),
            Terrain::Water => Tile::water(loc, derived),
            Terrain::Bonus => Tile::bonus(loc, derived),
            Terrain::Bare => Tile::bare(loc, derived),
        };

        let witness = Witness::VirtualTile(VirtualTileWitness {
            tile,
            randomness: rand,
            params,
        });
        let proof = SoftwareProver::new()
            .prove(Circuit::VirtualTile, &witness)
            .unwrap();
        assert_eq!(proof.public_signals, witness.public_signals());
    }

    #[test]
    fn rejects_a_forged_virtual_tile() {
        let rand = Randomness([1u8; 32]);
        let loc = Location::new(3, 4);
        let mut tile = Tile::bare(loc, AccessKey::derive(&rand, loc));
        tile.resources = 1000;

        let witness = Witness::VirtualTile(VirtualTileWitness {
            tile,
            randomness: rand,
            params: TerrainParams::default(),
        });
        assert!(
            SoftwareProver::new()
                .prove(Circuit::VirtualTile, &witness)
                .is_err()
        );
    }

    #[test]
    fn rejects_a_move_that_breaks_the_rules() {
        let a = Player::new("A", PlayerAddr::new("0xaa"));
        let t_from = Tile::city_center(a, Location::new(0, 0), 50, CityId(1), 0, key(1));
        let t_to = Tile::bare(Location::new(0, 1), key(2));

        let u_from = compute_from_tile(&t_from, 50, 49, 3, key(3)).unwrap();
        let mut u_to =
            compute_onto_tile(&t_to, &t_from, &u_from, 0, 49, 3, key(4)).unwrap();
        // Forge an extra troop on the destination.
        u_to.resources += 1;

        let witness = Witness::Move(MoveWitness {
            t_from,
            t_to,
            u_from,
            u_to,
            source_updated_troops: 50,
            target_updated_troops: 0,
            troops_moved: 49,
            current_interval: 3,
        });
        assert!(SoftwareProver::new().prove(Circuit::Move, &witness).is_err());
    }

    #[test]
    fn proves_a_legal_move() {
        let a = Player::new("A", PlayerAddr::new("0xaa"));
        let t_from = Tile::city_center(a, Location::new(0, 0), 50, CityId(1), 0, key(1));
        let t_to = Tile::bare(Location::new(0, 1), key(2));
        let u_from = compute_from_tile(&t_from, 50, 49, 3, key(3)).unwrap();
        let u_to = compute_onto_tile(&t_to, &t_from, &u_from, 0, 49, 3, key(4)).unwrap();

        let witness = Witness::Move(MoveWitness {
            t_from,
            t_to,
            u_from,
            u_to,
            source_updated_troops: 50,
            target_updated_troops: 0,
            troops_moved: 49,
            current_interval: 3,
        });
        let proof = SoftwareProver::new().prove(Circuit::Move, &witness).unwrap();
        assert!(!proof.bytes.is_empty());
    }
}
