use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Terrain category a location synthesizes to when no tile is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    Bare,
    Water,
    Hill,
    Bonus,
}

/// Parameters of the deterministic noise function. Part of the virtual-tile
/// commitment inputs: changing any of these changes every virtual tile.
///
/// The noise sample for a location is scaled to `[0, 10^digits)` and then
/// bucketed: `>= hill_threshold` is hill, `<= water_threshold` is water,
/// `>= bonus_threshold` (but below hill) is a bonus-troops tile, anything
/// else is bare ground.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainParams {
    pub seed: u64,
    /// Lattice cell width; larger values make smoother terrain.
    pub denom: u32,
    pub digits: u32,
    pub hill_threshold: i64,
    pub water_threshold: i64,
    pub bonus_threshold: i64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 0,
            denom: 8,
            digits: 3,
            hill_threshold: 750,
            water_threshold: 220,
            bonus_threshold: 700,
        }
    }
}

/// Memoized location → terrain mapping.
///
/// `terrain_at` is a pure function of `(params, location)`; the memo is the
/// only mutable state and never changes an answer, so lookups stay valid
/// across restarts as long as the params match.
#[derive(Debug)]
pub struct TerrainCache {
    params: TerrainParams,
    memo: Mutex<HashMap<Location, Terrain>>,
}

/// Fixed-point scale for noise interpolation (2^16).
const SCALE: i64 = 1 << 16;

impl TerrainCache {
    pub fn new(params: TerrainParams) -> Self {
        Self {
            params,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    pub fn terrain_at(&self, loc: Location) -> Terrain {
        let mut memo = match self.memo.lock() {
            Ok(memo) => memo,
            // A poisoned memo only ever holds valid answers.
            Err(poisoned) => poisoned.into_inner(),
        };
        *memo.entry(loc).or_insert_with(|| self.classify(loc))
    }

    fn classify(&self, loc: Location) -> Terrain {
        let value = self.sample(loc);
        if value >= self.params.hill_threshold {
            Terrain::Hill
        } else if value <= self.params.water_threshold {
            Terrain::Water
        } else if value >= self.params.bonus_threshold {
            Terrain::Bonus
        } else {
            Terrain::Bare
        }
    }

    /// Value noise scaled to `[0, 10^digits)`. Integer-only so every
    /// platform computes the same terrain.
    fn sample(&self, loc: Location) -> i64 {
        let denom = self.params.denom.max(1) as i64;
        let r = loc.r as i64;
        let c = loc.c as i64;

        let cell_r = r / denom;
        let cell_c = c / denom;
        // Fractional position inside the lattice cell, in [0, SCALE).
        let fr = (r % denom) * SCALE / denom;
        let fc = (c % denom) * SCALE / denom;

        let v00 = lattice(self.params.seed, cell_r, cell_c);
        let v01 = lattice(self.params.seed, cell_r, cell_c + 1);
        let v10 = lattice(self.params.seed, cell_r + 1, cell_c);
        let v11 = lattice(self.params.seed, cell_r + 1, cell_c + 1);

        let tr = fade(fr);
        let tc = fade(fc);

        let top = lerp(v00, v01, tc);
        let bottom = lerp(v10, v11, tc);
        let value = lerp(top, bottom, tr);

        value * 10i64.pow(self.params.digits) / SCALE
    }
}

/// Hash of `(seed, x, y)` mapped into `[0, SCALE)`. splitmix64 finalizer.
fn lattice(seed: u64, x: i64, y: i64) -> i64 {
    let mut h = seed
        ^ (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (y as u64).wrapping_mul(0xD1B5_4A32_D192_ED03);
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 33;
    h = h.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    h ^= h >> 33;
    (h & (SCALE as u64 - 1)) as i64
}

/// Smoothstep in fixed point: 3t² - 2t³ with t in [0, SCALE].
fn fade(t: i64) -> i64 {
    let t2 = t * t / SCALE;
    let t3 = t2 * t / SCALE;
    3 * t2 - 2 * t3
}

fn lerp(a: i64, b: i64, t: i64) -> i64 {
    a + (b - a) * t / SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terrain_is_deterministic() {
        let a = TerrainCache::new(TerrainParams::default());
        let b = TerrainCache::new(TerrainParams::default());
        for r in 0..32 {
            for c in 0..32 {
                let loc = Location::new(r, c);
                assert_eq!(a.terrain_at(loc), b.terrain_at(loc));
            }
        }
    }

    #[test]
    fn memo_does_not_change_answers() {
        let cache = TerrainCache::new(TerrainParams::default());
        let loc = Location::new(12, 12);
        let first = cache.terrain_at(loc);
        assert_eq!(first, cache.terrain_at(loc));
    }

    #[test]
    fn seed_changes_the_map() {
        let a = TerrainCache::new(TerrainParams::default());
        let b = TerrainCache::new(TerrainParams {
            seed: 42,
            ..TerrainParams::default()
        });
        let differs = (0..64).any(|r| {
            (0..64).any(|c| a.terrain_at(Location::new(r, c)) != b.terrain_at(Location::new(r, c)))
        });
        assert!(differs);
    }

    #[test]
    fn all_categories_appear_on_a_large_sample() {
        let cache = TerrainCache::new(TerrainParams::default());
        let mut seen = std::collections::HashSet::new();
        for r in 0..256 {
            for c in 0..256 {
                seen.insert(cache.terrain_at(Location::new(r, c)));
            }
        }
        assert!(seen.contains(&Terrain::Bare));
        assert!(seen.contains(&Terrain::Water));
        assert!(seen.contains(&Terrain::Hill));
    }
}
