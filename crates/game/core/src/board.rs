use std::collections::{BTreeMap, BTreeSet};

use crate::location::Location;
use crate::player::{Player, PlayerAddr};
use crate::terrain::{Terrain, TerrainCache, TerrainParams};
use crate::tile::{AccessKey, CityId, Randomness, Tile};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("location {loc} is out of bounds")]
    OutOfBounds { loc: Location },

    #[error("tried to spawn on owned tile at {loc}")]
    SpawnOnOwnedTile { loc: Location },

    #[error("tried to spawn on impassable terrain at {loc}")]
    SpawnOnImpassable { loc: Location },
}

/// Authoritative sparse board plus city/ownership bookkeeping.
///
/// The map is logically total: locations without a recorded tile synthesize
/// a virtual tile deterministically from `(location, randomness, terrain)`.
/// Bookkeeping invariants maintained by [`Board::set_tile`]:
///
/// - every city id in a player's set has all its tiles owned by that player;
/// - every owned tile's city id appears in exactly one player's set;
/// - empty city sets are pruned, so `is_spawned` ⟺ the player owns a city.
#[derive(Debug)]
pub struct Board {
    tiles: BTreeMap<Location, Tile>,
    player_cities: BTreeMap<PlayerAddr, BTreeSet<CityId>>,
    city_tiles: BTreeMap<CityId, BTreeSet<Location>>,
    terrain: TerrainCache,
}

impl Board {
    pub fn new(params: TerrainParams) -> Self {
        Self {
            tiles: BTreeMap::new(),
            player_cities: BTreeMap::new(),
            city_tiles: BTreeMap::new(),
            terrain: TerrainCache::new(params),
        }
    }

    /// Mystery placeholder grid for the initial client display. Purely
    /// cosmetic: nothing here touches the authoritative map.
    pub fn seed(size: u32) -> Vec<Tile> {
        let mut tiles = Vec::with_capacity((size * size) as usize);
        for r in 0..size {
            for c in 0..size {
                tiles.push(Tile::mystery(Location::new(r, c)));
            }
        }
        tiles
    }

    /// Founds a new city: the target must currently be unowned and not a
    /// hill or water tile. On success the location becomes the city center.
    pub fn spawn(
        &mut self,
        loc: Location,
        player: Player,
        resources: u32,
        city_id: CityId,
        interval: u64,
        access_key: AccessKey,
        randomness: &Randomness,
    ) -> Result<Tile, BoardError> {
        if !loc.in_bounds() {
            return Err(BoardError::OutOfBounds { loc });
        }
        let current = self.get_tile(loc, randomness);
        if !current.is_unowned() {
            return Err(BoardError::SpawnOnOwnedTile { loc });
        }
        if current.is_hill() || current.is_water() {
            return Err(BoardError::SpawnOnImpassable { loc });
        }

        let tile = Tile::city_center(player, loc, resources, city_id, interval, access_key);
        self.set_tile(tile.clone());
        Ok(tile)
    }

    /// Total tile lookup. Stored tiles are returned as-is; unset locations
    /// synthesize a virtual tile as a pure function of
    /// `(loc, randomness, terrain params)`.
    pub fn get_tile(&self, loc: Location, randomness: &Randomness) -> Tile {
        if let Some(tile) = self.tiles.get(&loc) {
            return tile.clone();
        }
        let key = AccessKey::derive(randomness, loc);
        match self.terrain.terrain_at(loc) {
            Terrain::Hill => Tile::hill(loc, key),
            Terrain::Water => Tile::water(loc, key),
            Terrain::Bonus => Tile::bonus(loc, key),
            Terrain::Bare => Tile::bare(loc, key),
        }
    }

    pub fn has_recorded_tile(&self, loc: Location) -> bool {
        self.tiles.contains_key(&loc)
    }

    /// The core mutator. Reads the previously recorded tile at the same
    /// location and reconciles city bookkeeping before storing the new one.
    ///
    /// One unified cascade rule: when ownership changes and the displaced
    /// tile was a city center, the whole city flips to the new owner and the
    /// city id moves between the players' sets; when the displaced tile was
    /// ordinary territory, only that location moves between city buckets.
    /// Empty sets are pruned on every path. Callers holding `&mut self`
    /// cannot observe a half-cascaded board, so the flip is atomic to every
    /// reader.
    pub fn set_tile(&mut self, tile: Tile) {
        let loc = tile.loc;
        let old = self.tiles.get(&loc).cloned();

        let ownership_changed = match &old {
            Some(prev) => prev.owner.address != tile.owner.address,
            // Unrecorded locations are unowned territory.
            None => !tile.is_unowned(),
        };

        if ownership_changed && let Some(prev) = &old && !prev.is_unowned() {
            if prev.is_city_center() {
                // City capture: every member tile flips owner in one pass.
                let members = self
                    .city_tiles
                    .get(&prev.city_id)
                    .cloned()
                    .unwrap_or_default();
                for member in &members {
                    if let Some(t) = self.tiles.get_mut(member) {
                        t.owner = tile.owner.clone();
                    }
                }
                self.unassign_city(&prev.owner.address, prev.city_id);
                if !tile.owner.address.is_empty() {
                    self.assign_city(tile.owner.address.clone(), prev.city_id);
                }
            } else {
                self.remove_from_city(prev.city_id, loc, &prev.owner.address);
            }
        }

        if !tile.is_unowned() {
            self.assign_city(tile.owner.address.clone(), tile.city_id);
            self.city_tiles.entry(tile.city_id).or_default().insert(loc);
        }

        self.tiles.insert(loc, tile);
    }

    /// True iff at least one cell of the 3×3 block centered on `loc`
    /// belongs to a city owned by `requester`.
    pub fn no_fog(&self, loc: Location, requester: &PlayerAddr, randomness: &Randomness) -> bool {
        loc.nearby()
            .into_iter()
            .any(|cell| &self.get_tile(cell, randomness).owner.address == requester)
    }

    /// The in-bounds cells of the 3×3 block centered on `loc`.
    pub fn nearby_locations(loc: Location) -> Vec<Location> {
        loc.nearby()
    }

    pub fn is_spawned(&self, player: &PlayerAddr) -> bool {
        self.player_cities
            .get(player)
            .is_some_and(|cities| !cities.is_empty())
    }

    pub fn player_cities(&self, player: &PlayerAddr) -> BTreeSet<CityId> {
        self.player_cities.get(player).cloned().unwrap_or_default()
    }

    pub fn city_tiles(&self, city_id: CityId) -> BTreeSet<Location> {
        self.city_tiles.get(&city_id).cloned().unwrap_or_default()
    }

    pub fn owner_of_city(&self, city_id: CityId) -> Option<&PlayerAddr> {
        self.player_cities
            .iter()
            .find(|(_, cities)| cities.contains(&city_id))
            .map(|(addr, _)| addr)
    }

    fn assign_city(&mut self, owner: PlayerAddr, city_id: CityId) {
        self.player_cities.entry(owner).or_default().insert(city_id);
    }

    fn unassign_city(&mut self, owner: &PlayerAddr, city_id: CityId) {
        if let Some(cities) = self.player_cities.get_mut(owner) {
            cities.remove(&city_id);
            if cities.is_empty() {
                self.player_cities.remove(owner);
            }
        }
    }

    fn remove_from_city(&mut self, city_id: CityId, loc: Location, owner: &PlayerAddr) {
        if let Some(members) = self.city_tiles.get_mut(&city_id) {
            members.remove(&loc);
            if members.is_empty() {
                self.city_tiles.remove(&city_id);
                self.unassign_city(owner, city_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileKind;

    fn rand() -> Randomness {
        Randomness([5u8; 32])
    }

    fn key(byte: u8) -> AccessKey {
        AccessKey::from_bytes([byte; 32])
    }

    fn player(symbol: &str, addr: &str) -> Player {
        Player::new(symbol, PlayerAddr::new(addr))
    }

    /// Terrain params with thresholds pushed out so every cell is bare.
    /// Tests that need specific troop math shouldn't depend on the noise.
    fn all_bare() -> TerrainParams {
        TerrainParams {
            hill_threshold: i64::MAX,
            water_threshold: i64::MIN,
            bonus_threshold: i64::MAX,
            ..TerrainParams::default()
        }
    }

    #[test]
    fn spawn_creates_a_city_center() {
        let mut board = Board::new(all_bare());
        let a = player("A", "0xaa");
        board
            .spawn(Location::new(0, 0), a.clone(), 50, CityId(1), 0, key(1), &rand())
            .unwrap();

        let tile = board.get_tile(Location::new(0, 0), &rand());
        assert_eq!(tile.owner, a);
        assert_eq!(tile.resources, 50);
        assert_eq!(tile.city_id, CityId(1));
        assert_eq!(tile.kind, TileKind::CityCenter);
        assert!(board.is_spawned(&a.address));
    }

    #[test]
    fn spawn_on_owned_tile_is_rejected_without_mutation() {
        let mut board = Board::new(all_bare());
        let a = player("A", "0xaa");
        let b = player("B", "0xbb");
        board
            .spawn(Location::new(0, 0), a, 50, CityId(1), 0, key(1), &rand())
            .unwrap();

        let err = board
            .spawn(Location::new(0, 0), b.clone(), 50, CityId(2), 0, key(2), &rand())
            .unwrap_err();
        assert_eq!(
            err,
            BoardError::SpawnOnOwnedTile {
                loc: Location::new(0, 0)
            }
        );
        assert!(!board.is_spawned(&b.address));
    }

    #[test]
    fn virtual_tiles_are_pure_functions_of_inputs() {
        let board = Board::new(TerrainParams::default());
        let loc = Location::new(9, 13);
        let first = board.get_tile(loc, &rand());
        let second = board.get_tile(loc, &rand());
        assert_eq!(first, second);

        let other = board.get_tile(loc, &Randomness([6u8; 32]));
        assert_ne!(first.access_key, other.access_key);
    }

    #[test]
    fn set_tile_is_idempotent() {
        let mut board = Board::new(all_bare());
        let a = player("A", "0xaa");
        board
            .spawn(Location::new(2, 2), a.clone(), 10, CityId(1), 0, key(1), &rand())
            .unwrap();

        let mut annex = board.get_tile(Location::new(2, 3), &rand());
        annex.owner = a.clone();
        annex.city_id = CityId(1);
        annex.resources = 4;

        board.set_tile(annex.clone());
        let cities_once = board.player_cities(&a.address);
        let members_once = board.city_tiles(CityId(1));

        board.set_tile(annex);
        assert_eq!(board.player_cities(&a.address), cities_once);
        assert_eq!(board.city_tiles(CityId(1)), members_once);
    }

    #[test]
    fn city_center_capture_cascades_atomically() {
        let mut board = Board::new(all_bare());
        let a = player("A", "0xaa");
        let b = player("B", "0xbb");
        board
            .spawn(Location::new(0, 0), a.clone(), 30, CityId(1), 0, key(1), &rand())
            .unwrap();
        board
            .spawn(Location::new(5, 5), b.clone(), 20, CityId(2), 0, key(2), &rand())
            .unwrap();

        // Grow B's city by one tile of controlled territory.
        let mut annex = board.get_tile(Location::new(5, 6), &rand());
        annex.owner = b.clone();
        annex.city_id = CityId(2);
        board.set_tile(annex);

        // A captures B's center.
        let mut captured = board.get_tile(Location::new(5, 5), &rand());
        captured.owner = a.clone();
        captured.resources = 9;
        board.set_tile(captured);

        for member in board.city_tiles(CityId(2)) {
            assert_eq!(board.get_tile(member, &rand()).owner.address, a.address);
        }
        assert!(board.player_cities(&a.address).contains(&CityId(2)));
        assert!(!board.is_spawned(&b.address));
    }

    #[test]
    fn capturing_ordinary_territory_moves_one_location() {
        let mut board = Board::new(all_bare());
        let a = player("A", "0xaa");
        let b = player("B", "0xbb");
        board
            .spawn(Location::new(0, 0), a.clone(), 30, CityId(1), 0, key(1), &rand())
            .unwrap();
        board
            .spawn(Location::new(5, 5), b.clone(), 20, CityId(2), 0, key(2), &rand())
            .unwrap();

        let mut annex = board.get_tile(Location::new(5, 6), &rand());
        annex.owner = b.clone();
        annex.city_id = CityId(2);
        board.set_tile(annex);

        // A takes the annex tile only; B's center survives.
        let mut taken = board.get_tile(Location::new(5, 6), &rand());
        taken.owner = a.clone();
        taken.city_id = CityId(1);
        board.set_tile(taken);

        assert!(board.city_tiles(CityId(1)).contains(&Location::new(5, 6)));
        assert!(!board.city_tiles(CityId(2)).contains(&Location::new(5, 6)));
        assert!(board.is_spawned(&b.address));
        assert_eq!(
            board.get_tile(Location::new(5, 5), &rand()).owner.address,
            b.address
        );
    }

    #[test]
    fn no_fog_tracks_the_three_by_three_block() {
        let mut board = Board::new(all_bare());
        let a = player("A", "0xaa");
        board
            .spawn(Location::new(4, 4), a.clone(), 10, CityId(1), 0, key(1), &rand())
            .unwrap();

        assert!(board.no_fog(Location::new(3, 3), &a.address, &rand()));
        assert!(board.no_fog(Location::new(5, 5), &a.address, &rand()));
        assert!(!board.no_fog(Location::new(7, 7), &a.address, &rand()));
    }

    #[test]
    fn is_spawned_iff_player_cities_nonempty() {
        let mut board = Board::new(all_bare());
        let a = player("A", "0xaa");
        assert!(!board.is_spawned(&a.address));
        assert!(board.player_cities(&a.address).is_empty());

        board
            .spawn(Location::new(1, 1), a.clone(), 5, CityId(1), 0, key(1), &rand())
            .unwrap();
        assert!(board.is_spawned(&a.address));
        assert!(!board.player_cities(&a.address).is_empty());
    }

    #[test]
    fn seed_is_display_only() {
        let tiles = Board::seed(3);
        assert_eq!(tiles.len(), 9);
        assert!(tiles.iter().all(|t| t.is_mystery()));
    }
}
