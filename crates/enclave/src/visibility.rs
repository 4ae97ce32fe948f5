//! Fog-of-war update fan-out.
//!
//! After a move commits, every player who can see an updated cell gets told
//! which cells changed, and the two players involved in the move get the
//! full 3x3 neighborhoods around the changes. Nobody learns about cells
//! outside their visibility.

use std::collections::{BTreeMap, BTreeSet};

use fow_core::{Board, Location, PlayerAddr, Randomness};

/// What changed when a move was applied, from the fan-out's point of view.
#[derive(Debug, Clone)]
pub struct MoveUpdate {
    pub source: Location,
    pub target: Location,
    pub new_owner: PlayerAddr,
    pub previous_owner: PlayerAddr,
    /// When the move captured a city center, all member locations of the
    /// captured city (they all changed owner in the cascade).
    pub captured_city: Option<BTreeSet<Location>>,
}

impl MoveUpdate {
    fn updated_locations(&self) -> BTreeSet<Location> {
        let mut locs = match &self.captured_city {
            Some(members) => members.clone(),
            None => BTreeSet::from([self.target]),
        };
        locs.insert(self.source);
        locs
    }
}

/// Compute, per player, the set of locations to push. Observers get the
/// updated cells adjacent to their territory; the mover and the previous
/// owner additionally get every cell neighboring an update, so their view
/// of the surrounding fog stays coherent.
pub fn fan_out(
    board: &Board,
    randomness: &Randomness,
    update: &MoveUpdate,
) -> BTreeMap<PlayerAddr, BTreeSet<Location>> {
    let mut notify: BTreeMap<PlayerAddr, BTreeSet<Location>> = BTreeMap::new();
    for updated in update.updated_locations() {
        for neighbor in updated.nearby() {
            let tile = board.get_tile(neighbor, randomness);
            if !tile.owner.address.is_empty() {
                notify
                    .entry(tile.owner.address.clone())
                    .or_default()
                    .insert(updated);
            }
            for party in [&update.new_owner, &update.previous_owner] {
                if !party.is_empty() {
                    notify.entry(party.clone()).or_default().insert(neighbor);
                }
            }
        }
    }
    notify
}

#[cfg(test)]
mod tests {
    use super::*;
    use fow_core::{AccessKey, CityId, Player, TerrainParams, Tile};

    fn flat_board() -> (Board, Randomness) {
        let params = TerrainParams {
            seed: 11,
            hill_threshold: 2_000,
            water_threshold: -1,
            bonus_threshold: 1_900,
            ..TerrainParams::default()
        };
        (Board::new(params), Randomness([5u8; 32]))
    }

    fn plant_center(board: &mut Board, addr: &str, symbol: &str, loc: Location, city: CityId) {
        board.set_tile(Tile::city_center(
            Player::new(symbol, PlayerAddr::new(addr)),
            loc,
            30,
            city,
            0,
            AccessKey::from_bytes([city.0 as u8; 32]),
        ));
    }

    #[test]
    fn adjacent_observer_learns_of_the_update() {
        let (mut board, rand) = flat_board();
        plant_center(&mut board, "0xaaa", "A", Location::new(10, 10), CityId(1));
        // Observer owns a tile adjacent to the target cell.
        plant_center(&mut board, "0xbbb", "B", Location::new(10, 12), CityId(2));

        let update = MoveUpdate {
            source: Location::new(10, 10),
            target: Location::new(10, 11),
            new_owner: PlayerAddr::new("0xaaa"),
            previous_owner: PlayerAddr::default(),
            captured_city: None,
        };
        let notify = fan_out(&board, &rand, &update);

        let b = notify.get(&PlayerAddr::new("0xbbb")).unwrap();
        assert!(b.contains(&Location::new(10, 11)));
        // The observer is not force-fed the mover's whole neighborhood.
        assert!(!b.contains(&Location::new(9, 9)));
    }

    #[test]
    fn mover_gets_full_neighborhoods_around_updates() {
        let (mut board, rand) = flat_board();
        plant_center(&mut board, "0xaaa", "A", Location::new(10, 10), CityId(1));

        let update = MoveUpdate {
            source: Location::new(10, 10),
            target: Location::new(10, 11),
            new_owner: PlayerAddr::new("0xaaa"),
            previous_owner: PlayerAddr::default(),
            captured_city: None,
        };
        let notify = fan_out(&board, &rand, &update);
        let a = notify.get(&PlayerAddr::new("0xaaa")).unwrap();
        for loc in Location::new(10, 10).nearby() {
            assert!(a.contains(&loc));
        }
        for loc in Location::new(10, 11).nearby() {
            assert!(a.contains(&loc));
        }
    }

    #[test]
    fn city_capture_fans_out_every_member() {
        let (mut board, rand) = flat_board();
        plant_center(&mut board, "0xbbb", "B", Location::new(20, 20), CityId(2));
        // Distant member of B's city; its 3x3 does not touch the move site.
        board.set_tile(Tile::new(
            Player::new("B", PlayerAddr::new("0xbbb")),
            Location::new(25, 25),
            5,
            CityId(2),
            0,
            fow_core::TileKind::Bare,
            AccessKey::from_bytes([9u8; 32]),
        ));

        let members = BTreeSet::from([Location::new(20, 20), Location::new(25, 25)]);
        let update = MoveUpdate {
            source: Location::new(20, 19),
            target: Location::new(20, 20),
            new_owner: PlayerAddr::new("0xaaa"),
            previous_owner: PlayerAddr::new("0xbbb"),
            captured_city: Some(members),
        };
        let notify = fan_out(&board, &rand, &update);

        let a = notify.get(&PlayerAddr::new("0xaaa")).unwrap();
        assert!(a.contains(&Location::new(25, 25)));
        let b = notify.get(&PlayerAddr::new("0xbbb")).unwrap();
        assert!(b.contains(&Location::new(25, 25)));
    }
}
