//! Pure move/troop arithmetic, kept off the [`crate::Board`] so proof
//! witnesses and the enclave share one source of truth.

use crate::tile::{AccessKey, Interval, Tile, TileKind};

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum MoveRuleError {
    #[error("a move must carry at least one troop")]
    NoTroopsMoved,

    #[error("cannot move {moved} troops from a tile holding {have}")]
    InsufficientTroops { have: u32, moved: u32 },

    #[error("troops cannot move onto a hill")]
    HillImpassable,
}

/// Resolves a tile's effective troop count at `current_interval`.
///
/// Water tiles decay linearly: one troop per interval elapsed since the
/// tile was last updated, clamped at zero. City centers defer to the
/// chain-reported count, since the chain is the source of truth for city
/// totals. Everything else keeps the stored value.
pub fn compute_updated_troops(
    tile: &Tile,
    city_center_troops_from_chain: u32,
    current_interval: Interval,
) -> u32 {
    match tile.kind {
        TileKind::Water => {
            let drift = tile.latest_update_interval as i64 - current_interval as i64;
            (tile.resources as i64 + drift).max(0) as u32
        }
        TileKind::CityCenter => city_center_troops_from_chain,
        _ => tile.resources,
    }
}

/// The source tile after `troops_moved` leave it. At least one troop must
/// stay behind to hold the tile.
pub fn compute_from_tile(
    source_before: &Tile,
    source_updated_troops: u32,
    troops_moved: u32,
    current_interval: Interval,
    access_key: AccessKey,
) -> Result<Tile, MoveRuleError> {
    if troops_moved == 0 {
        return Err(MoveRuleError::NoTroopsMoved);
    }
    if troops_moved >= source_updated_troops {
        return Err(MoveRuleError::InsufficientTroops {
            have: source_updated_troops,
            moved: troops_moved,
        });
    }

    let mut after = source_before.clone();
    after.resources = source_updated_troops - troops_moved;
    after.latest_update_interval = current_interval;
    after.access_key = access_key;
    Ok(after)
}

/// The target tile after `troops_moved` arrive.
///
/// Three cases: reinforcement onto one's own tile, claiming unowned
/// territory (absorbing any bonus troops sitting there), or combat.
/// Combat that overshoots the defender's count flips ownership, and a
/// captured ordinary tile joins the mover's city; a captured city center
/// keeps its city id so [`crate::Board::set_tile`] can cascade the whole
/// city.
pub fn compute_onto_tile(
    target_before: &Tile,
    source_before: &Tile,
    source_after: &Tile,
    target_updated_troops: u32,
    troops_moved: u32,
    current_interval: Interval,
    access_key: AccessKey,
) -> Result<Tile, MoveRuleError> {
    if troops_moved == 0 {
        return Err(MoveRuleError::NoTroopsMoved);
    }
    if target_before.is_hill() {
        return Err(MoveRuleError::HillImpassable);
    }

    let mut after = target_before.clone();
    after.latest_update_interval = current_interval;
    after.access_key = access_key;

    if !target_before.is_unowned() && target_before.owner.address == source_before.owner.address {
        // Case 1: reinforcing one's own tile.
        after.resources = target_updated_troops + troops_moved;
    } else if target_before.is_unowned() {
        // Case 2: claiming unowned territory. Stored resources (bonus
        // troops) are absorbed by the mover.
        after.owner = source_after.owner.clone();
        after.city_id = source_after.city_id;
        after.resources = troops_moved + target_before.resources;
        if after.kind == TileKind::BonusTroops {
            after.kind = TileKind::Bare;
        }
    } else {
        // Case 3: combat.
        let remainder = target_updated_troops as i64 - troops_moved as i64;
        if remainder >= 0 {
            after.resources = remainder as u32;
        } else {
            after.owner = source_after.owner.clone();
            after.resources = (-remainder) as u32;
            if !target_before.is_city_center() {
                after.city_id = source_after.city_id;
            }
        }
    }

    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::player::{Player, PlayerAddr};
    use crate::tile::CityId;

    fn key(byte: u8) -> AccessKey {
        AccessKey::from_bytes([byte; 32])
    }

    fn player(symbol: &str, addr: &str) -> Player {
        Player::new(symbol, PlayerAddr::new(addr))
    }

    fn center(owner: Player, loc: Location, resources: u32, city: u32) -> Tile {
        Tile::city_center(owner, loc, resources, CityId(city), 0, key(1))
    }

    #[test]
    fn water_tiles_decay_to_zero() {
        let mut tile = Tile::water(Location::new(0, 0), key(1));
        tile.resources = 3;
        tile.latest_update_interval = 10;
        assert_eq!(compute_updated_troops(&tile, 0, 12), 1);
        assert_eq!(compute_updated_troops(&tile, 0, 13), 0);
        assert_eq!(compute_updated_troops(&tile, 0, 99), 0);
    }

    #[test]
    fn city_centers_defer_to_the_chain() {
        let tile = center(player("A", "0xaa"), Location::new(0, 0), 5, 1);
        assert_eq!(compute_updated_troops(&tile, 42, 7), 42);
    }

    #[test]
    fn bare_tiles_keep_their_stored_count() {
        let mut tile = Tile::bare(Location::new(0, 0), key(1));
        tile.resources = 8;
        assert_eq!(compute_updated_troops(&tile, 99, 50), 8);
    }

    #[test]
    fn move_onto_unowned_bare_tile() {
        // Scenario: city tile with 50 troops moves 49 onto unowned ground.
        let a = player("A", "0xaa");
        let source = center(a.clone(), Location::new(0, 0), 50, 1);
        let target = Tile::bare(Location::new(0, 1), key(2));

        let u_from = compute_from_tile(&source, 50, 49, 3, key(3)).unwrap();
        assert_eq!(u_from.resources, 1);
        assert_eq!(u_from.owner, a);

        let u_to =
            compute_onto_tile(&target, &source, &u_from, 0, 49, 3, key(4)).unwrap();
        assert_eq!(u_to.owner, a);
        assert_eq!(u_to.resources, 49);
        assert_eq!(u_to.city_id, CityId(1));
    }

    #[test]
    fn reinforcing_own_tile_adds_troops() {
        let a = player("A", "0xaa");
        let source = center(a.clone(), Location::new(0, 0), 20, 1);
        let mut target = Tile::bare(Location::new(0, 1), key(2));
        target.owner = a.clone();
        target.city_id = CityId(1);
        target.resources = 5;

        let u_from = compute_from_tile(&source, 20, 10, 1, key(3)).unwrap();
        let u_to =
            compute_onto_tile(&target, &source, &u_from, 5, 10, 1, key(4)).unwrap();
        assert_eq!(u_to.resources, 15);
        assert_eq!(u_to.owner, a);
    }

    #[test]
    fn combat_shortfall_defends_the_tile() {
        let a = player("A", "0xaa");
        let b = player("B", "0xbb");
        let source = center(a.clone(), Location::new(0, 0), 20, 1);
        let target = center(b.clone(), Location::new(0, 1), 30, 2);

        let u_from = compute_from_tile(&source, 20, 10, 1, key(3)).unwrap();
        let u_to =
            compute_onto_tile(&target, &source, &u_from, 30, 10, 1, key(4)).unwrap();
        assert_eq!(u_to.owner, b);
        assert_eq!(u_to.resources, 20);
    }

    #[test]
    fn combat_overshoot_flips_a_city_center_in_place() {
        // Scenario: 49 troops onto an enemy center holding 10.
        let a = player("A", "0xaa");
        let b = player("B", "0xbb");
        let source = center(a.clone(), Location::new(0, 0), 50, 1);
        let target = center(b, Location::new(0, 1), 10, 2);

        let u_from = compute_from_tile(&source, 50, 49, 1, key(3)).unwrap();
        let u_to =
            compute_onto_tile(&target, &source, &u_from, 10, 49, 1, key(4)).unwrap();
        assert_eq!(u_to.owner, a);
        assert_eq!(u_to.resources, 39);
        // Center keeps its own city id; the board cascade reassigns it.
        assert_eq!(u_to.city_id, CityId(2));
    }

    #[test]
    fn combat_overshoot_annexes_ordinary_territory() {
        let a = player("A", "0xaa");
        let b = player("B", "0xbb");
        let source = center(a.clone(), Location::new(0, 0), 50, 1);
        let mut target = Tile::bare(Location::new(0, 1), key(2));
        target.owner = b;
        target.city_id = CityId(2);
        target.resources = 10;

        let u_from = compute_from_tile(&source, 50, 49, 1, key(3)).unwrap();
        let u_to =
            compute_onto_tile(&target, &source, &u_from, 10, 49, 1, key(4)).unwrap();
        assert_eq!(u_to.owner, a);
        assert_eq!(u_to.city_id, CityId(1));
        assert_eq!(u_to.resources, 39);
    }

    #[test]
    fn bonus_troops_are_absorbed_on_claim() {
        let a = player("A", "0xaa");
        let source = center(a.clone(), Location::new(0, 0), 20, 1);
        let target = Tile::bonus(Location::new(0, 1), key(2));
        let stored = target.resources;

        let u_from = compute_from_tile(&source, 20, 5, 1, key(3)).unwrap();
        let u_to =
            compute_onto_tile(&target, &source, &u_from, stored, 5, 1, key(4)).unwrap();
        assert_eq!(u_to.resources, 5 + stored);
        assert_eq!(u_to.kind, TileKind::Bare);
    }

    #[test]
    fn zero_troop_moves_are_rejected() {
        let a = player("A", "0xaa");
        let source = center(a.clone(), Location::new(0, 0), 20, 1);
        let target = Tile::bare(Location::new(0, 1), key(2));
        let u_from = compute_from_tile(&source, 20, 5, 1, key(3)).unwrap();

        assert_eq!(
            compute_from_tile(&source, 20, 0, 1, key(3)).unwrap_err(),
            MoveRuleError::NoTroopsMoved
        );
        assert_eq!(
            compute_onto_tile(&target, &source, &u_from, 0, 0, 1, key(4)).unwrap_err(),
            MoveRuleError::NoTroopsMoved
        );
    }

    #[test]
    fn moves_may_not_empty_the_source_or_cross_onto_hills() {
        let a = player("A", "0xaa");
        let source = center(a.clone(), Location::new(0, 0), 20, 1);
        assert_eq!(
            compute_from_tile(&source, 20, 20, 1, key(3)).unwrap_err(),
            MoveRuleError::InsufficientTroops { have: 20, moved: 20 }
        );

        let hill = Tile::hill(Location::new(0, 1), key(2));
        let u_from = compute_from_tile(&source, 20, 5, 1, key(3)).unwrap();
        assert_eq!(
            compute_onto_tile(&hill, &source, &u_from, 0, 5, 1, key(4)).unwrap_err(),
            MoveRuleError::HillImpassable
        );
    }
}
