use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::location::Location;
use crate::player::Player;

/// Chain interval counter (one tick per resource-update period).
pub type Interval = u64;

/// Troops sitting on an unclaimed bonus tile, absorbed by whoever moves
/// onto it first.
pub const BONUS_TILE_TROOPS: u32 = 10;

/// Groups tiles into one city. Id `0` means "no city", i.e. unowned.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct CityId(pub u32);

impl CityId {
    pub const UNOWNED: CityId = CityId(0);

    pub fn is_unowned(self) -> bool {
        self == Self::UNOWNED
    }
}

impl core::fmt::Display for CityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terrain / role of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    Bare,
    Water,
    Hill,
    BonusTroops,
    CityCenter,
}

impl TileKind {
    fn as_u8(self) -> u8 {
        match self {
            TileKind::Bare => 0,
            TileKind::Water => 1,
            TileKind::Hill => 2,
            TileKind::BonusTroops => 3,
            TileKind::CityCenter => 4,
        }
    }
}

/// The committed randomness the board's virtual tiles are synthesized from.
/// Must be bit-identical across restarts; recovery recomputes it from the
/// persisted seal key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Randomness(pub [u8; 32]);

impl Randomness {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Secret commitment nullifier attached to every tile. Knowing the key
/// proves knowledge of the tile's preimage without revealing the tile.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey([u8; 32]);

impl AccessKey {
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Deterministic key for a virtual tile. Pure in `(randomness, loc)`,
    /// which is what makes unset-tile synthesis reproducible.
    pub fn derive(randomness: &Randomness, loc: Location) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"fow.tile.key");
        hasher.update(randomness.as_bytes());
        hasher.update(loc.r.to_le_bytes());
        hasher.update(loc.c.to_le_bytes());
        Self(hasher.finalize().into())
    }
}

// Keys are secrets; keep them out of debug output.
impl core::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("AccessKey(..)")
    }
}

/// SHA-256 commitment to a tile (or to an access key, for nullifiers).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileHash(pub [u8; 32]);

impl TileHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl core::fmt::Debug for TileHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "TileHash({})", self)
    }
}

impl core::fmt::Display for TileHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for byte in self.0.iter().take(8) {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..")
    }
}

/// One cell of the authoritative board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub owner: Player,
    pub loc: Location,
    pub resources: u32,
    pub city_id: CityId,
    pub latest_update_interval: Interval,
    pub kind: TileKind,
    pub access_key: AccessKey,
}

impl Tile {
    pub fn new(
        owner: Player,
        loc: Location,
        resources: u32,
        city_id: CityId,
        latest_update_interval: Interval,
        kind: TileKind,
        access_key: AccessKey,
    ) -> Self {
        Self {
            owner,
            loc,
            resources,
            city_id,
            latest_update_interval,
            kind,
            access_key,
        }
    }

    /// Placeholder shown to clients for cells behind the fog. Never
    /// authoritative and never committed anywhere.
    pub fn mystery(loc: Location) -> Self {
        Self::new(
            Player::mystery(),
            loc,
            0,
            CityId::UNOWNED,
            0,
            TileKind::Bare,
            AccessKey::zero(),
        )
    }

    pub fn bare(loc: Location, access_key: AccessKey) -> Self {
        Self::new(
            Player::unowned(),
            loc,
            0,
            CityId::UNOWNED,
            0,
            TileKind::Bare,
            access_key,
        )
    }

    pub fn water(loc: Location, access_key: AccessKey) -> Self {
        Self::new(
            Player::unowned(),
            loc,
            0,
            CityId::UNOWNED,
            0,
            TileKind::Water,
            access_key,
        )
    }

    /// Impassable tile; troops can never move onto a hill.
    pub fn hill(loc: Location, access_key: AccessKey) -> Self {
        Self::new(
            Player::unowned(),
            loc,
            0,
            CityId::UNOWNED,
            0,
            TileKind::Hill,
            access_key,
        )
    }

    pub fn bonus(loc: Location, access_key: AccessKey) -> Self {
        Self::new(
            Player::unowned(),
            loc,
            BONUS_TILE_TROOPS,
            CityId::UNOWNED,
            0,
            TileKind::BonusTroops,
            access_key,
        )
    }

    pub fn city_center(
        owner: Player,
        loc: Location,
        resources: u32,
        city_id: CityId,
        interval: Interval,
        access_key: AccessKey,
    ) -> Self {
        Self::new(
            owner,
            loc,
            resources,
            city_id,
            interval,
            TileKind::CityCenter,
            access_key,
        )
    }

    pub fn is_unowned(&self) -> bool {
        self.city_id.is_unowned()
    }

    pub fn is_mystery(&self) -> bool {
        self.owner.symbol == "?"
    }

    pub fn is_water(&self) -> bool {
        self.kind == TileKind::Water
    }

    pub fn is_hill(&self) -> bool {
        self.kind == TileKind::Hill
    }

    pub fn is_city_center(&self) -> bool {
        self.kind == TileKind::CityCenter
    }

    /// Commitment over the circuit-visible fields. The owner's display
    /// symbol is deliberately excluded; ownership is carried by the chain
    /// identity bound to the city bookkeeping, not by the hash.
    pub fn hash(&self) -> TileHash {
        let mut hasher = Sha256::new();
        hasher.update(b"fow.tile");
        hasher.update(self.loc.r.to_le_bytes());
        hasher.update(self.loc.c.to_le_bytes());
        hasher.update(self.resources.to_le_bytes());
        hasher.update(self.access_key.as_bytes());
        hasher.update(self.city_id.0.to_le_bytes());
        hasher.update(self.latest_update_interval.to_le_bytes());
        hasher.update([self.kind.as_u8()]);
        TileHash(hasher.finalize().into())
    }

    /// The nullifier is the hash of the access key alone.
    pub fn nullifier(&self) -> TileHash {
        let mut hasher = Sha256::new();
        hasher.update(b"fow.nullifier");
        hasher.update(self.access_key.as_bytes());
        TileHash(hasher.finalize().into())
    }
}
