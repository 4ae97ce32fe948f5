use serde::{Deserialize, Serialize};

/// A player's chain identity. This is the authoritative key for ownership;
/// display symbols are cosmetic and may collide.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct PlayerAddr(String);

impl PlayerAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Display for PlayerAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A participant as tiles record them: display symbol plus chain identity.
///
/// The sentinel players returned by [`Player::unowned`] and
/// [`Player::mystery`] carry empty addresses and never own cities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub symbol: String,
    pub address: PlayerAddr,
}

impl Player {
    pub fn new(symbol: impl Into<String>, address: PlayerAddr) -> Self {
        Self {
            symbol: symbol.into(),
            address,
        }
    }

    /// Placeholder owner for tiles nobody holds.
    pub fn unowned() -> Self {
        Self::new("_", PlayerAddr::default())
    }

    /// Placeholder owner for tiles hidden behind the fog.
    pub fn mystery() -> Self {
        Self::new("?", PlayerAddr::default())
    }
}
