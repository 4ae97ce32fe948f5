//! AES-256-GCM sealing of tiles for the data-availability layer.
//!
//! Every record is decryptable only with the enclave's seal key, so the DA
//! store learns who owns tiles (via the plaintext symbol/address envelope)
//! but never their contents. The same key also derives the committed board
//! randomness, which is why losing it is unrecoverable.

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use fow_core::{Randomness, Tile};

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum SealError {
    /// Encryption or decryption failed (wrong key, tampered record).
    #[error("cipher rejected the record")]
    Cipher,

    #[error("hex field: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("tile encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("record is truncated")]
    Truncated,

    #[error("key file: {0}")]
    KeyFile(#[from] std::io::Error),

    #[error("key file is malformed")]
    MalformedKeyFile,
}

/// The enclave's long-lived sealing secret.
///
/// Generated once at first boot, persisted to disk, and reloaded on every
/// restart. The committed randomness is `SHA-256(key)`, so the key must
/// outlive any tiles sealed under it.
#[derive(Clone)]
pub struct SealKey([u8; 32]);

impl SealKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Load the key from `path`, or generate and persist a fresh one.
    /// Returns `(key, created)`; `created` tells the caller whether the
    /// randomness commitment still needs to go on-chain.
    pub fn load_or_generate(path: &Path) -> Result<(Self, bool), SealError> {
        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            let bytes = hex::decode(text.trim())?;
            let bytes: [u8; 32] = bytes.try_into().map_err(|_| SealError::MalformedKeyFile)?;
            return Ok((Self(bytes), false));
        }
        let key = Self::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, hex::encode(key.0))?;
        Ok((key, true))
    }

    /// Board randomness and its on-chain commitment, both derived from the
    /// key: `rand = SHA-256(key)`, `h_rand = SHA-256(rand)`.
    pub fn commitment(&self) -> RandomnessCommitment {
        let rand: [u8; 32] = Sha256::digest(self.0).into();
        let hash: [u8; 32] = Sha256::digest(rand).into();
        RandomnessCommitment {
            randomness: Randomness(rand),
            hash,
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }

    /// Seal a tile into a DA record. The envelope (symbol, address) stays in
    /// the clear so the DA peer can index records per player.
    pub fn seal(&self, tile: &Tile) -> Result<EncryptedTileRecord, SealError> {
        let plaintext = serde_json::to_vec(tile)?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| SealError::Cipher)?;
        // aes-gcm appends the tag; the record schema keeps it separate.
        let split = sealed.len() - TAG_LEN;
        Ok(EncryptedTileRecord {
            symbol: tile.owner.symbol.clone(),
            address: tile.owner.address.to_string(),
            ciphertext: hex::encode(&sealed[..split]),
            iv: hex::encode(nonce),
            tag: hex::encode(&sealed[split..]),
        })
    }

    /// Open a DA record back into a tile. Fails on any tampering with the
    /// ciphertext, nonce or tag.
    pub fn open(&self, record: &EncryptedTileRecord) -> Result<Tile, SealError> {
        let mut sealed = hex::decode(&record.ciphertext)?;
        sealed.extend(hex::decode(&record.tag)?);
        let nonce = hex::decode(&record.iv)?;
        if nonce.len() != NONCE_LEN || sealed.len() < TAG_LEN {
            return Err(SealError::Truncated);
        }
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| SealError::Cipher)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

// Seal keys never appear in logs.
impl core::fmt::Debug for SealKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SealKey(..)")
    }
}

/// Board randomness plus the hash committed on-chain.
#[derive(Clone, Copy, Debug)]
pub struct RandomnessCommitment {
    pub randomness: Randomness,
    pub hash: [u8; 32],
}

/// One sealed tile as stored by the DA peer. All binary fields are
/// hex-encoded strings so the record survives any JSON transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedTileRecord {
    pub symbol: String,
    pub address: String,
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fow_core::{AccessKey, CityId, Location, Player, PlayerAddr};

    fn sample_tile() -> Tile {
        Tile::city_center(
            Player::new("A", PlayerAddr::new("0xabc")),
            Location::new(3, 4),
            50,
            CityId(1),
            2,
            AccessKey::from_bytes([7u8; 32]),
        )
    }

    #[test]
    fn seal_then_open_round_trips() {
        let key = SealKey::generate();
        let tile = sample_tile();
        let record = key.seal(&tile).unwrap();
        assert_eq!(record.symbol, "A");
        assert_eq!(record.address, "0xabc");
        assert_eq!(key.open(&record).unwrap(), tile);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = SealKey::generate();
        let mut record = key.seal(&sample_tile()).unwrap();
        let mut bytes = hex::decode(&record.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        record.ciphertext = hex::encode(bytes);
        assert!(matches!(key.open(&record), Err(SealError::Cipher)));
    }

    #[test]
    fn wrong_key_cannot_open() {
        let record = SealKey::generate().seal(&sample_tile()).unwrap();
        assert!(matches!(
            SealKey::generate().open(&record),
            Err(SealError::Cipher)
        ));
    }

    #[test]
    fn key_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seal.key");
        let (first, created) = SealKey::load_or_generate(&path).unwrap();
        assert!(created);
        let (second, created) = SealKey::load_or_generate(&path).unwrap();
        assert!(!created);
        assert_eq!(
            first.commitment().randomness,
            second.commitment().randomness
        );
    }

    #[test]
    fn commitment_is_hash_of_randomness() {
        let key = SealKey::from_bytes([9u8; 32]);
        let c = key.commitment();
        let expected: [u8; 32] = Sha256::digest(c.randomness.0).into();
        assert_eq!(c.hash, expected);
    }
}
