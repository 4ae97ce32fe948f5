//! Crash recovery from the data-availability layer.
//!
//! After a restart with `recover` set, the enclave reloads its seal key,
//! rederives the board randomness, and asks the DA peer to replay every
//! stored record in index order. Each record must decrypt under the seal key
//! and its tile hash must appear in the on-chain hash history; anything else
//! (tampered records, records for claims that expired unfinalized) is
//! counted and skipped rather than aborting the replay.

use std::collections::HashSet;

use tracing::{info, warn};

use fow_core::{Tile, TileHash};

use super::{EncryptedTileRecord, SealKey};

/// Outcome of one replayed record.
#[derive(Debug, PartialEq, Eq)]
pub enum Replay {
    /// Record decrypted and its hash is committed on-chain; apply the tile.
    Apply(Box<Tile>),
    /// Record failed integrity checks; advance past it.
    Skip,
}

/// Totals reported when the peer signals the end of the replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySummary {
    pub applied: u64,
    pub skipped: u64,
}

pub struct RecoveryDriver {
    history: HashSet<TileHash>,
    next_index: u64,
    applied: u64,
    skipped: u64,
}

impl RecoveryDriver {
    pub fn new(history: HashSet<TileHash>) -> Self {
        info!(
            target: "enclave::da",
            committed_hashes = history.len(),
            "starting recovery replay"
        );
        Self {
            history,
            next_index: 0,
            applied: 0,
            skipped: 0,
        }
    }

    /// Index of the record the driver expects next.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Process one replayed record. Always advances the index; a bad record
    /// is reported as [`Replay::Skip`], never as an error to the peer.
    pub fn replay(&mut self, key: &SealKey, record: &EncryptedTileRecord) -> Replay {
        let index = self.next_index;
        self.next_index += 1;
        match key.open(record) {
            Ok(tile) if self.history.contains(&tile.hash()) => {
                self.applied += 1;
                Replay::Apply(Box::new(tile))
            }
            Ok(tile) => {
                // Typically a claim that never finalized on-chain.
                self.skipped += 1;
                warn!(
                    target: "enclave::da",
                    index,
                    loc = ?tile.loc,
                    "replayed tile has no on-chain commitment; skipping"
                );
                Replay::Skip
            }
            Err(err) => {
                self.skipped += 1;
                warn!(target: "enclave::da", index, %err, "replayed record failed to open; skipping");
                Replay::Skip
            }
        }
    }

    /// Tile hashes committed after the replay started still count as valid.
    pub fn note_committed(&mut self, hash: TileHash) {
        self.history.insert(hash);
    }

    pub fn finish(self) -> RecoverySummary {
        let summary = RecoverySummary {
            applied: self.applied,
            skipped: self.skipped,
        };
        info!(
            target: "enclave::da",
            applied = summary.applied,
            skipped = summary.skipped,
            "recovery replay finished"
        );
        summary
    }
}
