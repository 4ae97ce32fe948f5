//! Data-availability sync: tile sealing, the FIFO outbox drained by the
//! single external DA peer, and crash recovery from replayed records.

mod outbox;
mod recovery;
mod seal;

pub use outbox::{Outbox, PeerId};
pub use recovery::{RecoveryDriver, RecoverySummary, Replay};
pub use seal::{EncryptedTileRecord, RandomnessCommitment, SealError, SealKey};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaError {
    /// A second peer tried to handshake while one is already connected.
    #[error("a data-availability peer is already connected")]
    PeerAlreadyConnected,

    /// A drain or recovery message arrived from a peer that is not the
    /// currently connected one.
    #[error("unknown data-availability peer {0}")]
    UnknownPeer(u64),

    /// Recovery messages arrived while the enclave is not recovering.
    #[error("enclave is not in recovery mode")]
    NotRecovering,
}
