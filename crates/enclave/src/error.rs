//! Error types for the enclave runtime.
//!
//! The split mirrors the protocol's failure semantics: [`EnclaveError::Validation`]
//! and [`EnclaveError::Conflict`] terminate the offending player session, chain
//! write failures are logged and left to claim expiry, and data-availability
//! integrity failures are handled record-by-record inside the recovery driver.

use fow_core::{BoardError, LocationError, MoveRuleError};
use thiserror::Error;

use crate::chain::ChainError;
use crate::da::{DaError, SealError};

pub type Result<T> = std::result::Result<T, EnclaveError>;

#[derive(Debug, Error)]
pub enum EnclaveError {
    /// Malformed or out-of-bounds input from a player session.
    #[error("validation failure: {0}")]
    Validation(String),

    /// Request contradicts current protocol state (duplicate login,
    /// double spawn, more than one proposal per block, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Player commands are refused while the board is being rebuilt
    /// from the data-availability layer.
    #[error("enclave is recovering; player commands are not accepted yet")]
    Recovering,

    #[error("location error: {0}")]
    Location(#[from] LocationError),

    #[error("board error: {0}")]
    Board(#[from] BoardError),

    #[error("move rule error: {0}")]
    MoveRule(#[from] MoveRuleError),

    #[error("data-availability error: {0}")]
    Da(#[from] DaError),

    #[error("seal error: {0}")]
    Seal(#[from] SealError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker loop has shut down and dropped its command receiver.
    #[error("command channel closed")]
    CommandChannelClosed,

    /// The worker dropped a reply sender without answering.
    #[error("reply channel closed")]
    ReplyChannelClosed,

    #[error("background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl EnclaveError {
    /// Whether this error must terminate the player session that caused it.
    pub fn terminates_session(&self) -> bool {
        matches!(
            self,
            EnclaveError::Validation(_)
                | EnclaveError::Conflict(_)
                | EnclaveError::Location(_)
                | EnclaveError::Board(_)
                | EnclaveError::MoveRule(_)
        )
    }
}
