//! Common interface implemented by all proving backends.

use serde::{Deserialize, Serialize};

use crate::witness::{Circuit, Witness};

/// Serialized proof plus the public signals it binds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub bytes: Vec<u8>,
    pub public_signals: Vec<String>,
}

/// Which backend produced a proof, or that none could.
///
/// `Incomplete` is a status, not an error: callers still deliver it to the
/// requester so the requester can decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProverStatus {
    FastBackend,
    SoftwareBackend,
    Incomplete,
}

/// Orchestrator result: the proof when one was produced, and the status
/// to forward to the requester either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofBundle {
    pub proof: Option<Proof>,
    pub status: ProverStatus,
}

impl ProofBundle {
    pub fn incomplete() -> Self {
        Self {
            proof: None,
            status: ProverStatus::Incomplete,
        }
    }
}

/// Errors a single backend can fail with. The orchestrator turns these
/// into fallback decisions rather than surfacing them.
#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("backend process failed: {0}")]
    Process(String),

    #[error("malformed backend output: {0}")]
    MalformedOutput(String),

    #[error("witness is inconsistent with the rules: {0}")]
    WitnessInconsistency(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// A proving capability. Two interchangeable implementations exist: the
/// fast external backend and the in-process software fallback.
pub trait ProverBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn prove(&self, circuit: Circuit, witness: &Witness) -> Result<Proof, ProofError>;
}
