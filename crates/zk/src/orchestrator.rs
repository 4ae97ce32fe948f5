//! Fast-then-fallback proving strategy.

use tracing::{error, warn};

use crate::fast::FastProver;
use crate::prover::{ProofBundle, ProverBackend, ProverStatus};
use crate::software::SoftwareProver;
use crate::witness::Witness;

/// Tries the fast backend first and falls back to the software backend on
/// any failure. Both failing yields [`ProverStatus::Incomplete`], never an
/// error: the requester decides whether to retry.
pub struct ProofOrchestrator {
    fast: Option<FastProver>,
    software: SoftwareProver,
}

impl ProofOrchestrator {
    pub fn new(fast: Option<FastProver>) -> Self {
        Self {
            fast,
            software: SoftwareProver::new(),
        }
    }

    /// Software backend only; used when no native prover is installed.
    pub fn software_only() -> Self {
        Self::new(None)
    }

    pub fn prove(&self, witness: &Witness) -> ProofBundle {
        let circuit = witness.circuit();

        if let Some(fast) = &self.fast {
            match fast.prove(circuit, witness) {
                Ok(proof) => {
                    return ProofBundle {
                        proof: Some(proof),
                        status: ProverStatus::FastBackend,
                    };
                }
                Err(e) => {
                    warn!(
                        target: "zk::orchestrator",
                        circuit = circuit.as_str(),
                        error = %e,
                        "fast backend failed, falling back to software"
                    );
                }
            }
        }

        match self.software.prove(circuit, witness) {
            Ok(proof) => ProofBundle {
                proof: Some(proof),
                status: ProverStatus::SoftwareBackend,
            },
            Err(e) => {
                error!(
                    target: "zk::orchestrator",
                    circuit = circuit.as_str(),
                    error = %e,
                    "software backend failed, reporting incomplete"
                );
                ProofBundle::incomplete()
            }
        }
    }
}
