//! External-process proving backend.
//!
//! Shells out to a native prover binary (e.g. a rapidsnark build). The
//! witness is staged in a temporary directory that is removed on every
//! exit path, success or failure, via `TempDir` RAII.

use std::path::PathBuf;
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::prover::{Proof, ProofError, ProverBackend};
use crate::witness::{Circuit, Witness};

/// Output shape expected from the prover binary on stdout-less mode:
/// a JSON file `{ "proof": "<hex>", "public_signals": [...] }`.
#[derive(Debug, Deserialize)]
struct FastProverOutput {
    proof: String,
    public_signals: Vec<String>,
}

/// Fast native proving backend driven over the filesystem.
#[derive(Debug, Clone)]
pub struct FastProver {
    binary: PathBuf,
    /// Directory holding the per-circuit proving artifacts (keys, wasm).
    circuit_dir: PathBuf,
}

impl FastProver {
    pub fn new(binary: impl Into<PathBuf>, circuit_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            circuit_dir: circuit_dir.into(),
        }
    }
}

impl ProverBackend for FastProver {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn prove(&self, circuit: Circuit, witness: &Witness) -> Result<Proof, ProofError> {
        // Dropped on every return below, removing all staged artifacts.
        let workdir = tempfile::tempdir()?;

        let witness_path = workdir.path().join("witness.json");
        let output_path = workdir.path().join("proof.json");
        std::fs::write(&witness_path, serde_json::to_vec(witness)?)?;

        debug!(
            target: "zk::fast",
            circuit = circuit.as_str(),
            binary = %self.binary.display(),
            "invoking fast prover"
        );

        let status = Command::new(&self.binary)
            .arg("prove")
            .arg(circuit.as_str())
            .arg(self.circuit_dir.join(circuit.as_str()))
            .arg(&witness_path)
            .arg(&output_path)
            .status()
            .map_err(|e| ProofError::Process(format!("failed to launch prover: {e}")))?;

        if !status.success() {
            return Err(ProofError::Process(format!(
                "prover exited with status {status}"
            )));
        }

        let raw = std::fs::read(&output_path)?;
        let parsed: FastProverOutput = serde_json::from_slice(&raw)
            .map_err(|e| ProofError::MalformedOutput(e.to_string()))?;

        let bytes = hex::decode(&parsed.proof)
            .map_err(|e| ProofError::MalformedOutput(format!("proof is not hex: {e}")))?;

        let expected = witness.public_signals();
        if parsed.public_signals != expected {
            return Err(ProofError::MalformedOutput(
                "public signals do not match the witness".into(),
            ));
        }

        Ok(Proof {
            bytes,
            public_signals: parsed.public_signals,
        })
    }
}
