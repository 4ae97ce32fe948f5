//! Proof generation for board state transitions.
//!
//! The enclave never talks to a proving backend directly: it hands a
//! [`Witness`] to the [`ProofOrchestrator`], which tries the fast external
//! backend first and falls back to the in-process software backend. Both
//! implement [`ProverBackend`], so callers only ever see a [`ProofBundle`]
//! carrying the proof (if any) and which backend produced it.
pub mod fast;
pub mod orchestrator;
pub mod prover;
pub mod software;
pub mod witness;

pub use fast::FastProver;
pub use orchestrator::ProofOrchestrator;
pub use prover::{Proof, ProofBundle, ProofError, ProverBackend, ProverStatus};
pub use software::SoftwareProver;
pub use witness::{Circuit, MoveWitness, SpawnWitness, VirtualTileWitness, Witness};
