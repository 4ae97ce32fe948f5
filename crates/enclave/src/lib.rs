//! Off-chain enclave for a fog-of-war territory game.
//!
//! The chain holds only commitments (tile hashes, the randomness hash);
//! this crate holds the plaintext board and mediates every state change:
//! players propose spawns and moves over authenticated sessions, the
//! enclave validates them against the rules in `fow-core`, registers
//! claims, proves and attests them, and applies them once the chain
//! finalizes. Sealed copies of every committed tile stream to a single
//! data-availability peer, from which the board can be rebuilt after a
//! crash.

pub mod chain;
pub mod claims;
pub mod config;
pub mod da;
pub mod enclave;
pub mod error;
pub mod events;
pub mod handle;
pub mod session;
pub mod visibility;
pub mod worker;

pub use chain::{ChainClient, ChainEvent, MockChain, MoveSubmission, SpawnSubmission};
pub use config::EnclaveConfig;
pub use enclave::Enclave;
pub use error::{EnclaveError, Result};
pub use events::{DaEvent, DisplayEvent, Event, EventBus, ProofEvent, Topic};
pub use handle::EnclaveHandle;
pub use session::{ClientRequest, ServerMessage, SessionId};
pub use worker::{DaHandshake, LoginAck, MoveProposal, SpawnProposal, attestation_message};
