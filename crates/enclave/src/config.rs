//! Enclave runtime configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use fow_core::TerrainParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnclaveConfig {
    /// Terrain synthesis parameters. Must match whatever the proving
    /// circuits were built against.
    pub terrain: TerrainParams,
    /// Troops granted to a freshly spawned city center.
    pub spawn_resources: u32,
    /// Blocks a move claim stays pending before it is swept.
    pub claim_lifespan: u64,
    /// Command channel depth between handles and the worker.
    pub command_buffer: usize,
    /// Per-topic event bus capacity.
    pub event_capacity: usize,
    /// Where the seal key and attestation signing key live.
    pub key_dir: PathBuf,
    /// Rebuild the board from the data-availability layer before serving.
    pub recover: bool,
}

impl Default for EnclaveConfig {
    fn default() -> Self {
        Self {
            terrain: TerrainParams::default(),
            spawn_resources: 50,
            claim_lifespan: 10,
            command_buffer: 256,
            event_capacity: 100,
            key_dir: PathBuf::from("keys"),
            recover: false,
        }
    }
}
