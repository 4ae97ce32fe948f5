//! Enclave startup and task wiring.
//!
//! `Enclave::start` loads (or mints) the key material, commits the board
//! randomness on first boot, spawns the single state-owning worker, and
//! bridges the chain event stream into the worker's command channel.

use std::path::Path;
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use fow_zk::ProofOrchestrator;

use crate::chain::ChainClient;
use crate::config::EnclaveConfig;
use crate::da::{RecoveryDriver, SealError, SealKey};
use crate::error::Result;
use crate::events::EventBus;
use crate::handle::EnclaveHandle;
use crate::worker::{Command, EnclaveWorker};

pub struct Enclave {
    handle: EnclaveHandle,
    worker: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl Enclave {
    pub async fn start(
        config: EnclaveConfig,
        chain: Arc<dyn ChainClient>,
        orchestrator: Arc<ProofOrchestrator>,
    ) -> Result<Self> {
        let (seal_key, created) = SealKey::load_or_generate(&config.key_dir.join("seal.key"))?;
        if created {
            // First boot: the randomness commitment must be on-chain before
            // any virtual tile can be proven against it.
            let commitment = seal_key.commitment();
            chain.commit_randomness(commitment.hash).await?;
            info!(target: "enclave", "seal key generated, randomness committed");
        }
        let signer = load_or_generate_signer(&config.key_dir.join("signer.key"))?;

        let block_height = chain.block_height().await?;
        let recovery = if config.recover {
            Some(RecoveryDriver::new(chain.hash_history().await?))
        } else {
            None
        };

        let bus = EventBus::with_capacity(config.event_capacity);
        let (tx, rx) = mpsc::channel(config.command_buffer);
        let worker = EnclaveWorker::new(
            &config,
            seal_key,
            signer,
            Arc::clone(&chain),
            bus.clone(),
            rx,
            block_height,
            recovery,
        );
        let worker = tokio::spawn(worker.run());

        // Chain events go through the same channel as everything else, so
        // their application is serialized with player commands.
        let mut events = chain.subscribe_events().await?;
        let event_tx = tx.clone();
        let listener = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if event_tx.send(Command::Chain(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(target: "enclave::chain", missed, "chain event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let handle = EnclaveHandle::new(tx, bus, chain, orchestrator);
        Ok(Self {
            handle,
            worker,
            listener,
        })
    }

    pub fn handle(&self) -> EnclaveHandle {
        self.handle.clone()
    }

    pub async fn shutdown(self) {
        self.listener.abort();
        self.worker.abort();
        let _ = self.listener.await;
        let _ = self.worker.await;
        info!(target: "enclave", "enclave stopped");
    }
}

fn load_or_generate_signer(path: &Path) -> Result<SigningKey> {
    if path.exists() {
        let text = std::fs::read_to_string(path)?;
        let bytes =
            hex::decode(text.trim()).map_err(|_| SealError::MalformedKeyFile)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SealError::MalformedKeyFile)?;
        return Ok(SigningKey::from_bytes(&bytes));
    }
    let signer = SigningKey::generate(&mut rand::rngs::OsRng);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(SealError::KeyFile)?;
    }
    std::fs::write(path, hex::encode(signer.to_bytes())).map_err(SealError::KeyFile)?;
    Ok(signer)
}
