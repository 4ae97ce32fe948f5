//! Topic-based event bus for enclave pushes.
//!
//! Client-facing session tasks subscribe to [`Topic::Display`] and forward
//! the pushes addressed to their player; everything else is observability.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};

use fow_core::{Location, PlayerAddr};
use fow_zk::ProverStatus;

use crate::da::RecoverySummary;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Topic {
    /// Pushes addressed to player sessions.
    Display,
    /// Proof generation outcomes.
    Proof,
    /// Data-availability lifecycle.
    Da,
}

/// Pushes delivered to a specific player's session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DisplayEvent {
    /// Cells in the player's view changed; the client should re-fetch them.
    UpdateDisplay {
        player: PlayerAddr,
        locations: BTreeSet<Location>,
    },
    /// The player's spawn transaction was rejected; pick a spot and retry.
    TrySpawn { player: PlayerAddr },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProofEvent {
    Completed { circuit: String, status: ProverStatus },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaEvent {
    RecordQueued { depth: usize },
    RecoveryFinished { applied: u64, skipped: u64 },
}

impl From<RecoverySummary> for DaEvent {
    fn from(summary: RecoverySummary) -> Self {
        DaEvent::RecoveryFinished {
            applied: summary.applied,
            skipped: summary.skipped,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Display(DisplayEvent),
    Proof(ProofEvent),
    Da(DaEvent),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Display(_) => Topic::Display,
            Event::Proof(_) => Topic::Proof,
            Event::Da(_) => Topic::Da,
        }
    }
}

/// Topic-based broadcast bus. Publishing is best-effort; a topic with no
/// subscribers just drops the event.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<RwLock<HashMap<Topic, broadcast::Sender<Event>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut channels = HashMap::new();
        channels.insert(Topic::Display, broadcast::channel(capacity).0);
        channels.insert(Topic::Proof, broadcast::channel(capacity).0);
        channels.insert(Topic::Da, broadcast::channel(capacity).0);
        Self {
            channels: Arc::new(RwLock::new(channels)),
        }
    }

    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        match self.channels.try_read() {
            Ok(channels) => {
                if let Some(tx) = channels.get(&topic)
                    && tx.send(event).is_err()
                {
                    tracing::trace!(target: "enclave::events", ?topic, "no subscribers");
                }
            }
            Err(_) => {
                tracing::debug!(target: "enclave::events", ?topic, "event bus busy, push dropped");
            }
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        let channels = self
            .channels
            .try_read()
            .expect("event channels are only written at construction");
        channels
            .get(&topic)
            .expect("all topics are pre-created")
            .subscribe()
    }
}
