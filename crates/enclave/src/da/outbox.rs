//! FIFO outbox of sealed tile records, drained by exactly one DA peer.
//!
//! Records are delivered at-least-once: [`Outbox::front`] hands out the head
//! without removing it, and only the peer's acknowledgement pops it. A record
//! therefore survives a peer crash between delivery and ack.

use std::collections::VecDeque;

use tracing::{debug, info};

use super::{DaError, EncryptedTileRecord};

/// Identifies one peer connection. A reconnecting peer gets a fresh id, so a
/// stale connection can never ack records on behalf of its successor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerId(pub u64);

impl core::fmt::Display for PeerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<EncryptedTileRecord>,
    peer: Option<PeerId>,
    next_peer_id: u64,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handshake from a would-be peer. Fails while another peer holds the
    /// connection.
    pub fn connect(&mut self) -> Result<PeerId, DaError> {
        if self.peer.is_some() {
            return Err(DaError::PeerAlreadyConnected);
        }
        self.next_peer_id += 1;
        let peer = PeerId(self.next_peer_id);
        self.peer = Some(peer);
        info!(target: "enclave::da", %peer, "da peer connected");
        Ok(peer)
    }

    /// Drop the connection if `peer` is the current one; stale disconnects
    /// are ignored.
    pub fn disconnect(&mut self, peer: PeerId) {
        if self.peer == Some(peer) {
            self.peer = None;
            info!(target: "enclave::da", %peer, "da peer disconnected");
        }
    }

    pub fn connected_peer(&self) -> Option<PeerId> {
        self.peer
    }

    pub fn enqueue(&mut self, record: EncryptedTileRecord) {
        debug!(
            target: "enclave::da",
            address = %record.address,
            depth = self.queue.len() + 1,
            "record queued"
        );
        self.queue.push_back(record);
    }

    /// Head of the queue, left in place until acked. Only the connected
    /// peer may drain.
    pub fn front(&self, peer: PeerId) -> Result<Option<&EncryptedTileRecord>, DaError> {
        self.check_peer(peer)?;
        Ok(self.queue.front())
    }

    /// Acknowledge the head record, removing it. Returns the popped record,
    /// or `None` when the queue was already empty.
    pub fn ack(&mut self, peer: PeerId) -> Result<Option<EncryptedTileRecord>, DaError> {
        self.check_peer(peer)?;
        Ok(self.queue.pop_front())
    }

    pub fn depth(&self) -> usize {
        self.queue.len()
    }

    fn check_peer(&self, peer: PeerId) -> Result<(), DaError> {
        if self.peer == Some(peer) {
            Ok(())
        } else {
            Err(DaError::UnknownPeer(peer.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u8) -> EncryptedTileRecord {
        EncryptedTileRecord {
            symbol: "A".into(),
            address: format!("0x{n:02x}"),
            ciphertext: hex::encode([n; 4]),
            iv: hex::encode([n; 12]),
            tag: hex::encode([n; 16]),
        }
    }

    #[test]
    fn drains_in_fifo_order_with_acks() {
        let mut outbox = Outbox::new();
        outbox.enqueue(record(1));
        outbox.enqueue(record(2));
        let peer = outbox.connect().unwrap();

        assert_eq!(outbox.front(peer).unwrap(), Some(&record(1)));
        // Unacked head stays put.
        assert_eq!(outbox.front(peer).unwrap(), Some(&record(1)));
        assert_eq!(outbox.ack(peer).unwrap(), Some(record(1)));
        assert_eq!(outbox.front(peer).unwrap(), Some(&record(2)));
        assert_eq!(outbox.ack(peer).unwrap(), Some(record(2)));
        assert_eq!(outbox.front(peer).unwrap(), None);
    }

    #[test]
    fn second_handshake_is_rejected_while_first_is_live() {
        let mut outbox = Outbox::new();
        let first = outbox.connect().unwrap();
        assert!(matches!(outbox.connect(), Err(DaError::PeerAlreadyConnected)));
        outbox.disconnect(first);
        outbox.connect().unwrap();
    }

    #[test]
    fn stale_peer_cannot_drain_after_reconnect() {
        let mut outbox = Outbox::new();
        outbox.enqueue(record(1));
        let old = outbox.connect().unwrap();
        outbox.disconnect(old);
        let new = outbox.connect().unwrap();
        assert!(matches!(outbox.ack(old), Err(DaError::UnknownPeer(_))));
        assert_eq!(outbox.ack(new).unwrap(), Some(record(1)));
    }
}
