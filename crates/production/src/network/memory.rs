//! In-process transport over tokio channels.
//!
//! Used by the devnet binary and integration tests to run a whole roster in
//! one process with real async scheduling.

use super::{PeerTransport, TransportError, TransportEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use pulsar_types::PulsarId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Shared hub every [`MemoryTransport`] is attached to.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<Mutex<BTreeMap<PulsarId, mpsc::UnboundedSender<TransportEvent>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a pulsar. Peers already attached see it come up, and it sees
    /// them.
    pub fn connect(&self, id: PulsarId) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut peers = self.peers.lock();
        for (peer, sender) in peers.iter() {
            if *peer != id {
                let _ = sender.send(TransportEvent::PeerUp(id));
                let _ = tx.send(TransportEvent::PeerUp(*peer));
            }
        }
        peers.insert(id, tx);
        debug!(pulsar = %id, peers = peers.len(), "Pulsar connected");

        MemoryTransport {
            id,
            network: self.clone(),
            rx,
        }
    }

    /// Detach a pulsar. Its transport closes and every remaining peer sees
    /// it go down.
    pub fn disconnect(&self, id: PulsarId) {
        let mut peers = self.peers.lock();
        if peers.remove(&id).is_none() {
            return;
        }
        for sender in peers.values() {
            let _ = sender.send(TransportEvent::PeerDown(id));
        }
        debug!(pulsar = %id, peers = peers.len(), "Pulsar disconnected");
    }

    /// Currently attached pulsars.
    pub fn connected(&self) -> Vec<PulsarId> {
        self.peers.lock().keys().copied().collect()
    }

    fn deliver(&self, to: PulsarId, frame: Vec<u8>) -> Result<(), TransportError> {
        let peers = self.peers.lock();
        let sender = peers.get(&to).ok_or(TransportError::PeerUnreachable(to))?;
        sender
            .send(TransportEvent::Frame(frame))
            .map_err(|_| TransportError::PeerUnreachable(to))
    }

    fn deliver_all(&self, from: PulsarId, frame: &[u8]) {
        let peers = self.peers.lock();
        for (peer, sender) in peers.iter() {
            if *peer != from && sender.send(TransportEvent::Frame(frame.to_vec())).is_err() {
                trace!(pulsar = %peer, "Dropping frame for closed peer");
            }
        }
    }
}

/// One pulsar's end of a [`MemoryNetwork`].
pub struct MemoryTransport {
    id: PulsarId,
    network: MemoryNetwork,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl MemoryTransport {
    pub fn id(&self) -> PulsarId {
        self.id
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn send(&self, to: PulsarId, frame: Vec<u8>) -> Result<(), TransportError> {
        self.network.deliver(to, frame)
    }

    async fn broadcast(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.network.deliver_all(self.id, &frame);
        Ok(())
    }

    async fn receive(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<TransportEvent>, TransportError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Ok(None),
        }
    }
}
