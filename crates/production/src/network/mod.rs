//! Peer transport boundary.
//!
//! The runner only needs three things from the network: send a frame to one
//! pulsar, send a frame to every pulsar, and receive whatever arrives next.
//! Delivery may be lossy, duplicated, or reordered; the coordinator copes
//! with all three.

mod memory;
mod rate_limiter;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use rate_limiter::{InboundRateLimiter, RateLimitConfig};

use async_trait::async_trait;
use pulsar_types::PulsarId;
use std::time::Duration;
use thiserror::Error;

/// Errors from a peer transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Peer {0} is not reachable")]
    PeerUnreachable(PulsarId),

    #[error("Transport closed")]
    Closed,
}

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A raw frame arrived. Its envelope carries the sender's identity.
    Frame(Vec<u8>),
    /// The transport can reach this pulsar again.
    PeerUp(PulsarId),
    /// The transport lost contact with this pulsar.
    PeerDown(PulsarId),
}

/// Transport used by the production runner.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Send a frame to a single pulsar.
    async fn send(&self, to: PulsarId, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Send a frame to every other connected pulsar.
    async fn broadcast(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. Must be cancel-safe:
    /// the runner polls it inside `select!` and drops it when a timer wins.
    async fn receive(&mut self, timeout: Duration)
        -> Result<Option<TransportEvent>, TransportError>;
}
