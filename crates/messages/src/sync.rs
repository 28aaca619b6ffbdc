//! Join and resynchronization messages.
//!
//! Answered from the last published pulse only, never from in-flight round
//! state, so a joining pulsar cannot observe partially committed data.

use pulsar_types::{Entropy, Pulse};
use sbor::prelude::BasicSbor;

/// Sent by a joining or resynchronizing pulsar.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct HandshakePayload {
    /// Entropy of the latest pulse the sender knows ([`Entropy::ZERO`] if none).
    pub entropy: Entropy,
}

impl HandshakePayload {
    /// Create a new handshake.
    pub fn new(entropy: Entropy) -> Self {
        Self { entropy }
    }
}

/// Last-pulse exchange.
///
/// `pulse: None` is a request; `pulse: Some(_)` is the answer carrying the
/// responder's last published pulse. Answers are never answered.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct GetLastPulsePayload {
    /// The responder's last published pulse.
    pub pulse: Option<Pulse>,
}

impl GetLastPulsePayload {
    /// Create a request.
    pub fn request() -> Self {
        Self { pulse: None }
    }

    /// Create a response.
    pub fn response(pulse: Pulse) -> Self {
        Self { pulse: Some(pulse) }
    }

    /// Check if this is a request.
    pub fn is_request(&self) -> bool {
        self.pulse.is_none()
    }
}
