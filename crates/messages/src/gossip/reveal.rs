//! Reveal-phase payload.

use pulsar_types::{Entropy, PulseNumber};
use sbor::prelude::BasicSbor;

/// Disclosure of the entropy committed to earlier in the round.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct EntropyPayload {
    /// Round the reveal belongs to.
    pub pulse_number: PulseNumber,

    /// The sender's entropy contribution.
    pub entropy: Entropy,
}

impl EntropyPayload {
    /// Create a new reveal payload.
    pub fn new(pulse_number: PulseNumber, entropy: Entropy) -> Self {
        Self {
            pulse_number,
            entropy,
        }
    }
}
