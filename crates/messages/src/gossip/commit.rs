//! Commit-phase payload.

use pulsar_types::{PulseNumber, Signature};
use sbor::prelude::BasicSbor;

/// Commitment to this round's entropy without disclosing it.
///
/// The signature is over `entropy_commit_message(pulse_number, entropy)`;
/// recipients store it and check the later reveal against it.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct EntropySignaturePayload {
    /// Round the commitment belongs to.
    pub pulse_number: PulseNumber,

    /// Signature locking in the sender's entropy.
    pub signature: Signature,
}

impl EntropySignaturePayload {
    /// Create a new commitment payload.
    pub fn new(pulse_number: PulseNumber, signature: Signature) -> Self {
        Self {
            pulse_number,
            signature,
        }
    }
}
