//! Pulse assembly and independent re-verification.

use pulsar_types::{pulse_message, Entropy, Pulse, PulseNumber, PulsarId, Roster, Signature, Vector};
use std::collections::BTreeMap;
use thiserror::Error;

/// Builds the final pulse once a round succeeds.
pub struct PulseAssembler;

impl PulseAssembler {
    /// Assemble a pulse.
    ///
    /// The signatures are contributors' endorsements over
    /// `pulse_message(pulse_number, entropy)`. Endorsements from pulsars
    /// outside the vector are left out.
    pub fn assemble(
        pulse_number: PulseNumber,
        entropy: Entropy,
        vector: &Vector,
        endorsements: &BTreeMap<PulsarId, Signature>,
    ) -> Pulse {
        Pulse {
            number: pulse_number,
            entropy,
            signatures: endorsements
                .iter()
                .filter(|(pulsar, _)| vector.contains(**pulsar))
                .map(|(pulsar, signature)| (*pulsar, signature.clone()))
                .collect(),
        }
    }
}

/// Reasons a pulse fails re-verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PulseVerifyError {
    #[error("pulse has {collected} endorsements, quorum is {required}")]
    BelowQuorum { collected: usize, required: usize },

    #[error("endorser {0} is not in the roster")]
    UnknownPulsar(PulsarId),

    #[error("endorsement of {0} does not verify")]
    InvalidSignature(PulsarId),
}

/// Re-verify a pulse with nothing but the roster.
///
/// Every signature must be a roster member's endorsement of exactly this
/// `(number, entropy)` pair, and there must be a quorum of them.
pub fn verify_pulse(pulse: &Pulse, roster: &Roster) -> Result<(), PulseVerifyError> {
    let message = pulse_message(pulse.number, &pulse.entropy);
    for (pulsar, signature) in &pulse.signatures {
        let public_key = roster
            .public_key(*pulsar)
            .ok_or(PulseVerifyError::UnknownPulsar(*pulsar))?;
        if !public_key.verify(&message, signature) {
            return Err(PulseVerifyError::InvalidSignature(*pulsar));
        }
    }

    let required = roster.quorum();
    if pulse.signatures.len() < required {
        return Err(PulseVerifyError::BelowQuorum {
            collected: pulse.signatures.len(),
            required,
        });
    }
    Ok(())
}
