//! Per-pulsar fault injection.
//!
//! Faults are applied by the runner to a node's outbound envelopes; the
//! node's own state machine always runs the honest protocol.

use pulsar_messages::{EntropyPayload, Envelope, PayloadBody};
use pulsar_types::{Entropy, KeyPair};
use tracing::trace;

/// How a simulated pulsar treats its outbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PulsarBehavior {
    /// Sends everything unchanged.
    #[default]
    Honest,
    /// Sends nothing at all.
    Silent,
    /// Commits but never reveals.
    WithholdReveal,
    /// Reveals entropy that does not match its commitment.
    CorruptReveal,
}

impl PulsarBehavior {
    /// Apply this behavior to an outbound envelope.
    ///
    /// Returns `None` when the envelope should not leave the node.
    pub(crate) fn apply(self, envelope: Envelope, key: &KeyPair) -> Option<Envelope> {
        match self {
            PulsarBehavior::Honest => Some(envelope),
            PulsarBehavior::Silent => None,
            PulsarBehavior::WithholdReveal => match envelope.unwrap() {
                Ok(PayloadBody::Entropy(_)) => {
                    trace!("Withholding reveal");
                    None
                }
                _ => Some(envelope),
            },
            PulsarBehavior::CorruptReveal => match envelope.unwrap() {
                Ok(PayloadBody::Entropy(payload)) => {
                    let forged = PayloadBody::Entropy(EntropyPayload::new(
                        payload.pulse_number,
                        corrupt(&payload.entropy),
                    ));
                    trace!(pulse_number = %payload.pulse_number, "Corrupting reveal");
                    Envelope::wrap(&forged, key).ok()
                }
                _ => Some(envelope),
            },
        }
    }
}

/// Flip every bit, so the result never matches the committed value.
fn corrupt(entropy: &Entropy) -> Entropy {
    let mut bytes = *entropy.as_bytes();
    for byte in bytes.iter_mut() {
        *byte = !*byte;
    }
    Entropy::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsar_messages::EntropySignaturePayload;
    use pulsar_types::{KeyType, PulseNumber, Signature};

    fn key() -> KeyPair {
        KeyPair::from_seed(KeyType::Ed25519, &[7u8; 32])
    }

    fn reveal(key: &KeyPair, entropy: Entropy) -> Envelope {
        let body = PayloadBody::Entropy(EntropyPayload::new(PulseNumber(3), entropy));
        Envelope::wrap(&body, key).unwrap()
    }

    fn commit(key: &KeyPair) -> Envelope {
        let body = PayloadBody::EntropySignature(EntropySignaturePayload::new(
            PulseNumber(3),
            Signature::zero(),
        ));
        Envelope::wrap(&body, key).unwrap()
    }

    #[test]
    fn test_withhold_only_drops_reveals() {
        let key = key();
        let behavior = PulsarBehavior::WithholdReveal;

        assert!(behavior.apply(reveal(&key, Entropy::ZERO), &key).is_none());
        assert!(behavior.apply(commit(&key), &key).is_some());
    }

    #[test]
    fn test_corrupt_reveal_is_resigned_with_other_entropy() {
        let key = key();
        let original = Entropy::from_bytes([0x5a; 64]);

        let forged = PulsarBehavior::CorruptReveal
            .apply(reveal(&key, original), &key)
            .unwrap();

        assert!(forged.verify());
        match forged.unwrap().unwrap() {
            PayloadBody::Entropy(payload) => {
                assert_eq!(payload.pulse_number, PulseNumber(3));
                assert_ne!(payload.entropy, original);
            }
            other => panic!("unexpected body {}", other.type_name()),
        }
    }

    #[test]
    fn test_silent_drops_everything() {
        let key = key();
        assert!(PulsarBehavior::Silent.apply(commit(&key), &key).is_none());
        assert!(PulsarBehavior::Honest.apply(commit(&key), &key).is_some());
    }
}
