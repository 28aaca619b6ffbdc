//! Domain-separated signing for cryptographic operations.
//!
//! Every signature a pulsar produces is over a message prefixed with a domain
//! tag, so a signature from one context can never be replayed in another
//! (for example an entropy commitment presented as an envelope signature).
//!
//! # Domain Tags
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `pulsar_envelope:` | Signed envelope around every protocol payload |
//! | `entropy_commit:` | Commit-phase signature over a pulsar's entropy |
//! | `pulse_endorse:` | Endorsement of a round's combined entropy |

use crate::{Entropy, PulseNumber};

/// Domain tag for protocol envelopes.
///
/// Format: `pulsar_envelope:` || encoded body
pub const DOMAIN_ENVELOPE: &[u8] = b"pulsar_envelope:";

/// Domain tag for entropy commitments.
///
/// Format: `entropy_commit:` || pulse_number || entropy
///
/// The pulse number binds a commitment to one round; a commitment from an
/// earlier round cannot be replayed into a later one.
pub const DOMAIN_ENTROPY_COMMIT: &[u8] = b"entropy_commit:";

/// Domain tag for pulse endorsements.
///
/// Format: `pulse_endorse:` || pulse_number || combined entropy
pub const DOMAIN_PULSE_ENDORSE: &[u8] = b"pulse_endorse:";

/// Build the signing message for an envelope body.
pub fn envelope_message(body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_ENVELOPE.len() + body.len());
    message.extend_from_slice(DOMAIN_ENVELOPE);
    message.extend_from_slice(body);
    message
}

/// Build the signing message for an entropy commitment.
///
/// Used both when committing (sign) and when checking a reveal against the
/// stored commitment (verify).
pub fn entropy_commit_message(pulse_number: PulseNumber, entropy: &Entropy) -> Vec<u8> {
    // 15 (tag) + 8 (number) + 64 (entropy)
    let mut message = Vec::with_capacity(DOMAIN_ENTROPY_COMMIT.len() + 8 + Entropy::BYTES);
    message.extend_from_slice(DOMAIN_ENTROPY_COMMIT);
    message.extend_from_slice(&pulse_number.0.to_le_bytes());
    message.extend_from_slice(entropy.as_bytes());
    message
}

/// Build the signing message for a pulse endorsement.
///
/// Every contributor signs this over the entropy it computed, so a pulse can
/// be checked by anyone holding the roster.
pub fn pulse_message(pulse_number: PulseNumber, entropy: &Entropy) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_PULSE_ENDORSE.len() + 8 + Entropy::BYTES);
    message.extend_from_slice(DOMAIN_PULSE_ENDORSE);
    message.extend_from_slice(&pulse_number.0.to_le_bytes());
    message.extend_from_slice(entropy.as_bytes());
    message
}
