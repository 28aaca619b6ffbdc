//! The fixed set of payload kinds carried inside an envelope.

use crate::{
    EntropyPayload, EntropySignaturePayload, GetLastPulsePayload, HandshakePayload, PulsePayload,
    VectorPayload,
};
use pulsar_types::PulseNumber;
use sbor::prelude::BasicSbor;

/// Every protocol message body.
///
/// Encoded with an explicit variant tag; decoding an unknown tag fails
/// rather than guessing.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub enum PayloadBody {
    /// Join/resync announcement.
    Handshake(HandshakePayload),
    /// Last-pulse request or response.
    GetLastPulse(GetLastPulsePayload),
    /// Commit phase.
    EntropySignature(EntropySignaturePayload),
    /// Reveal phase.
    Entropy(EntropyPayload),
    /// Optional post-round cross-check.
    Vector(VectorPayload),
    /// Finalization broadcast.
    PulseAnnounce(PulsePayload),
}

impl PayloadBody {
    /// Get a human-readable name for this payload type.
    pub fn type_name(&self) -> &'static str {
        match self {
            PayloadBody::Handshake(_) => "Handshake",
            PayloadBody::GetLastPulse(_) => "GetLastPulse",
            PayloadBody::EntropySignature(_) => "EntropySignature",
            PayloadBody::Entropy(_) => "Entropy",
            PayloadBody::Vector(_) => "Vector",
            PayloadBody::PulseAnnounce(_) => "PulseAnnounce",
        }
    }

    /// The round this body belongs to, for round-scoped payloads.
    pub fn pulse_number(&self) -> Option<PulseNumber> {
        match self {
            PayloadBody::EntropySignature(p) => Some(p.pulse_number),
            PayloadBody::Entropy(p) => Some(p.pulse_number),
            PayloadBody::Vector(p) => Some(p.pulse_number),
            PayloadBody::PulseAnnounce(p) => Some(p.pulse.number),
            PayloadBody::Handshake(_) | PayloadBody::GetLastPulse(_) => None,
        }
    }
}
