//! Network messages for the pulsar protocol.
//!
//! Every message is a [`PayloadBody`] wrapped in a signed [`Envelope`];
//! [`wire`] frames envelopes for the transport.

mod body;
mod envelope;
pub mod gossip;
pub mod sync;
pub mod wire;

pub use body::PayloadBody;
pub use envelope::{CodecError, Envelope};
pub use gossip::{EntropyPayload, EntropySignaturePayload, PulsePayload, VectorPayload};
pub use sync::{GetLastPulsePayload, HandshakePayload};
pub use wire::{decode_frame, encode_frame, WireError};
