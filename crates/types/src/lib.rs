//! Core types for the pulsar entropy-consensus protocol.
//!
//! - [`Entropy`], [`Pulse`], [`BftCell`], [`Vector`]: protocol data
//! - [`KeyPair`], [`PublicKey`], [`Signature`], [`PulsarSigner`]: signing primitives
//! - [`Roster`], [`NetworkCoordinator`]: who may take part in a round
//! - [`signing`]: domain-separated signing messages

mod crypto;
mod entropy;
mod hash;
mod identifiers;
mod pulse;
mod roster;
pub mod signing;

pub use crypto::{KeyPair, KeyType, PublicKey, PulsarSigner, Signature, SignerError};
pub use entropy::Entropy;
pub use hash::Hash;
pub use identifiers::{PulseNumber, PulsarId, Quorum};
pub use pulse::{BftCell, Pulse, Vector};
pub use roster::{NetworkCoordinator, PulsarInfo, Roster, RosterError, StaticNetworkCoordinator};
pub use signing::{entropy_commit_message, envelope_message, pulse_message};
