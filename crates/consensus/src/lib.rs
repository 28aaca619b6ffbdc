//! Pulsar entropy consensus.
//!
//! A synchronous commit/reveal state machine producing one [`Pulse`] per
//! round, for use by both the simulation and production runners.
//!
//! # Architecture
//!
//! - `Event::RoundTimer` → open a round, broadcast our commitment
//! - `Event::EnvelopeReceived` → collect commitments, reveals and endorsements
//! - `Event::CommitDeadline` → close the commit window, broadcast our reveal
//! - `Event::RevealDeadline` → combine the vector and announce our endorsement,
//!   or abort
//! - `Event::EndorseDeadline` → publish with a quorum of endorsements, or abort
//!
//! All I/O is performed by the runner via returned `Action`s.
//!
//! [`Pulse`]: pulsar_types::Pulse

mod aggregator;
mod assembler;
mod commit_reveal;
mod config;
mod coordinator;
mod entropy;
mod round_state;

pub use aggregator::VectorAggregator;
pub use assembler::{verify_pulse, PulseAssembler, PulseVerifyError};
pub use commit_reveal::{CommitRevealEngine, RevealOutcome};
pub use config::PulsarConfig;
pub use coordinator::{CoordinatorStats, RoundCoordinator};
pub use entropy::{EntropyGenerator, OsEntropy, SeededEntropy};
pub use round_state::{Phase, RoundState};
