//! Core types for pulsar consensus.
//!
//! This crate provides the foundational types for the consensus architecture:
//!
//! - [`Event`]: All possible inputs to the state machine
//! - [`Action`]: All possible outputs from the state machine
//! - [`EventPriority`]: Ordering priority for events at the same timestamp
//! - [`StateMachine`]: The trait the round coordinator implements
//! - [`PulseBroadcaster`]: Where finalized pulses go
//!
//! # Architecture
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! All I/O is handled by the runner (simulation or production) which:
//! 1. Delivers events to the state machine
//! 2. Executes the returned actions
//! 3. Converts timer expiries and transport input back into events

mod action;
mod error;
mod event;
mod traits;

pub use action::Action;
pub use error::{AbortCause, DropReason};
pub use event::{Event, EventPriority};
pub use traits::{PulseBroadcaster, StateMachine};

use pulsar_types::PulseNumber;

/// Timer identification.
///
/// Phase timers carry the round they were armed for, so a deadline that
/// outlives its round is recognisable when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// Opens the next round.
    NextRound,
    /// Ends the commit phase of the given round.
    CommitPhase(PulseNumber),
    /// Ends the reveal phase of the given round.
    RevealPhase(PulseNumber),
    /// Ends endorsement collection for the given round.
    EndorsePhase(PulseNumber),
}

impl TimerId {
    /// The event delivered when this timer fires.
    pub fn event(&self) -> Event {
        match *self {
            TimerId::NextRound => Event::RoundTimer,
            TimerId::CommitPhase(pulse_number) => Event::CommitDeadline { pulse_number },
            TimerId::RevealPhase(pulse_number) => Event::RevealDeadline { pulse_number },
            TimerId::EndorsePhase(pulse_number) => Event::EndorseDeadline { pulse_number },
        }
    }
}
