//! Action types for the deterministic state machine.

use crate::{AbortCause, DropReason, TimerId};
use pulsar_messages::Envelope;
use pulsar_types::{PublicKey, Pulse, PulseNumber, PulsarId};
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Send an envelope to every other pulsar in the roster.
    Broadcast { envelope: Envelope },

    /// Send an envelope to a single pulsar.
    SendTo {
        pulsar: PulsarId,
        envelope: Envelope,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Set a timer to fire after a duration. Replaces a pending timer with
    /// the same id.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    // ═══════════════════════════════════════════════════════════════════════
    // Boundary
    // ═══════════════════════════════════════════════════════════════════════
    /// Hand a finalized pulse to the [`PulseBroadcaster`](crate::PulseBroadcaster).
    PublishPulse { pulse: Pulse },

    // ═══════════════════════════════════════════════════════════════════════
    // Notifications (observability only, no I/O required)
    // ═══════════════════════════════════════════════════════════════════════
    /// A round failed and its pulse number is spent.
    RoundAborted {
        pulse_number: PulseNumber,
        cause: AbortCause,
    },

    /// An inbound envelope was discarded.
    EnvelopeDropped { from: PublicKey, reason: DropReason },

    /// This pulsar can no longer take part and must stop.
    Halt { reason: String },
}

impl Action {
    /// Check if this action performs network I/O.
    pub fn is_network(&self) -> bool {
        matches!(self, Action::Broadcast { .. } | Action::SendTo { .. })
    }

    /// Check if this action is a timer operation.
    pub fn is_timer(&self) -> bool {
        matches!(self, Action::SetTimer { .. } | Action::CancelTimer { .. })
    }

    /// Check if this action only reports something that happened.
    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            Action::RoundAborted { .. } | Action::EnvelopeDropped { .. }
        )
    }

    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SendTo { .. } => "SendTo",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::PublishPulse { .. } => "PublishPulse",
            Action::RoundAborted { .. } => "RoundAborted",
            Action::EnvelopeDropped { .. } => "EnvelopeDropped",
            Action::Halt { .. } => "Halt",
        }
    }
}
