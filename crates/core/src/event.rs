//! Event types for the deterministic state machine.

use pulsar_messages::Envelope;
use pulsar_types::{PulsarId, PulseNumber};

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same simulation time are processed in priority order.
/// Lower values = higher priority (processed first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Operator commands and runner-originated control.
    Internal = 0,

    /// Timer events: scheduled by the pulsar itself.
    Timer = 1,

    /// Network events: external inputs from other pulsars.
    Network = 2,
}

/// All possible events a pulsar can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers (priority: Timer)
    // ═══════════════════════════════════════════════════════════════════════
    /// Time to open the next round.
    RoundTimer,

    /// The commit phase deadline of `pulse_number` elapsed.
    CommitDeadline { pulse_number: PulseNumber },

    /// The reveal phase deadline of `pulse_number` elapsed.
    RevealDeadline { pulse_number: PulseNumber },

    /// Endorsement collection for `pulse_number` timed out.
    EndorseDeadline { pulse_number: PulseNumber },

    // ═══════════════════════════════════════════════════════════════════════
    // Network (priority: Network)
    // ═══════════════════════════════════════════════════════════════════════
    /// A signed envelope arrived from the transport.
    ///
    /// The sender is whoever the embedded public key resolves to; nothing
    /// about the transport-level origin is trusted.
    EnvelopeReceived { envelope: Envelope },

    /// The transport reported a peer coming up or dropping out.
    PeerLivenessChanged { pulsar: PulsarId, alive: bool },

    // ═══════════════════════════════════════════════════════════════════════
    // Control (priority: Internal)
    // ═══════════════════════════════════════════════════════════════════════
    /// Announce ourselves and ask peers for their last published pulse.
    JoinNetwork,
}

impl Event {
    /// Get the priority for this event type.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::JoinNetwork => EventPriority::Internal,

            Event::RoundTimer
            | Event::CommitDeadline { .. }
            | Event::RevealDeadline { .. }
            | Event::EndorseDeadline { .. } => EventPriority::Timer,

            Event::EnvelopeReceived { .. } | Event::PeerLivenessChanged { .. } => {
                EventPriority::Network
            }
        }
    }

    /// Check if this is a timer event.
    pub fn is_timer(&self) -> bool {
        self.priority() == EventPriority::Timer
    }

    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::RoundTimer => "RoundTimer",
            Event::CommitDeadline { .. } => "CommitDeadline",
            Event::RevealDeadline { .. } => "RevealDeadline",
            Event::EndorseDeadline { .. } => "EndorseDeadline",
            Event::EnvelopeReceived { .. } => "EnvelopeReceived",
            Event::PeerLivenessChanged { .. } => "PeerLivenessChanged",
            Event::JoinNetwork => "JoinNetwork",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_order_control_before_timers_before_network() {
        assert!(EventPriority::Internal < EventPriority::Timer);
        assert!(EventPriority::Timer < EventPriority::Network);

        assert_eq!(Event::JoinNetwork.priority(), EventPriority::Internal);
        assert_eq!(
            Event::CommitDeadline {
                pulse_number: PulseNumber(1)
            }
            .priority(),
            EventPriority::Timer
        );
        assert_eq!(
            Event::PeerLivenessChanged {
                pulsar: PulsarId(1),
                alive: false
            }
            .priority(),
            EventPriority::Network
        );
    }

    #[test]
    fn test_timer_events() {
        assert!(Event::RoundTimer.is_timer());
        assert!(Event::RevealDeadline {
            pulse_number: PulseNumber(2)
        }
        .is_timer());
        assert!(Event::EndorseDeadline {
            pulse_number: PulseNumber(2)
        }
        .is_timer());
        assert!(!Event::JoinNetwork.is_timer());
    }
}
