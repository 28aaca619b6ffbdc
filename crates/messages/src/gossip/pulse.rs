//! Pulse announcement payload.

use pulsar_types::Pulse;
use sbor::prelude::BasicSbor;

/// Announcement of a finalized pulse.
///
/// Sent once when the sender finalizes, carrying its own endorsement and any
/// it already holds, and again on publish with the full endorsement set.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct PulsePayload {
    /// The pulse this pulsar published.
    pub pulse: Pulse,
}

impl PulsePayload {
    /// Create a new pulse announcement.
    pub fn new(pulse: Pulse) -> Self {
        Self { pulse }
    }

    /// Consume and return the inner pulse.
    pub fn into_pulse(self) -> Pulse {
        self.pulse
    }
}
