//! Round timing configuration.

use std::time::Duration;

/// Configuration for the round coordinator.
#[derive(Debug, Clone)]
pub struct PulsarConfig {
    /// How long the commit phase waits for a quorum of commitments.
    pub commit_timeout: Duration,

    /// How long the reveal phase waits for reveals.
    pub reveal_timeout: Duration,

    /// How long a finalized round waits for peers to endorse its pulse.
    pub endorse_timeout: Duration,

    /// Delay between publishing a pulse and opening the next round.
    pub pulse_interval: Duration,

    /// Delay between an aborted round and the next attempt.
    pub retry_delay: Duration,

    /// Delay before the very first round after startup.
    pub first_round_delay: Duration,

    /// Broadcast the round's vector after publishing so peers can
    /// cross-check the combined entropy.
    pub broadcast_vector: bool,
}

impl Default for PulsarConfig {
    fn default() -> Self {
        Self {
            commit_timeout: Duration::from_secs(2),
            reveal_timeout: Duration::from_secs(2),
            endorse_timeout: Duration::from_secs(2),
            pulse_interval: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
            first_round_delay: Duration::from_secs(1),
            broadcast_vector: true,
        }
    }
}

impl PulsarConfig {
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    pub fn with_reveal_timeout(mut self, timeout: Duration) -> Self {
        self.reveal_timeout = timeout;
        self
    }

    pub fn with_endorse_timeout(mut self, timeout: Duration) -> Self {
        self.endorse_timeout = timeout;
        self
    }

    pub fn with_pulse_interval(mut self, interval: Duration) -> Self {
        self.pulse_interval = interval;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_first_round_delay(mut self, delay: Duration) -> Self {
        self.first_round_delay = delay;
        self
    }

    pub fn with_broadcast_vector(mut self, enabled: bool) -> Self {
        self.broadcast_vector = enabled;
        self
    }

}
