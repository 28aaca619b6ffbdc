//! Domain-specific identifier types.

use sbor::prelude::*;
use std::fmt;

/// Pulsar identifier (position in the genesis roster).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct PulsarId(pub u64);

impl fmt::Display for PulsarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pulsar({})", self.0)
    }
}

/// Pulse number: the network's logical clock.
///
/// Every round is identified by the pulse number it is trying to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
#[sbor(transparent)]
pub struct PulseNumber(pub u64);

impl PulseNumber {
    /// Number of the first round a fresh network runs.
    pub const FIRST: Self = PulseNumber(1);

    /// Get the next pulse number, or `None` once the clock is exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(PulseNumber)
    }
}

impl fmt::Display for PulseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pulse({})", self.0)
    }
}

/// BFT quorum arithmetic over a roster of equally weighted pulsars.
pub struct Quorum;

impl Quorum {
    /// Minimum number of participants required: `⌈2n/3⌉`.
    ///
    /// Tolerates `⌊(n-1)/3⌋` faulty or silent pulsars.
    pub fn threshold(roster_size: usize) -> usize {
        (2 * roster_size).div_ceil(3)
    }

    /// Check whether `count` participants meet the quorum for `roster_size`.
    pub fn is_met(count: usize, roster_size: usize) -> bool {
        roster_size > 0 && count >= Self::threshold(roster_size)
    }
}
