//! Local entropy sources.

use pulsar_types::{Entropy, PulseNumber};
use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Produces this pulsar's contribution for a round.
pub trait EntropyGenerator: Send {
    /// Fresh entropy for `pulse_number`. Never reused across rounds.
    fn generate(&mut self, pulse_number: PulseNumber) -> Entropy;
}

/// Entropy from the operating system's CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropyGenerator for OsEntropy {
    fn generate(&mut self, _pulse_number: PulseNumber) -> Entropy {
        let mut bytes = [0u8; Entropy::BYTES];
        OsRng.fill_bytes(&mut bytes);
        Entropy::from_bytes(bytes)
    }
}

/// Deterministic entropy for simulation and tests.
pub struct SeededEntropy {
    rng: ChaCha8Rng,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl EntropyGenerator for SeededEntropy {
    fn generate(&mut self, _pulse_number: PulseNumber) -> Entropy {
        let mut bytes = [0u8; Entropy::BYTES];
        self.rng.fill_bytes(&mut bytes);
        Entropy::from_bytes(bytes)
    }
}
