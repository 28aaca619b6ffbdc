//! Pulse and per-round contribution types.

use crate::{Entropy, PulseNumber, PulsarId, Signature};
use sbor::prelude::*;
use std::collections::BTreeMap;

/// A pulsar's verified contribution to a round.
///
/// The commit-phase signature paired with the revealed entropy. Together they
/// prove the pulsar fixed its value before seeing anyone else's.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct BftCell {
    /// Signature over `entropy_commit_message(pulse_number, entropy)`.
    pub signature: Signature,
    /// The revealed entropy.
    pub entropy: Entropy,
}

/// The verified contributions of one round, keyed by pulsar.
///
/// Backed by a `BTreeMap`, so iteration is always in `PulsarId` order no
/// matter in which order contributions arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq, BasicSbor)]
pub struct Vector {
    cells: BTreeMap<PulsarId, BftCell>,
}

impl Vector {
    /// Create an empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a contribution. Keys are unique; a second insert replaces the first.
    pub fn insert(&mut self, pulsar: PulsarId, cell: BftCell) {
        self.cells.insert(pulsar, cell);
    }

    /// Get a pulsar's contribution.
    pub fn get(&self, pulsar: PulsarId) -> Option<&BftCell> {
        self.cells.get(&pulsar)
    }

    /// Check whether a pulsar contributed.
    pub fn contains(&self, pulsar: PulsarId) -> bool {
        self.cells.contains_key(&pulsar)
    }

    /// Iterate over contributions in `PulsarId` order.
    pub fn iter(&self) -> impl Iterator<Item = (&PulsarId, &BftCell)> {
        self.cells.iter()
    }

    /// Contributing pulsars in `PulsarId` order.
    pub fn pulsars(&self) -> impl Iterator<Item = PulsarId> + '_ {
        self.cells.keys().copied()
    }

    /// Number of contributions.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(PulsarId, BftCell)> for Vector {
    fn from_iter<I: IntoIterator<Item = (PulsarId, BftCell)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

/// The agreed (number, entropy) pair published once per successful round.
///
/// Immutable once assembled. Each signature is a contributor's endorsement
/// over `pulse_message(number, entropy)`, so the pulse can be checked with
/// nothing but the roster.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Pulse {
    /// Strictly increasing across published pulses.
    pub number: PulseNumber,
    /// Combined entropy of all contributors.
    pub entropy: Entropy,
    /// Endorsement of every contributor that signed this exact pair.
    pub signatures: BTreeMap<PulsarId, Signature>,
}

impl Pulse {
    /// Pulsars that endorsed this pulse.
    pub fn contributors(&self) -> impl Iterator<Item = PulsarId> + '_ {
        self.signatures.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(byte: u8) -> BftCell {
        BftCell {
            signature: Signature::zero(),
            entropy: Entropy::from_bytes([byte; 64]),
        }
    }

    #[test]
    fn test_vector_iterates_in_id_order() {
        let mut vector = Vector::new();
        vector.insert(PulsarId(3), cell(3));
        vector.insert(PulsarId(1), cell(1));
        vector.insert(PulsarId(2), cell(2));

        let order: Vec<_> = vector.pulsars().collect();
        assert_eq!(order, vec![PulsarId(1), PulsarId(2), PulsarId(3)]);
    }

    #[test]
    fn test_vector_keys_unique() {
        let mut vector = Vector::new();
        vector.insert(PulsarId(1), cell(1));
        vector.insert(PulsarId(1), cell(9));

        assert_eq!(vector.len(), 1);
        assert_eq!(
            vector.get(PulsarId(1)).map(|c| c.entropy),
            Some(Entropy::from_bytes([9; 64]))
        );
    }
}
