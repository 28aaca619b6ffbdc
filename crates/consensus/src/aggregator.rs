//! Deterministic combination of a round's contributions.

use pulsar_types::{Entropy, Vector};

/// Domain tag absorbed before any contribution.
const COMBINE_DOMAIN: &[u8] = b"pulsar_vector_combine:";

/// Combines verified contributions into the round's entropy.
pub struct VectorAggregator;

impl VectorAggregator {
    /// Combine a vector into a single entropy value.
    ///
    /// A blake3 fold over `(pulsar id, entropy)` in `PulsarId` order, read
    /// out through the XOF to the full entropy width. Depends only on the
    /// vector's contents: arrival order and commit signatures play no part.
    pub fn combine(vector: &Vector) -> Entropy {
        let mut hasher = blake3::Hasher::new();
        hasher.update(COMBINE_DOMAIN);
        hasher.update(&(vector.len() as u64).to_le_bytes());
        for (pulsar, cell) in vector.iter() {
            hasher.update(&pulsar.0.to_le_bytes());
            hasher.update(cell.entropy.as_bytes());
        }

        let mut out = [0u8; Entropy::BYTES];
        hasher.finalize_xof().fill(&mut out);
        Entropy::from_bytes(out)
    }
}
