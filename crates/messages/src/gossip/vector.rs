//! Vector cross-check payload.

use pulsar_types::{PulseNumber, Vector};
use sbor::prelude::BasicSbor;

/// The sender's verified contributions for a finalized round.
///
/// Optional: lets peers detect when they finalized over different vectors.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct VectorPayload {
    /// Round the vector was collected for.
    pub pulse_number: PulseNumber,

    /// Contributions keyed by pulsar.
    pub vector: Vector,
}

impl VectorPayload {
    /// Create a new vector payload.
    pub fn new(pulse_number: PulseNumber, vector: Vector) -> Self {
        Self {
            pulse_number,
            vector,
        }
    }
}
