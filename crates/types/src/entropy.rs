//! Entropy: the protocol's core output.

use crate::Hash;
use sbor::prelude::*;
use std::fmt;

/// A fixed-size random value.
///
/// Each pulsar contributes one per round; the combined value is published in
/// the pulse as shared, unbiasable randomness.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct Entropy([u8; 64]);

impl Entropy {
    /// Size of entropy in bytes.
    pub const BYTES: usize = 64;

    /// All-zero entropy. Sent in handshakes before any pulse is known.
    pub const ZERO: Self = Self([0u8; 64]);

    /// Wrap raw entropy bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get bytes as slice reference.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Check if this is the zero entropy.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Short digest for logging and comparisons.
    pub fn digest(&self) -> Hash {
        Hash::from_bytes(&self.0)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Entropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Entropy({}..{})", &hex[..8], &hex[120..])
    }
}
