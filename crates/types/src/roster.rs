//! Pulsar roster and the authorization oracle.

use crate::{Hash, PublicKey, PulsarId, Quorum};
use std::collections::HashMap;
use std::sync::Arc;

/// Information about a single pulsar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulsarInfo {
    /// Roster identifier.
    pub pulsar_id: PulsarId,
    /// Key the pulsar signs envelopes and commitments with.
    pub public_key: PublicKey,
}

/// The set of pulsars expected to take part in a round.
///
/// Read-mostly configuration; a round keeps an `Arc` snapshot so the set
/// cannot change underneath it.
#[derive(Debug, Clone)]
pub struct Roster {
    pulsars: Vec<PulsarInfo>,
    by_id: HashMap<PulsarId, usize>,
    by_key: HashMap<PublicKey, PulsarId>,
}

impl Roster {
    /// Build a roster. Pulsars are kept sorted by id; duplicate ids or keys
    /// are rejected.
    pub fn new(mut pulsars: Vec<PulsarInfo>) -> Result<Self, RosterError> {
        pulsars.sort_by_key(|p| p.pulsar_id);

        let mut by_id = HashMap::with_capacity(pulsars.len());
        let mut by_key = HashMap::with_capacity(pulsars.len());
        for (index, info) in pulsars.iter().enumerate() {
            if by_id.insert(info.pulsar_id, index).is_some() {
                return Err(RosterError::DuplicateId(info.pulsar_id));
            }
            if by_key
                .insert(info.public_key.clone(), info.pulsar_id)
                .is_some()
            {
                return Err(RosterError::DuplicateKey(info.pulsar_id));
            }
        }

        Ok(Self {
            pulsars,
            by_id,
            by_key,
        })
    }

    /// All pulsars, sorted by id.
    pub fn pulsars(&self) -> &[PulsarInfo] {
        &self.pulsars
    }

    /// Pulsar ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = PulsarId> + '_ {
        self.pulsars.iter().map(|p| p.pulsar_id)
    }

    /// Number of pulsars.
    pub fn len(&self) -> usize {
        self.pulsars.len()
    }

    /// Check if the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.pulsars.is_empty()
    }

    /// Minimum number of contributions for a round to finalize.
    pub fn quorum(&self) -> usize {
        Quorum::threshold(self.len())
    }

    /// Check whether `count` contributions meet the quorum.
    pub fn has_quorum(&self, count: usize) -> bool {
        Quorum::is_met(count, self.len())
    }

    /// Check if a pulsar is in the roster.
    pub fn contains(&self, pulsar_id: PulsarId) -> bool {
        self.by_id.contains_key(&pulsar_id)
    }

    /// Get the public key for a pulsar.
    pub fn public_key(&self, pulsar_id: PulsarId) -> Option<&PublicKey> {
        self.by_id
            .get(&pulsar_id)
            .map(|&index| &self.pulsars[index].public_key)
    }

    /// Look up which pulsar owns a key.
    pub fn pulsar_for_key(&self, public_key: &PublicKey) -> Option<PulsarId> {
        self.by_key.get(public_key).copied()
    }

    /// Digest of the roster membership, logged when a round opens so
    /// operators can spot pulsars running with different rosters.
    pub fn fingerprint(&self) -> Hash {
        let mut bytes = Vec::with_capacity(self.pulsars.len() * 40);
        for info in &self.pulsars {
            bytes.extend_from_slice(&info.pulsar_id.0.to_le_bytes());
            bytes.extend_from_slice(info.public_key.as_bytes());
        }
        Hash::from_bytes(&bytes)
    }
}

/// External oracle deciding which keys currently belong to authorized pulsars.
///
/// The consensus engine never owns registration state; it asks this oracle.
pub trait NetworkCoordinator: Send + Sync {
    /// Authorize a public key, returning the pulsar it belongs to.
    fn authorize(&self, public_key: &PublicKey) -> Result<PulsarId, RosterError>;

    /// Snapshot of the currently authorized roster.
    fn roster(&self) -> Arc<Roster>;
}

/// A coordinator backed by a fixed genesis roster.
#[derive(Debug, Clone)]
pub struct StaticNetworkCoordinator {
    roster: Arc<Roster>,
}

impl StaticNetworkCoordinator {
    /// Create a coordinator over a fixed roster.
    pub fn new(roster: Roster) -> Self {
        Self {
            roster: Arc::new(roster),
        }
    }
}

impl NetworkCoordinator for StaticNetworkCoordinator {
    fn authorize(&self, public_key: &PublicKey) -> Result<PulsarId, RosterError> {
        self.roster
            .pulsar_for_key(public_key)
            .ok_or(RosterError::UnknownKey)
    }

    fn roster(&self) -> Arc<Roster> {
        Arc::clone(&self.roster)
    }
}

/// Errors from roster construction and authorization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    /// Two entries share a pulsar id.
    #[error("duplicate pulsar id {0}")]
    DuplicateId(PulsarId),

    /// Two entries share a public key.
    #[error("duplicate public key for {0}")]
    DuplicateKey(PulsarId),

    /// The key does not belong to any authorized pulsar.
    #[error("public key is not an authorized pulsar")]
    UnknownKey,
}
