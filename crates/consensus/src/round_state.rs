//! Per-round mutable record.

use pulsar_types::{BftCell, Entropy, PulseNumber, PulsarId, Roster, Signature, Vector};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Where a round (or the coordinator, between rounds) currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No round open.
    Idle,
    /// Collecting commitments.
    Committing,
    /// Collecting reveals.
    Revealing,
    /// Checking the vector against quorum and combining it.
    Aggregating,
    /// Combining the vector and signing our endorsement.
    Finalizing,
    /// Collecting peer endorsements of the combined entropy.
    Endorsing,
    /// The round failed; its number is spent.
    Aborted,
}

impl Phase {
    /// Check whether `next` may follow this phase.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Committing)
                | (Committing, Revealing)
                | (Revealing, Aggregating)
                | (Aggregating, Finalizing)
                | (Aggregating, Aborted)
                | (Finalizing, Endorsing)
                | (Endorsing, Idle)
                | (Endorsing, Aborted)
                | (Aborted, Idle)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State of a single round.
///
/// Created when a round opens and dropped when it publishes or aborts.
/// Invariant: every key of `reveals` is also a key of `commitments`, and
/// the revealed entropy verifies against that commitment. Every stored
/// endorsement verifies over `pulse_message(pulse_number, entropy)` for the
/// entropy stored next to it.
#[derive(Debug)]
pub struct RoundState {
    pulse_number: PulseNumber,
    phase: Phase,
    roster: Arc<Roster>,
    commitments: BTreeMap<PulsarId, Signature>,
    reveals: BTreeMap<PulsarId, Entropy>,
    /// Reveals received before the reveal phase opened, unverified.
    parked: BTreeMap<PulsarId, Entropy>,
    /// Pulsars whose reveal failed verification this round.
    excluded: BTreeSet<PulsarId>,
    /// Our combined entropy, once finalized.
    combined: Option<Entropy>,
    /// Latest verified endorsement per pulsar, with the entropy it signs.
    endorsements: BTreeMap<PulsarId, (Entropy, Signature)>,
    /// When the current phase times out.
    deadline: Duration,
}

impl RoundState {
    /// Open a round in the `Committing` phase.
    pub fn new(pulse_number: PulseNumber, roster: Arc<Roster>, deadline: Duration) -> Self {
        Self {
            pulse_number,
            phase: Phase::Committing,
            roster,
            commitments: BTreeMap::new(),
            reveals: BTreeMap::new(),
            parked: BTreeMap::new(),
            excluded: BTreeSet::new(),
            combined: None,
            endorsements: BTreeMap::new(),
            deadline,
        }
    }

    pub fn pulse_number(&self) -> PulseNumber {
        self.pulse_number
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn commitments(&self) -> &BTreeMap<PulsarId, Signature> {
        &self.commitments
    }

    pub fn reveals(&self) -> &BTreeMap<PulsarId, Entropy> {
        &self.reveals
    }

    pub fn excluded(&self) -> &BTreeSet<PulsarId> {
        &self.excluded
    }

    /// The combined entropy this pulsar endorsed, set on finalizing.
    pub fn combined(&self) -> Option<&Entropy> {
        self.combined.as_ref()
    }

    pub fn endorsements(&self) -> &BTreeMap<PulsarId, (Entropy, Signature)> {
        &self.endorsements
    }

    /// Move to `next`, setting a new deadline.
    ///
    /// # Panics
    ///
    /// Panics in debug builds on a transition the round lifecycle does not
    /// allow.
    pub(crate) fn transition(&mut self, next: Phase, deadline: Duration) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "invalid phase transition {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
        self.deadline = deadline;
    }

    /// Store a commitment, replacing any earlier one from the same pulsar.
    pub(crate) fn record_commitment(&mut self, pulsar: PulsarId, signature: Signature) -> bool {
        self.commitments.insert(pulsar, signature).is_some()
    }

    /// Park a reveal until the reveal phase opens.
    pub(crate) fn park_reveal(&mut self, pulsar: PulsarId, entropy: Entropy) {
        self.parked.insert(pulsar, entropy);
    }

    pub(crate) fn take_parked(&mut self) -> BTreeMap<PulsarId, Entropy> {
        std::mem::take(&mut self.parked)
    }

    /// Accept a reveal that has been verified against its commitment.
    pub(crate) fn accept_reveal(&mut self, pulsar: PulsarId, entropy: Entropy) {
        debug_assert!(self.commitments.contains_key(&pulsar));
        self.reveals.insert(pulsar, entropy);
    }

    /// Exclude a pulsar from the vector and forget its commitment.
    pub(crate) fn exclude(&mut self, pulsar: PulsarId) {
        self.commitments.remove(&pulsar);
        self.reveals.remove(&pulsar);
        self.excluded.insert(pulsar);
    }

    pub(crate) fn set_combined(&mut self, entropy: Entropy) {
        self.combined = Some(entropy);
    }

    /// Store a verified endorsement, replacing any earlier one from the
    /// same pulsar.
    pub(crate) fn record_endorsement(
        &mut self,
        pulsar: PulsarId,
        entropy: Entropy,
        signature: Signature,
    ) {
        self.endorsements.insert(pulsar, (entropy, signature));
    }

    /// Endorsements of our combined entropy from vector contributors.
    pub fn endorsers(&self) -> BTreeMap<PulsarId, Signature> {
        let Some(combined) = &self.combined else {
            return BTreeMap::new();
        };
        self.endorsements
            .iter()
            .filter(|(pulsar, (entropy, _))| {
                entropy == combined && self.reveals.contains_key(pulsar)
            })
            .map(|(pulsar, (_, signature))| (*pulsar, signature.clone()))
            .collect()
    }

    /// Check whether the pulsar's contribution is settled: accepted or
    /// excluded.
    pub fn is_resolved(&self, pulsar: PulsarId) -> bool {
        self.reveals.contains_key(&pulsar) || self.excluded.contains(&pulsar)
    }

    /// The verified contributions gathered so far.
    pub fn vector(&self) -> Vector {
        self.reveals
            .iter()
            .filter_map(|(pulsar, entropy)| {
                self.commitments.get(pulsar).map(|signature| {
                    (
                        *pulsar,
                        BftCell {
                            signature: signature.clone(),
                            entropy: *entropy,
                        },
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsar_test_helpers::{commit_signature, endorsement, test_entropy, TestPulsars};

    #[test]
    fn test_lifecycle_transitions() {
        assert!(Phase::Idle.can_transition_to(Phase::Committing));
        assert!(Phase::Committing.can_transition_to(Phase::Revealing));
        assert!(Phase::Aggregating.can_transition_to(Phase::Aborted));
        assert!(Phase::Finalizing.can_transition_to(Phase::Endorsing));
        assert!(Phase::Endorsing.can_transition_to(Phase::Aborted));
        assert!(Phase::Aborted.can_transition_to(Phase::Idle));

        assert!(!Phase::Finalizing.can_transition_to(Phase::Idle));
        assert!(!Phase::Committing.can_transition_to(Phase::Finalizing));
        assert!(!Phase::Revealing.can_transition_to(Phase::Committing));
        assert!(!Phase::Aborted.can_transition_to(Phase::Committing));
    }

    #[test]
    fn test_exclusion_removes_contribution() {
        let pulsars = TestPulsars::new(4, 9);
        let round = PulseNumber(1);
        let mut state = RoundState::new(round, Arc::clone(&pulsars.roster), Duration::ZERO);

        for i in 0..2 {
            let id = PulsarId(i);
            let entropy = test_entropy(i);
            state.record_commitment(id, commit_signature(pulsars.key(id), round, &entropy));
            state.accept_reveal(id, entropy);
        }
        assert_eq!(state.vector().len(), 2);

        state.exclude(PulsarId(1));

        let vector = state.vector();
        assert_eq!(vector.len(), 1);
        assert!(vector.contains(PulsarId(0)));
        assert!(state.is_resolved(PulsarId(1)));
        assert!(!state.commitments().contains_key(&PulsarId(1)));
    }

    #[test]
    fn test_second_commitment_overwrites() {
        let pulsars = TestPulsars::new(4, 9);
        let round = PulseNumber(1);
        let mut state = RoundState::new(round, Arc::clone(&pulsars.roster), Duration::ZERO);
        let id = PulsarId(2);

        let first = commit_signature(pulsars.key(id), round, &test_entropy(1));
        let second = commit_signature(pulsars.key(id), round, &test_entropy(2));

        assert!(!state.record_commitment(id, first));
        assert!(state.record_commitment(id, second.clone()));
        assert_eq!(state.commitments().get(&id), Some(&second));
    }

    #[test]
    fn test_endorsers_match_combined_entropy_and_contributors() {
        let pulsars = TestPulsars::new(4, 9);
        let round = PulseNumber(1);
        let mut state = RoundState::new(round, Arc::clone(&pulsars.roster), Duration::ZERO);
        for i in 0..3 {
            let id = PulsarId(i);
            let entropy = test_entropy(i);
            state.record_commitment(id, commit_signature(pulsars.key(id), round, &entropy));
            state.accept_reveal(id, entropy);
        }
        let combined = test_entropy(100);
        let other = test_entropy(101);
        for (i, entropy) in [(0, combined), (1, combined), (2, other), (3, combined)] {
            let id = PulsarId(i);
            state.record_endorsement(id, entropy, endorsement(pulsars.key(id), round, &entropy));
        }

        assert!(state.endorsers().is_empty());
        state.set_combined(combined);

        // 2 endorsed something else, 3 did not contribute.
        let endorsers: Vec<_> = state.endorsers().into_keys().collect();
        assert_eq!(endorsers, vec![PulsarId(0), PulsarId(1)]);
    }
}
