//! Two-phase commit/reveal exchange for a single round.
//!
//! Commitments are signatures over `entropy_commit_message(round, entropy)`;
//! the entropy itself only travels in the reveal phase. A reveal is
//! accepted only when it verifies against the sender's stored commitment.
//! A failed reveal excludes that pulsar from the vector, never the round.
//!
//! Once the vector is combined, each contributor endorses the result by
//! signing `pulse_message(round, combined)`. The pulse only publishes with
//! a quorum of matching endorsements.

use crate::assembler::PulseAssembler;
use crate::round_state::{Phase, RoundState};
use pulsar_core::{AbortCause, DropReason};
use pulsar_types::{
    entropy_commit_message, pulse_message, Entropy, Pulse, PulseNumber, PulsarId, Roster,
    Signature, Vector,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Result of a reveal that was not dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Verified and added to the vector.
    Accepted,
    /// Arrived during the commit phase; checked when the reveal phase opens.
    Parked,
    /// Identical to an already accepted reveal.
    Duplicate,
}

/// Drives one round from `Committing` through `Endorsing`.
#[derive(Debug)]
pub struct CommitRevealEngine {
    state: RoundState,
    local: PulsarId,
    local_entropy: Entropy,
}

impl CommitRevealEngine {
    /// Open a round with our own commitment already recorded.
    pub fn open(
        pulse_number: PulseNumber,
        roster: Arc<Roster>,
        local: PulsarId,
        local_entropy: Entropy,
        local_commitment: Signature,
        deadline: Duration,
    ) -> Self {
        let mut state = RoundState::new(pulse_number, roster, deadline);
        state.record_commitment(local, local_commitment);
        Self {
            state,
            local,
            local_entropy,
        }
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    pub fn pulse_number(&self) -> PulseNumber {
        self.state.pulse_number()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn local_entropy(&self) -> &Entropy {
        &self.local_entropy
    }

    /// Record a peer's commitment.
    ///
    /// Returns `true` if it replaced an earlier commitment from the same
    /// pulsar. Commitments are only taken while the commit window is open;
    /// accepting one later would let a pulsar choose its entropy after
    /// seeing reveals.
    pub fn on_commitment(
        &mut self,
        from: PulsarId,
        signature: Signature,
    ) -> Result<bool, DropReason> {
        if !self.state.roster().contains(from) {
            return Err(DropReason::UnauthorizedPeer);
        }
        match self.state.phase() {
            Phase::Committing => {}
            Phase::Revealing => return Err(DropReason::CommitWindowClosed),
            _ => return Err(DropReason::UnexpectedPhase),
        }

        let replaced = self.state.record_commitment(from, signature);
        if replaced {
            debug!(
                pulse_number = %self.pulse_number(),
                pulsar = %from,
                "Commitment replaced"
            );
        } else {
            trace!(
                pulse_number = %self.pulse_number(),
                pulsar = %from,
                commitments = self.state.commitments().len(),
                "Commitment recorded"
            );
        }
        Ok(replaced)
    }

    /// Handle a peer's reveal.
    pub fn on_reveal(
        &mut self,
        from: PulsarId,
        entropy: Entropy,
    ) -> Result<RevealOutcome, DropReason> {
        if !self.state.roster().contains(from) {
            return Err(DropReason::UnauthorizedPeer);
        }
        match self.state.phase() {
            Phase::Committing => {
                self.state.park_reveal(from, entropy);
                trace!(pulse_number = %self.pulse_number(), pulsar = %from, "Reveal parked");
                Ok(RevealOutcome::Parked)
            }
            Phase::Revealing => {
                if self.state.excluded().contains(&from) {
                    return Err(DropReason::RevealMismatch);
                }
                if self.state.reveals().get(&from) == Some(&entropy) {
                    return Ok(RevealOutcome::Duplicate);
                }
                self.check_and_accept(from, entropy)?;
                Ok(RevealOutcome::Accepted)
            }
            _ => Err(DropReason::UnexpectedPhase),
        }
    }

    /// Check whether commitments have reached quorum.
    pub fn has_commit_quorum(&self) -> bool {
        self.state
            .roster()
            .has_quorum(self.state.commitments().len())
    }

    /// Check whether the commit phase can end before its deadline.
    ///
    /// Quorum alone is not enough: every roster pulsar not known to be down
    /// must have committed too, so honest pulsars close the window over the
    /// same set of commitments.
    pub fn commits_complete(&self, down: &BTreeSet<PulsarId>) -> bool {
        if self.state.phase() != Phase::Committing || !self.has_commit_quorum() {
            return false;
        }
        let commitments = self.state.commitments();
        self.state
            .roster()
            .ids()
            .filter(|pulsar| !down.contains(pulsar))
            .all(|pulsar| commitments.contains_key(&pulsar))
    }

    /// Close the commit window and open the reveal phase.
    ///
    /// Our own reveal is accepted and every parked reveal is checked against
    /// the final commitments. Returns the pulsars whose parked reveal was
    /// rejected.
    pub fn open_reveal(&mut self, deadline: Duration) -> Vec<(PulsarId, DropReason)> {
        self.state.transition(Phase::Revealing, deadline);
        self.state.accept_reveal(self.local, self.local_entropy);

        let mut rejected = Vec::new();
        for (pulsar, entropy) in self.state.take_parked() {
            if pulsar == self.local {
                continue;
            }
            if let Err(reason) = self.check_and_accept(pulsar, entropy) {
                rejected.push((pulsar, reason));
            }
        }

        debug!(
            pulse_number = %self.pulse_number(),
            commitments = self.state.commitments().len(),
            reveals = self.state.reveals().len(),
            "Reveal phase opened"
        );
        rejected
    }

    /// Check whether waiting longer cannot change the outcome.
    ///
    /// True once the vector has quorum and every committed pulsar that is
    /// not known to be down has either revealed or been excluded.
    pub fn is_complete(&self, down: &BTreeSet<PulsarId>) -> bool {
        if self.state.phase() != Phase::Revealing {
            return false;
        }
        if !self.state.roster().has_quorum(self.state.reveals().len()) {
            return false;
        }
        self.state
            .commitments()
            .keys()
            .filter(|pulsar| !down.contains(pulsar))
            .all(|pulsar| self.state.is_resolved(*pulsar))
    }

    /// Close the reveal phase and hand over the vector if it has quorum.
    pub fn finish(&mut self, now: Duration) -> Result<Vector, AbortCause> {
        self.state.transition(Phase::Aggregating, now);

        let vector = self.state.vector();
        let required = self.state.roster().quorum();
        if vector.len() >= required {
            return Ok(vector);
        }

        self.state.transition(Phase::Aborted, now);
        Err(AbortCause::QuorumNotReached {
            collected: vector.len(),
            required,
        })
    }

    /// Record our own endorsement of the combined entropy and start
    /// collecting everyone else's.
    pub fn begin_endorsing(
        &mut self,
        combined: Entropy,
        local_endorsement: Signature,
        deadline: Duration,
    ) {
        self.state.transition(Phase::Finalizing, deadline);
        self.state.set_combined(combined);
        self.state
            .record_endorsement(self.local, combined, local_endorsement);
        self.state.transition(Phase::Endorsing, deadline);

        debug!(
            pulse_number = %self.pulse_number(),
            entropy = %combined.digest(),
            endorsers = self.state.endorsers().len(),
            "Collecting endorsements"
        );
    }

    /// Take the endorsements carried by a peer's pulse for this round.
    ///
    /// Each one must verify over the pulse's own entropy; one bad signature
    /// rejects the whole announcement. Endorsements of other entropy are
    /// kept too, they settle that pulsar without counting towards quorum.
    pub fn on_endorsements(&mut self, pulse: &Pulse) -> Result<(), DropReason> {
        if pulse.number != self.pulse_number() {
            return Err(DropReason::UnexpectedPhase);
        }
        match self.state.phase() {
            Phase::Committing | Phase::Revealing | Phase::Endorsing => {}
            _ => return Err(DropReason::UnexpectedPhase),
        }

        let message = pulse_message(pulse.number, &pulse.entropy);
        for (pulsar, signature) in &pulse.signatures {
            let verified = self
                .state
                .roster()
                .public_key(*pulsar)
                .is_some_and(|key| key.verify(&message, signature));
            if !verified {
                warn!(
                    pulse_number = %self.pulse_number(),
                    pulsar = %pulsar,
                    "Endorsement does not verify"
                );
                return Err(DropReason::InvalidEndorsement);
            }
        }

        for (pulsar, signature) in &pulse.signatures {
            if *pulsar != self.local {
                self.state
                    .record_endorsement(*pulsar, pulse.entropy, signature.clone());
            }
        }
        trace!(
            pulse_number = %self.pulse_number(),
            endorsements = self.state.endorsements().len(),
            "Endorsements recorded"
        );
        Ok(())
    }

    /// Check whether waiting longer for endorsements cannot change the
    /// outcome: quorum is met and every live contributor has endorsed
    /// something.
    pub fn endorsements_complete(&self, down: &BTreeSet<PulsarId>) -> bool {
        if self.state.phase() != Phase::Endorsing {
            return false;
        }
        if !self.state.roster().has_quorum(self.state.endorsers().len()) {
            return false;
        }
        let endorsements = self.state.endorsements();
        self.state
            .reveals()
            .keys()
            .filter(|pulsar| !down.contains(pulsar))
            .all(|pulsar| endorsements.contains_key(pulsar))
    }

    /// Close endorsement collection and assemble the pulse if a quorum of
    /// contributors endorsed our entropy.
    pub fn conclude(&mut self, now: Duration) -> Result<Pulse, AbortCause> {
        let endorsers = self.state.endorsers();
        let required = self.state.roster().quorum();
        match self.state.combined() {
            Some(combined) if endorsers.len() >= required => Ok(PulseAssembler::assemble(
                self.pulse_number(),
                *combined,
                &self.state.vector(),
                &endorsers,
            )),
            _ => {
                self.state.transition(Phase::Aborted, now);
                Err(AbortCause::EndorsementsMissing {
                    collected: endorsers.len(),
                    required,
                })
            }
        }
    }

    fn check_and_accept(&mut self, from: PulsarId, entropy: Entropy) -> Result<(), DropReason> {
        let Some(signature) = self.state.commitments().get(&from) else {
            return Err(DropReason::MissingCommitment);
        };
        let Some(public_key) = self.state.roster().public_key(from) else {
            return Err(DropReason::UnauthorizedPeer);
        };

        let message = entropy_commit_message(self.pulse_number(), &entropy);
        if !public_key.verify(&message, signature) {
            warn!(
                pulse_number = %self.pulse_number(),
                pulsar = %from,
                "Reveal does not match commitment, excluding pulsar"
            );
            self.state.exclude(from);
            return Err(DropReason::RevealMismatch);
        }

        self.state.accept_reveal(from, entropy);
        trace!(
            pulse_number = %self.pulse_number(),
            pulsar = %from,
            reveals = self.state.reveals().len(),
            "Reveal accepted"
        );
        Ok(())
    }
}
