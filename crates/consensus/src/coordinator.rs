//! Round coordinator state machine.
//!
//! Orchestrates one round at a time. The commit phase ends at its deadline,
//! or early once every live pulsar has committed; the reveal phase ends at
//! its deadline, or early once every live committer is resolved. The
//! combined entropy is then endorsed, and the pulse publishes once a quorum
//! of contributors endorsed the same value.
//!
//! ```text
//! Idle ─▶ Committing ─▶ Revealing ─▶ Aggregating ─▶ Finalizing ─▶ Endorsing ─▶ Idle
//!                                        │                            │
//!                                        └─────────▶ Aborted ◀────────┘
//!                                                       └──────▶ Idle
//! ```
//!
//! Every round consumes its pulse number, published or not. Joiners are
//! only ever answered from the last published pulse.

use crate::aggregator::VectorAggregator;
use crate::assembler::{verify_pulse, PulseAssembler, PulseVerifyError};
use crate::commit_reveal::{CommitRevealEngine, RevealOutcome};
use crate::config::PulsarConfig;
use crate::entropy::EntropyGenerator;
use crate::round_state::Phase;
use pulsar_core::{AbortCause, Action, DropReason, Event, StateMachine, TimerId};
use pulsar_messages::{
    CodecError, EntropyPayload, EntropySignaturePayload, Envelope, GetLastPulsePayload,
    HandshakePayload, PayloadBody, PulsePayload, VectorPayload,
};
use pulsar_types::{
    entropy_commit_message, pulse_message, Entropy, NetworkCoordinator, PublicKey, Pulse,
    PulsarSigner, PulseNumber, PulsarId, Vector,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Coordinator statistics for monitoring.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoordinatorStats {
    pub rounds_opened: u64,
    pub pulses_published: u64,
    pub rounds_aborted: u64,
    pub envelopes_dropped: u64,
    /// Peer announcements matching our own pulse.
    pub announcements_agreed: u64,
    /// Peer announcements with different entropy for our pulse number.
    pub announcements_diverged: u64,
}

/// Which half of the commit/reveal exchange a round message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum RoundMessageKind {
    Commit,
    Reveal,
}

impl RoundMessageKind {
    fn of(body: &PayloadBody) -> Option<Self> {
        match body {
            PayloadBody::EntropySignature(_) => Some(Self::Commit),
            PayloadBody::Entropy(_) => Some(Self::Reveal),
            _ => None,
        }
    }
}

/// A round message that arrived for the next pulse number.
#[derive(Debug)]
struct DeferredMessage {
    public_key: PublicKey,
    body: PayloadBody,
}

/// The top-level, long-lived pulsar state machine.
pub struct RoundCoordinator {
    // ═══════════════════════════════════════════════════════════════════════════
    // Identity
    // ═══════════════════════════════════════════════════════════════════════════
    signer: Box<dyn PulsarSigner>,
    public_key: PublicKey,
    network: Arc<dyn NetworkCoordinator>,

    // ═══════════════════════════════════════════════════════════════════════════
    // Configuration
    // ═══════════════════════════════════════════════════════════════════════════
    config: PulsarConfig,
    entropy: Box<dyn EntropyGenerator>,

    // ═══════════════════════════════════════════════════════════════════════════
    // Round state
    // ═══════════════════════════════════════════════════════════════════════════
    /// Number the next round will open with. While a round is open this is
    /// its number plus one.
    next_pulse_number: PulseNumber,
    round: Option<CommitRevealEngine>,
    last_pulse: Option<Pulse>,
    /// At most one commitment and one reveal per sender; later copies
    /// replace earlier ones.
    deferred: BTreeMap<(PulsarId, RoundMessageKind), DeferredMessage>,
    /// Peers the transport reported as down.
    down: BTreeSet<PulsarId>,

    halted: bool,
    now: Duration,
    stats: CoordinatorStats,
}

impl std::fmt::Debug for RoundCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundCoordinator")
            .field("public_key", &self.public_key)
            .field("next_pulse_number", &self.next_pulse_number)
            .field("phase", &self.phase())
            .field("halted", &self.halted)
            .finish()
    }
}

impl RoundCoordinator {
    /// Create a coordinator that will open pulse number 1 first.
    pub fn new(
        signer: impl PulsarSigner + 'static,
        network: Arc<dyn NetworkCoordinator>,
        entropy: Box<dyn EntropyGenerator>,
        config: PulsarConfig,
    ) -> Self {
        let public_key = signer.public_key();
        Self {
            signer: Box::new(signer),
            public_key,
            network,
            config,
            entropy,
            next_pulse_number: PulseNumber::FIRST,
            round: None,
            last_pulse: None,
            deferred: BTreeMap::new(),
            down: BTreeSet::new(),
            halted: false,
            now: Duration::ZERO,
            stats: CoordinatorStats::default(),
        }
    }

    /// Actions to run once at startup: schedules the first round.
    pub fn start(&self) -> Vec<Action> {
        vec![Action::SetTimer {
            id: TimerId::NextRound,
            duration: self.config.first_round_delay,
        }]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn phase(&self) -> Phase {
        self.round.as_ref().map_or(Phase::Idle, |r| r.phase())
    }

    pub fn next_pulse_number(&self) -> PulseNumber {
        self.next_pulse_number
    }

    pub fn current_round(&self) -> Option<&CommitRevealEngine> {
        self.round.as_ref()
    }

    /// The last pulse this pulsar published.
    pub fn last_pulse(&self) -> Option<&Pulse> {
        self.last_pulse.as_ref()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn config(&self) -> &PulsarConfig {
        &self.config
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Round lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_round_timer(&mut self) -> Vec<Action> {
        if let Some(round) = &self.round {
            debug!(
                pulse_number = %round.pulse_number(),
                "Round timer fired while a round is open"
            );
            return vec![];
        }

        let pulse_number = self.next_pulse_number;
        let Some(next) = pulse_number.next() else {
            return vec![self.halt(format!("pulse number {} is the last one", pulse_number))];
        };
        self.next_pulse_number = next;

        let roster = self.network.roster();
        let Some(local) = roster.pulsar_for_key(&self.public_key) else {
            self.deferred.clear();
            return self.abort(pulse_number, AbortCause::NotInRoster);
        };

        let entropy = self.entropy.generate(pulse_number);
        let commitment = match self
            .signer
            .try_sign(&entropy_commit_message(pulse_number, &entropy))
        {
            Ok(signature) => signature,
            Err(e) => return vec![self.halt(format!("cannot commit to {}: {}", pulse_number, e))],
        };
        let body = PayloadBody::EntropySignature(EntropySignaturePayload::new(
            pulse_number,
            commitment.clone(),
        ));
        let envelope = match self.wrap(&body) {
            Ok(envelope) => envelope,
            Err(halt) => return vec![halt],
        };

        let deadline = self.now + self.config.commit_timeout;
        self.round = Some(CommitRevealEngine::open(
            pulse_number,
            roster,
            local,
            entropy,
            commitment,
            deadline,
        ));
        self.stats.rounds_opened += 1;
        info!(pulse_number = %pulse_number, pulsar = %local, "Round opened");

        let mut actions = vec![
            Action::Broadcast { envelope },
            Action::SetTimer {
                id: TimerId::CommitPhase(pulse_number),
                duration: self.config.commit_timeout,
            },
        ];
        actions.extend(self.replay_deferred(pulse_number));
        actions.extend(self.maybe_open_reveal());
        actions
    }

    /// Check whether the open round is `pulse_number` and sits in `phase`.
    fn is_current(&self, pulse_number: PulseNumber, phase: Phase) -> bool {
        self.round
            .as_ref()
            .is_some_and(|round| round.pulse_number() == pulse_number && round.phase() == phase)
    }

    fn on_commit_deadline(&mut self, pulse_number: PulseNumber) -> Vec<Action> {
        if !self.is_current(pulse_number, Phase::Committing) {
            trace!(pulse_number = %pulse_number, "Stale commit deadline");
            return vec![];
        }
        debug!(
            pulse_number = %pulse_number,
            commitments = self
                .round
                .as_ref()
                .map_or(0, |r| r.state().commitments().len()),
            "Commit deadline reached"
        );
        self.open_reveal_phase()
    }

    fn on_reveal_deadline(&mut self, pulse_number: PulseNumber) -> Vec<Action> {
        if !self.is_current(pulse_number, Phase::Revealing) {
            trace!(pulse_number = %pulse_number, "Stale reveal deadline");
            return vec![];
        }
        self.conclude_round()
    }

    fn on_endorse_deadline(&mut self, pulse_number: PulseNumber) -> Vec<Action> {
        if !self.is_current(pulse_number, Phase::Endorsing) {
            trace!(pulse_number = %pulse_number, "Stale endorse deadline");
            return vec![];
        }
        self.conclude_endorsing()
    }

    fn maybe_open_reveal(&mut self) -> Vec<Action> {
        match &self.round {
            Some(round) if round.commits_complete(&self.down) => self.open_reveal_phase(),
            _ => vec![],
        }
    }

    fn open_reveal_phase(&mut self) -> Vec<Action> {
        let (pulse_number, entropy) = match &self.round {
            Some(round) if round.phase() == Phase::Committing => {
                (round.pulse_number(), *round.local_entropy())
            }
            _ => return vec![],
        };

        let body = PayloadBody::Entropy(EntropyPayload::new(pulse_number, entropy));
        let envelope = match self.wrap(&body) {
            Ok(envelope) => envelope,
            Err(halt) => return vec![halt],
        };

        let deadline = self.now + self.config.reveal_timeout;
        let Some(round) = self.round.as_mut() else {
            return vec![];
        };
        let rejected: Vec<(PublicKey, DropReason)> = round
            .open_reveal(deadline)
            .into_iter()
            .filter_map(|(pulsar, reason)| {
                round
                    .state()
                    .roster()
                    .public_key(pulsar)
                    .cloned()
                    .map(|key| (key, reason))
            })
            .collect();

        let mut actions = vec![
            Action::CancelTimer {
                id: TimerId::CommitPhase(pulse_number),
            },
            Action::Broadcast { envelope },
            Action::SetTimer {
                id: TimerId::RevealPhase(pulse_number),
                duration: self.config.reveal_timeout,
            },
        ];
        for (key, reason) in rejected {
            actions.push(self.dropped(key, reason));
        }
        actions.extend(self.maybe_conclude());
        actions
    }

    fn maybe_conclude(&mut self) -> Vec<Action> {
        match &self.round {
            Some(round) if round.is_complete(&self.down) => {
                debug!(pulse_number = %round.pulse_number(), "All live contributors resolved");
                self.conclude_round()
            }
            _ => vec![],
        }
    }

    /// Close the reveal phase: finalize the vector, or abort below quorum.
    fn conclude_round(&mut self) -> Vec<Action> {
        let Some(round) = self.round.as_mut() else {
            return vec![];
        };
        let pulse_number = round.pulse_number();

        let mut actions = vec![Action::CancelTimer {
            id: TimerId::RevealPhase(pulse_number),
        }];
        match round.finish(self.now) {
            Ok(vector) => actions.extend(self.finalize(pulse_number, &vector)),
            Err(cause) => {
                self.round = None;
                actions.extend(self.abort(pulse_number, cause));
            }
        }
        actions
    }

    /// Combine the vector, endorse the result and announce it.
    fn finalize(&mut self, pulse_number: PulseNumber, vector: &Vector) -> Vec<Action> {
        let entropy = VectorAggregator::combine(vector);
        let endorsement = match self.signer.try_sign(&pulse_message(pulse_number, &entropy)) {
            Ok(signature) => signature,
            Err(e) => return vec![self.halt(format!("cannot endorse {}: {}", pulse_number, e))],
        };

        let deadline = self.now + self.config.endorse_timeout;
        let Some(round) = self.round.as_mut() else {
            return vec![];
        };
        round.begin_endorsing(entropy, endorsement, deadline);
        let endorsed =
            PulseAssembler::assemble(pulse_number, entropy, vector, &round.state().endorsers());

        let body = PayloadBody::PulseAnnounce(PulsePayload::new(endorsed));
        let envelope = match self.wrap(&body) {
            Ok(envelope) => envelope,
            Err(halt) => return vec![halt],
        };
        let mut actions = vec![
            Action::Broadcast { envelope },
            Action::SetTimer {
                id: TimerId::EndorsePhase(pulse_number),
                duration: self.config.endorse_timeout,
            },
        ];
        actions.extend(self.maybe_publish());
        actions
    }

    fn maybe_publish(&mut self) -> Vec<Action> {
        match &self.round {
            Some(round) if round.endorsements_complete(&self.down) => {
                debug!(pulse_number = %round.pulse_number(), "All live contributors endorsed");
                self.conclude_endorsing()
            }
            _ => vec![],
        }
    }

    fn conclude_endorsing(&mut self) -> Vec<Action> {
        let Some(mut round) = self.round.take() else {
            return vec![];
        };
        let pulse_number = round.pulse_number();

        let mut actions = vec![Action::CancelTimer {
            id: TimerId::EndorsePhase(pulse_number),
        }];
        match round.conclude(self.now) {
            Ok(pulse) => actions.extend(self.publish(pulse, round.state().vector())),
            Err(cause) => actions.extend(self.abort(pulse_number, cause)),
        }
        actions
    }

    fn publish(&mut self, pulse: Pulse, vector: Vector) -> Vec<Action> {
        let announce = PayloadBody::PulseAnnounce(PulsePayload::new(pulse.clone()));
        let announce = match self.wrap(&announce) {
            Ok(envelope) => envelope,
            Err(halt) => return vec![halt],
        };

        info!(
            pulse_number = %pulse.number,
            endorsers = pulse.signatures.len(),
            entropy = %pulse.entropy.digest(),
            "Pulse published"
        );
        self.last_pulse = Some(pulse.clone());
        self.stats.pulses_published += 1;

        let mut actions = vec![
            Action::PublishPulse {
                pulse: pulse.clone(),
            },
            Action::Broadcast { envelope: announce },
        ];

        if self.config.broadcast_vector {
            let body = PayloadBody::Vector(VectorPayload::new(pulse.number, vector));
            match self.wrap(&body) {
                Ok(envelope) => actions.push(Action::Broadcast { envelope }),
                Err(halt) => return vec![halt],
            }
        }

        actions.push(Action::SetTimer {
            id: TimerId::NextRound,
            duration: self.config.pulse_interval,
        });
        actions
    }

    fn abort(&mut self, pulse_number: PulseNumber, cause: AbortCause) -> Vec<Action> {
        warn!(pulse_number = %pulse_number, cause = %cause, "Round aborted");
        self.stats.rounds_aborted += 1;
        vec![
            Action::RoundAborted {
                pulse_number,
                cause,
            },
            Action::SetTimer {
                id: TimerId::NextRound,
                duration: self.config.retry_delay,
            },
        ]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Inbound messages
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_envelope(&mut self, envelope: Envelope) -> Vec<Action> {
        let body = match envelope.unwrap() {
            Ok(body) => body,
            Err(CodecError::InvalidSignature) => {
                return vec![self.dropped(envelope.public_key, DropReason::InvalidSignature)]
            }
            Err(_) => return vec![self.dropped(envelope.public_key, DropReason::MalformedBody)],
        };

        let from = match self.network.authorize(&envelope.public_key) {
            Ok(pulsar) => pulsar,
            Err(_) => return vec![self.dropped(envelope.public_key, DropReason::UnauthorizedPeer)],
        };
        if envelope.public_key == self.public_key {
            return vec![];
        }

        trace!(pulsar = %from, body = body.type_name(), "Envelope received");
        match body {
            PayloadBody::Handshake(_) => self.answer_last_pulse(from),
            PayloadBody::GetLastPulse(GetLastPulsePayload { pulse: None }) => {
                self.answer_last_pulse(from)
            }
            PayloadBody::GetLastPulse(GetLastPulsePayload { pulse: Some(pulse) }) => {
                self.observe_remote_pulse(from, envelope.public_key, &pulse)
            }
            PayloadBody::EntropySignature(_) | PayloadBody::Entropy(_) => {
                self.route_round_message(from, envelope.public_key, body)
            }
            PayloadBody::Vector(payload) => self.cross_check_vector(from, payload),
            PayloadBody::PulseAnnounce(payload) => {
                self.on_pulse_announce(from, envelope.public_key, payload.into_pulse())
            }
        }
    }

    fn route_round_message(
        &mut self,
        from: PulsarId,
        public_key: PublicKey,
        body: PayloadBody,
    ) -> Vec<Action> {
        let (Some(pulse_number), Some(kind)) = (body.pulse_number(), RoundMessageKind::of(&body))
        else {
            return vec![];
        };

        if self
            .round
            .as_ref()
            .is_some_and(|round| round.pulse_number() == pulse_number)
        {
            return self.apply_round_message(from, public_key, body);
        }

        if pulse_number < self.next_pulse_number {
            return vec![self.dropped(public_key, DropReason::StaleRound)];
        }
        if pulse_number == self.next_pulse_number {
            trace!(pulsar = %from, pulse_number = %pulse_number, ?kind, "Deferring next-round message");
            self.deferred
                .insert((from, kind), DeferredMessage { public_key, body });
            return vec![];
        }
        vec![self.dropped(public_key, DropReason::FutureRound)]
    }

    fn apply_round_message(
        &mut self,
        from: PulsarId,
        public_key: PublicKey,
        body: PayloadBody,
    ) -> Vec<Action> {
        let Some(round) = self.round.as_mut() else {
            return vec![];
        };
        match body {
            PayloadBody::EntropySignature(payload) => {
                match round.on_commitment(from, payload.signature) {
                    Ok(_) => self.maybe_open_reveal(),
                    Err(reason) => vec![self.dropped(public_key, reason)],
                }
            }
            PayloadBody::Entropy(payload) => match round.on_reveal(from, payload.entropy) {
                Ok(RevealOutcome::Accepted) => self.maybe_conclude(),
                Ok(RevealOutcome::Parked | RevealOutcome::Duplicate) => vec![],
                Err(reason) => vec![self.dropped(public_key, reason)],
            },
            _ => vec![],
        }
    }

    fn replay_deferred(&mut self, pulse_number: PulseNumber) -> Vec<Action> {
        let deferred = std::mem::take(&mut self.deferred);
        if !deferred.is_empty() {
            debug!(
                pulse_number = %pulse_number,
                count = deferred.len(),
                "Replaying deferred messages"
            );
        }

        let mut actions = Vec::new();
        // Commitments sort ahead of reveals for each sender.
        for ((from, _), message) in deferred {
            if message.body.pulse_number() == Some(pulse_number) {
                actions.extend(self.apply_round_message(from, message.public_key, message.body));
            } else {
                actions.push(self.dropped(message.public_key, DropReason::StaleRound));
            }
        }
        actions
    }

    /// Answer a join or resync with the last published pulse.
    fn answer_last_pulse(&mut self, to: PulsarId) -> Vec<Action> {
        let Some(pulse) = self.last_pulse.clone() else {
            debug!(pulsar = %to, "No published pulse to answer with");
            return vec![];
        };
        let body = PayloadBody::GetLastPulse(GetLastPulsePayload::response(pulse));
        match self.wrap(&body) {
            Ok(envelope) => vec![Action::SendTo {
                pulsar: to,
                envelope,
            }],
            Err(halt) => vec![halt],
        }
    }

    /// Catch up with a peer that published further than we did.
    ///
    /// Only moves the next pulse number forward, only while idle, and only
    /// for a pulse carrying a quorum of valid endorsements. The pulse
    /// itself is never adopted as our own.
    fn observe_remote_pulse(
        &mut self,
        from: PulsarId,
        public_key: PublicKey,
        pulse: &Pulse,
    ) -> Vec<Action> {
        if pulse.number < self.next_pulse_number {
            trace!(pulsar = %from, pulse_number = %pulse.number, "Peer pulse is not ahead");
            return vec![];
        }
        if self.round.is_some() {
            debug!(
                pulsar = %from,
                pulse_number = %pulse.number,
                "Peer is ahead of the open round"
            );
            return vec![];
        }

        match verify_pulse(pulse, &self.network.roster()) {
            Ok(()) => {}
            Err(PulseVerifyError::BelowQuorum {
                collected,
                required,
            }) => {
                debug!(
                    pulsar = %from,
                    pulse_number = %pulse.number,
                    collected,
                    required,
                    "Peer pulse lacks a quorum of endorsements"
                );
                return vec![];
            }
            Err(e) => {
                warn!(
                    pulsar = %from,
                    pulse_number = %pulse.number,
                    error = %e,
                    "Ignoring pulse with a bad endorsement"
                );
                return vec![self.dropped(public_key, DropReason::InvalidEndorsement)];
            }
        }

        let Some(next) = pulse.number.next() else {
            warn!(pulsar = %from, pulse_number = %pulse.number, "Peer pulse has no successor");
            return vec![];
        };
        info!(
            pulsar = %from,
            from_number = %self.next_pulse_number,
            to_number = %next,
            "Fast-forwarding pulse number"
        );
        self.next_pulse_number = next;
        self.deferred.clear();
        vec![]
    }

    fn on_pulse_announce(
        &mut self,
        from: PulsarId,
        public_key: PublicKey,
        pulse: Pulse,
    ) -> Vec<Action> {
        if let Some(round) = self.round.as_mut() {
            if round.pulse_number() == pulse.number {
                if let Err(reason) = round.on_endorsements(&pulse) {
                    return vec![self.dropped(public_key, reason)];
                }
                let agreed = round.state().combined().map(|ours| ours == &pulse.entropy);
                if let Some(agreed) = agreed {
                    self.count_announcement(from, pulse.number, agreed);
                }
                return self.maybe_publish();
            }
        }

        if let Some(last) = &self.last_pulse {
            if last.number == pulse.number {
                let agreed = last.entropy == pulse.entropy;
                self.count_announcement(from, pulse.number, agreed);
                return vec![];
            }
        }
        self.observe_remote_pulse(from, public_key, &pulse)
    }

    fn count_announcement(&mut self, from: PulsarId, pulse_number: PulseNumber, agreed: bool) {
        if agreed {
            self.stats.announcements_agreed += 1;
            trace!(pulsar = %from, pulse_number = %pulse_number, "Peer pulse agrees");
        } else {
            self.stats.announcements_diverged += 1;
            warn!(
                pulsar = %from,
                pulse_number = %pulse_number,
                "Peer finalized different entropy"
            );
        }
    }

    fn cross_check_vector(&mut self, from: PulsarId, payload: VectorPayload) -> Vec<Action> {
        let Some(last) = &self.last_pulse else {
            return vec![];
        };
        if last.number != payload.pulse_number {
            trace!(
                pulsar = %from,
                pulse_number = %payload.pulse_number,
                "Vector is not for our last pulse"
            );
            return vec![];
        }

        if VectorAggregator::combine(&payload.vector) == last.entropy {
            debug!(pulsar = %from, pulse_number = %last.number, "Vector cross-check agrees");
        } else {
            let theirs: Vec<_> = payload.vector.pulsars().collect();
            let ours: Vec<_> = last.contributors().collect();
            warn!(
                pulsar = %from,
                pulse_number = %last.number,
                ?ours,
                ?theirs,
                "Vector cross-check diverges"
            );
        }
        vec![]
    }

    fn on_liveness(&mut self, pulsar: PulsarId, alive: bool) -> Vec<Action> {
        let changed = if alive {
            self.down.remove(&pulsar)
        } else {
            self.down.insert(pulsar)
        };
        if changed {
            debug!(pulsar = %pulsar, alive, "Peer liveness changed");
        }
        match self.phase() {
            Phase::Committing => self.maybe_open_reveal(),
            Phase::Revealing => self.maybe_conclude(),
            Phase::Endorsing => self.maybe_publish(),
            _ => vec![],
        }
    }

    fn on_join(&mut self) -> Vec<Action> {
        let entropy = self
            .last_pulse
            .as_ref()
            .map_or(Entropy::ZERO, |pulse| pulse.entropy);
        let body = PayloadBody::Handshake(HandshakePayload::new(entropy));
        match self.wrap(&body) {
            Ok(envelope) => {
                info!("Announcing to network");
                vec![Action::Broadcast { envelope }]
            }
            Err(halt) => vec![halt],
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════════

    /// Sign an outbound body. Failure means we cannot take part any more.
    fn wrap(&mut self, body: &PayloadBody) -> Result<Envelope, Action> {
        match Envelope::wrap(body, self.signer.as_ref()) {
            Ok(envelope) => Ok(envelope),
            Err(e) => Err(self.halt(format!("cannot sign {}: {}", body.type_name(), e))),
        }
    }

    fn halt(&mut self, reason: String) -> Action {
        error!(reason = %reason, "Halting pulsar");
        self.halted = true;
        self.round = None;
        Action::Halt { reason }
    }

    fn dropped(&mut self, from: PublicKey, reason: DropReason) -> Action {
        self.stats.envelopes_dropped += 1;
        debug!(peer = ?from, reason = %reason, "Envelope dropped");
        Action::EnvelopeDropped { from, reason }
    }
}

impl StateMachine for RoundCoordinator {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.halted {
            trace!(event = event.type_name(), "Ignoring event, pulsar halted");
            return vec![];
        }
        match event {
            Event::RoundTimer => self.on_round_timer(),
            Event::CommitDeadline { pulse_number } => self.on_commit_deadline(pulse_number),
            Event::RevealDeadline { pulse_number } => self.on_reveal_deadline(pulse_number),
            Event::EndorseDeadline { pulse_number } => self.on_endorse_deadline(pulse_number),
            Event::EnvelopeReceived { envelope } => self.on_envelope(envelope),
            Event::PeerLivenessChanged { pulsar, alive } => self.on_liveness(pulsar, alive),
            Event::JoinNetwork => self.on_join(),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}
