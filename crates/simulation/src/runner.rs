//! Deterministic simulation runner.
//!
//! Every node is a [`RoundCoordinator`] with its own seeded entropy source.
//! Outbound envelopes pass through the node's [`PulsarBehavior`] before the
//! simulated network decides whether and when each copy arrives.

use crate::event_queue::EventKey;
use crate::fault::PulsarBehavior;
use crate::network::{NetworkConfig, SimulatedNetwork};
use crate::NodeIndex;
use pulsar_consensus::{PulsarConfig, RoundCoordinator, SeededEntropy};
use pulsar_core::{AbortCause, Action, Event, PulseBroadcaster, StateMachine, TimerId};
use pulsar_messages::Envelope;
use pulsar_types::{
    KeyPair, KeyType, NetworkCoordinator, Pulse, PulsarSigner, PulseNumber, PulsarId,
    PulsarInfo, Roster, RosterError, StaticNetworkCoordinator,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Errors building a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("simulation needs at least one pulsar")]
    NoPulsars,

    #[error("invalid roster: {0}")]
    Roster(#[from] RosterError),
}

/// Deterministic simulation runner.
///
/// Processes events in deterministic order and executes actions.
/// Given the same seed, produces identical results every run.
pub struct SimulationRunner {
    /// All nodes in the simulation, indexed by NodeIndex.
    nodes: Vec<RoundCoordinator>,

    /// Signing keys, used to re-sign envelopes for corrupting behaviors.
    keys: Vec<KeyPair>,

    behaviors: Vec<PulsarBehavior>,

    /// Pulses each node handed to its broadcaster, in order.
    published: Vec<Vec<Pulse>>,

    /// Rounds each node aborted.
    aborted: Vec<Vec<(PulseNumber, AbortCause)>>,

    halted: Vec<bool>,

    roster: Arc<Roster>,

    /// Shared by every node, and by nodes rebuilt with a new signer.
    coordinator: Arc<dyn NetworkCoordinator>,
    pulsar_config: PulsarConfig,
    seed: u64,

    /// Global event queue, ordered deterministically.
    event_queue: BTreeMap<EventKey, Event>,

    /// Sequence counter for deterministic ordering.
    sequence: u64,

    /// Current simulation time.
    now: Duration,

    network: SimulatedNetwork,

    /// RNG for network conditions (seeded for determinism).
    rng: ChaCha8Rng,

    /// Timer registry for cancellation support.
    /// Maps (node, timer_id) -> event_key for removal.
    timers: HashMap<(NodeIndex, TimerId), EventKey>,

    stats: SimulationStats,
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Events processed by priority.
    pub events_by_priority: [u64; 3],
    /// Total actions generated.
    pub actions_generated: u64,
    /// Messages sent (successfully scheduled for delivery).
    pub messages_sent: u64,
    /// Messages dropped due to network partition.
    pub messages_dropped_partition: u64,
    /// Messages dropped due to packet loss.
    pub messages_dropped_loss: u64,
    /// Outbound envelopes suppressed by a faulty behavior.
    pub messages_suppressed: u64,
    /// Timers set.
    pub timers_set: u64,
    /// Timers cancelled.
    pub timers_cancelled: u64,
    /// Pulses published, summed over nodes.
    pub pulses_published: u64,
    /// Rounds aborted, summed over nodes.
    pub rounds_aborted: u64,
    /// Inbound envelopes rejected by a coordinator.
    pub envelopes_rejected: u64,
}

impl SimulationStats {
    /// Total messages dropped (partition + packet loss).
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped_partition + self.messages_dropped_loss
    }

    /// Message delivery rate (sent / (sent + dropped)).
    pub fn delivery_rate(&self) -> f64 {
        let total = self.messages_sent + self.messages_dropped();
        if total == 0 {
            1.0
        } else {
            self.messages_sent as f64 / total as f64
        }
    }
}

impl SimulationRunner {
    /// Create a runner with default round timing.
    pub fn new(network_config: NetworkConfig, seed: u64) -> Result<Self, SimulationError> {
        Self::with_pulsar_config(network_config, PulsarConfig::default(), seed)
    }

    /// Create a runner where every node uses `pulsar_config`.
    pub fn with_pulsar_config(
        network_config: NetworkConfig,
        pulsar_config: PulsarConfig,
        seed: u64,
    ) -> Result<Self, SimulationError> {
        let num_pulsars = network_config.num_pulsars;
        if num_pulsars == 0 {
            return Err(SimulationError::NoPulsars);
        }

        // Generate keys for all pulsars using deterministic seeding
        let keys: Vec<KeyPair> = (0..num_pulsars)
            .map(|i| {
                let mut seed_bytes = [0u8; 32];
                let key_seed = seed.wrapping_add(i as u64).wrapping_mul(0x517cc1b727220a95);
                seed_bytes[..8].copy_from_slice(&key_seed.to_le_bytes());
                seed_bytes[8..16].copy_from_slice(&(i as u64).to_le_bytes());
                KeyPair::from_seed(KeyType::Ed25519, &seed_bytes)
            })
            .collect();

        let roster = Roster::new(
            keys.iter()
                .enumerate()
                .map(|(i, key)| PulsarInfo {
                    pulsar_id: PulsarId(i as u64),
                    public_key: key.public_key(),
                })
                .collect(),
        )?;
        let coordinator: Arc<dyn NetworkCoordinator> =
            Arc::new(StaticNetworkCoordinator::new(roster));
        let roster = coordinator.roster();

        let nodes: Vec<RoundCoordinator> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                build_node(
                    i as NodeIndex,
                    key.clone(),
                    &coordinator,
                    &pulsar_config,
                    seed,
                )
            })
            .collect();

        let n = nodes.len();
        info!(
            num_pulsars,
            quorum = roster.quorum(),
            seed,
            "Created simulation runner"
        );

        Ok(Self {
            nodes,
            keys,
            behaviors: vec![PulsarBehavior::Honest; n],
            published: vec![Vec::new(); n],
            aborted: vec![Vec::new(); n],
            halted: vec![false; n],
            roster,
            coordinator,
            pulsar_config,
            seed,
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network: SimulatedNetwork::new(network_config),
            rng: ChaCha8Rng::seed_from_u64(seed),
            timers: HashMap::new(),
            stats: SimulationStats::default(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn node(&self, index: NodeIndex) -> Option<&RoundCoordinator> {
        self.nodes.get(index as usize)
    }

    /// A node's roster key.
    pub fn key(&self, index: NodeIndex) -> Option<&KeyPair> {
        self.keys.get(index as usize)
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    pub fn network(&self) -> &SimulatedNetwork {
        &self.network
    }

    /// Get a mutable reference to the network for partition/loss configuration.
    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    /// Pulses published by a node, oldest first.
    pub fn published(&self, node: NodeIndex) -> &[Pulse] {
        self.published
            .get(node as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rounds aborted by a node, oldest first.
    pub fn aborted(&self, node: NodeIndex) -> &[(PulseNumber, AbortCause)] {
        self.aborted
            .get(node as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_halted(&self, node: NodeIndex) -> bool {
        self.halted.get(node as usize).copied().unwrap_or(false)
    }

    pub fn behavior(&self, node: NodeIndex) -> PulsarBehavior {
        self.behaviors
            .get(node as usize)
            .copied()
            .unwrap_or_default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Setup
    // ═══════════════════════════════════════════════════════════════════════════

    /// Change how a node treats its outbound traffic from now on.
    pub fn set_behavior(&mut self, node: NodeIndex, behavior: PulsarBehavior) {
        if let Some(slot) = self.behaviors.get_mut(node as usize) {
            debug!(node, ?behavior, "Setting pulsar behavior");
            *slot = behavior;
        }
    }

    /// Rebuild a node around a different signer, keeping its entropy seed.
    ///
    /// The node starts over with fresh state, so call this before
    /// [`start`](Self::start). The signer must hold the node's roster key
    /// for its messages to be accepted.
    pub fn set_signer(&mut self, node: NodeIndex, signer: impl PulsarSigner + 'static) {
        if (node as usize) < self.nodes.len() {
            debug!(node, "Replacing node signer");
            self.nodes[node as usize] = build_node(
                node,
                signer,
                &self.coordinator,
                &self.pulsar_config,
                self.seed,
            );
        }
    }

    /// Start every node: each schedules its first round.
    pub fn start(&mut self) {
        for node in self.network.all_nodes() {
            self.start_node(node);
        }
    }

    /// Start a single node at the current time.
    pub fn start_node(&mut self, node: NodeIndex) {
        let Some(coordinator) = self.nodes.get_mut(node as usize) else {
            return;
        };
        coordinator.set_time(self.now);
        let actions = coordinator.start();
        for action in actions {
            self.process_action(node, action);
        }
    }

    /// Have a node announce itself and ask peers for the last pulse.
    pub fn join_node(&mut self, node: NodeIndex) {
        self.schedule_initial_event(node, Duration::ZERO, Event::JoinNetwork);
    }

    /// Report a node's liveness to every other node.
    pub fn set_liveness(&mut self, node: NodeIndex, alive: bool) {
        let pulsar = PulsarId(node as u64);
        for to in self.network.all_nodes() {
            if to != node {
                self.schedule_event(to, self.now, Event::PeerLivenessChanged { pulsar, alive });
            }
        }
    }

    /// Schedule an initial event (e.g., to start the simulation).
    pub fn schedule_initial_event(&mut self, node: NodeIndex, delay: Duration, event: Event) {
        let time = self.now + delay;
        self.schedule_event(node, time, event);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Event loop
    // ═══════════════════════════════════════════════════════════════════════════

    /// Run simulation until no more events or time limit reached.
    pub fn run_until(&mut self, end_time: Duration) {
        trace!(
            end_time_secs = end_time.as_secs_f64(),
            "Running simulation step"
        );

        while let Some((&key, _)) = self.event_queue.first_key_value() {
            if key.time > end_time {
                debug!(
                    remaining_events = self.event_queue.len(),
                    "Time limit reached"
                );
                break;
            }

            let Some(event) = self.event_queue.remove(&key) else {
                break;
            };
            self.now = key.time;
            let node_index = key.node_index;

            if let Some(id) = timer_for(&event) {
                if self.timers.get(&(node_index, id)) == Some(&key) {
                    self.timers.remove(&(node_index, id));
                }
            }

            if self.halted[node_index as usize] {
                trace!(node = node_index, "Skipping event for halted node");
                continue;
            }

            trace!(
                time = ?self.now,
                node = node_index,
                event = event.type_name(),
                "Processing event"
            );

            self.stats.events_processed += 1;
            self.stats.events_by_priority[event.priority() as usize] += 1;

            let node = &mut self.nodes[node_index as usize];
            node.set_time(self.now);
            let actions = node.handle(event);

            self.stats.actions_generated += actions.len() as u64;

            for action in actions {
                self.process_action(node_index, action);
            }
        }

        if self.now < end_time {
            self.now = end_time;
        }

        trace!(
            events_processed = self.stats.events_processed,
            actions_generated = self.stats.actions_generated,
            final_time = ?self.now,
            "Simulation step complete"
        );
    }

    /// Process an action from a node.
    fn process_action(&mut self, from: NodeIndex, action: Action) {
        match action {
            Action::Broadcast { envelope } => {
                let Some(envelope) = self.outbound(from, envelope) else {
                    return;
                };
                for to in self.network.all_nodes() {
                    if to != from {
                        self.try_deliver_message(from, to, envelope.clone());
                    }
                }
            }

            Action::SendTo { pulsar, envelope } => {
                let to = pulsar.0 as NodeIndex;
                if to == from || to as usize >= self.nodes.len() {
                    return;
                }
                if let Some(envelope) = self.outbound(from, envelope) {
                    self.try_deliver_message(from, to, envelope);
                }
            }

            Action::SetTimer { id, duration } => {
                // A timer with the same id replaces the pending one.
                if let Some(previous) = self.timers.remove(&(from, id)) {
                    self.event_queue.remove(&previous);
                }
                let fire_time = self.now + duration;
                let key = self.schedule_event(from, fire_time, id.event());
                self.timers.insert((from, id), key);
                self.stats.timers_set += 1;
            }

            Action::CancelTimer { id } => {
                if let Some(key) = self.timers.remove(&(from, id)) {
                    self.event_queue.remove(&key);
                    self.stats.timers_cancelled += 1;
                }
            }

            Action::PublishPulse { pulse } => {
                debug!(
                    node = from,
                    pulse_number = %pulse.number,
                    contributors = pulse.signatures.len(),
                    "Pulse published"
                );
                self.published[from as usize].publish(&pulse);
                self.stats.pulses_published += 1;
            }

            Action::RoundAborted {
                pulse_number,
                cause,
            } => {
                debug!(node = from, pulse_number = %pulse_number, cause = cause.as_str(), "Round aborted");
                self.aborted[from as usize].push((pulse_number, cause));
                self.stats.rounds_aborted += 1;
            }

            Action::EnvelopeDropped { reason, .. } => {
                trace!(node = from, reason = reason.as_str(), "Envelope rejected");
                self.stats.envelopes_rejected += 1;
            }

            Action::Halt { reason } => {
                warn!(node = from, reason = %reason, "Node halted");
                self.halted[from as usize] = true;
            }
        }
    }

    /// Pass an outbound envelope through the sender's behavior.
    fn outbound(&mut self, from: NodeIndex, envelope: Envelope) -> Option<Envelope> {
        let behavior = self.behaviors[from as usize];
        let result = behavior.apply(envelope, &self.keys[from as usize]);
        if result.is_none() {
            self.stats.messages_suppressed += 1;
        }
        result
    }

    /// Schedule an event, returning its key.
    fn schedule_event(&mut self, node: NodeIndex, time: Duration, event: Event) -> EventKey {
        let key = EventKey::new(time, event.priority(), node, self.sequence);
        self.sequence += 1;
        self.event_queue.insert(key, event);
        key
    }

    /// Attempt to deliver a message, considering partitions and packet loss.
    fn try_deliver_message(&mut self, from: NodeIndex, to: NodeIndex, envelope: Envelope) {
        if self.network.is_partitioned(from, to) {
            self.stats.messages_dropped_partition += 1;
            trace!(from = from, to = to, "Message dropped due to partition");
            return;
        }

        if self.network.should_drop_packet(&mut self.rng) {
            self.stats.messages_dropped_loss += 1;
            trace!(from = from, to = to, "Message dropped due to packet loss");
            return;
        }

        let latency = self.network.sample_latency(&mut self.rng);
        let delivery_time = self.now + latency;
        self.schedule_event(to, delivery_time, Event::EnvelopeReceived { envelope });
        self.stats.messages_sent += 1;
    }
}

/// A node's coordinator, with entropy seeded from the run seed and its index.
fn build_node(
    node: NodeIndex,
    signer: impl PulsarSigner + 'static,
    coordinator: &Arc<dyn NetworkCoordinator>,
    config: &PulsarConfig,
    seed: u64,
) -> RoundCoordinator {
    let entropy_seed = seed ^ (node as u64 + 1).wrapping_mul(0x9e3779b97f4a7c15);
    RoundCoordinator::new(
        signer,
        Arc::clone(coordinator),
        Box::new(SeededEntropy::new(entropy_seed)),
        config.clone(),
    )
}

/// The timer an event was scheduled for, if it is a timer event.
fn timer_for(event: &Event) -> Option<TimerId> {
    match *event {
        Event::RoundTimer => Some(TimerId::NextRound),
        Event::CommitDeadline { pulse_number } => Some(TimerId::CommitPhase(pulse_number)),
        Event::RevealDeadline { pulse_number } => Some(TimerId::RevealPhase(pulse_number)),
        Event::EndorseDeadline { pulse_number } => Some(TimerId::EndorsePhase(pulse_number)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn runner(seed: u64) -> SimulationRunner {
        SimulationRunner::new(NetworkConfig::default(), seed).unwrap()
    }

    #[test]
    fn test_empty_roster_rejected() {
        let config = NetworkConfig {
            num_pulsars: 0,
            ..Default::default()
        };
        assert!(matches!(
            SimulationRunner::new(config, 1),
            Err(SimulationError::NoPulsars)
        ));
    }

    #[traced_test]
    #[test]
    fn test_start_schedules_one_round_timer_per_node() {
        let mut runner = runner(3);
        runner.start();

        assert_eq!(runner.stats().timers_set, 4);
        assert_eq!(runner.timers.len(), 4);
        assert!(runner
            .timers
            .keys()
            .all(|(_, id)| *id == TimerId::NextRound));
    }

    #[traced_test]
    #[test]
    fn test_fired_timers_leave_registry() {
        let mut runner = runner(3);
        runner.start();
        runner.run_until(Duration::from_millis(1700));

        // Every phase deadline was cancelled early on every node; only the
        // next round timers remain.
        assert!(runner.stats().timers_cancelled >= 12);
        assert!(runner
            .timers
            .values()
            .all(|key| key.time > runner.now() && runner.event_queue.contains_key(key)));
        assert!(runner
            .timers
            .keys()
            .all(|(_, id)| *id == TimerId::NextRound));
    }

    #[traced_test]
    #[test]
    fn test_liveness_reaches_every_other_node() {
        let mut runner = runner(3);
        runner.set_liveness(2, false);

        let targets: Vec<_> = runner.event_queue.keys().map(|k| k.node_index).collect();
        assert_eq!(targets, vec![0, 1, 3]);
    }

    #[traced_test]
    #[test]
    fn test_replaced_signer_keeps_node_identity() {
        let mut runner = runner(3);
        let key = runner.key(1).unwrap().clone();
        runner.set_signer(1, key.clone());

        assert_eq!(runner.node(1).unwrap().public_key(), &key.public_key());
        assert!(logs_contain("Replacing node signer"));
    }

    #[test]
    fn test_timer_mapping_covers_round_timers() {
        let n = PulseNumber(4);
        for id in [
            TimerId::NextRound,
            TimerId::CommitPhase(n),
            TimerId::RevealPhase(n),
            TimerId::EndorsePhase(n),
        ] {
            assert_eq!(timer_for(&id.event()), Some(id));
        }
        assert_eq!(timer_for(&Event::JoinNetwork), None);
    }
}
