//! Production runner.
//!
//! Drives a [`RoundCoordinator`] with wall-clock time: timers become tokio
//! tasks, envelopes travel as frames over a [`PeerTransport`], and published
//! pulses go to a [`PulseBroadcaster`].

use crate::metrics;
use crate::network::{InboundRateLimiter, PeerTransport, RateLimitConfig, TransportError, TransportEvent};
use crate::timers::TimerManager;
use parking_lot::RwLock;
use pulsar_consensus::{
    CoordinatorStats, EntropyGenerator, OsEntropy, Phase, PulsarConfig, RoundCoordinator,
};
use pulsar_core::{Action, Event, PulseBroadcaster, StateMachine};
use pulsar_messages::{decode_frame, encode_frame, Envelope};
use pulsar_types::{KeyPair, NetworkCoordinator, PublicKey, Pulse, PulsarId, PulsarSigner};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, span, trace, warn, Level};

/// Errors from the production runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Pulsar halted: {0}")]
    Halted(String),
}

/// Handle for shutting down a running [`ProductionRunner`].
///
/// When dropped, signals the runner to exit gracefully.
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Trigger shutdown (consumes the handle).
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Builder for constructing a [`ProductionRunner`].
///
/// Required fields:
/// - `signer` (or `signing_key`) - this pulsar's roster key
/// - `network_coordinator` - roster oracle
/// - `transport` - peer transport
///
/// Optional fields:
/// - `config` - round timing (defaults to [`PulsarConfig::default`])
/// - `entropy` - entropy source (defaults to [`OsEntropy`])
/// - `broadcaster` - downstream pulse consumer (defaults to none)
/// - `rate_limit` - inbound per-sender limits
/// - `join_on_start` - ask peers for the last pulse before the first round
pub struct ProductionRunnerBuilder {
    signer: Option<Box<dyn PulsarSigner>>,
    network_coordinator: Option<Arc<dyn NetworkCoordinator>>,
    transport: Option<Box<dyn PeerTransport>>,
    config: PulsarConfig,
    entropy: Option<Box<dyn EntropyGenerator>>,
    broadcaster: Option<Box<dyn PulseBroadcaster>>,
    rate_limit: RateLimitConfig,
    join_on_start: bool,
    poll_interval: Duration,
    timer_channel_capacity: usize,
}

impl Default for ProductionRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionRunnerBuilder {
    pub fn new() -> Self {
        Self {
            signer: None,
            network_coordinator: None,
            transport: None,
            config: PulsarConfig::default(),
            entropy: None,
            broadcaster: None,
            rate_limit: RateLimitConfig::default(),
            join_on_start: false,
            poll_interval: Duration::from_millis(100),
            timer_channel_capacity: 64,
        }
    }

    /// Sign with an in-memory key pair.
    pub fn signing_key(self, key: KeyPair) -> Self {
        self.signer(key)
    }

    /// Sign through any [`PulsarSigner`]. A signer that starts failing
    /// halts the runner.
    pub fn signer(mut self, signer: impl PulsarSigner + 'static) -> Self {
        self.signer = Some(Box::new(signer));
        self
    }

    pub fn network_coordinator(mut self, coordinator: Arc<dyn NetworkCoordinator>) -> Self {
        self.network_coordinator = Some(coordinator);
        self
    }

    pub fn transport(mut self, transport: impl PeerTransport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn config(mut self, config: PulsarConfig) -> Self {
        self.config = config;
        self
    }

    pub fn entropy(mut self, entropy: impl EntropyGenerator + 'static) -> Self {
        self.entropy = Some(Box::new(entropy));
        self
    }

    pub fn broadcaster(mut self, broadcaster: impl PulseBroadcaster + 'static) -> Self {
        self.broadcaster = Some(Box::new(broadcaster));
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    pub fn join_on_start(mut self, join: bool) -> Self {
        self.join_on_start = join;
        self
    }

    /// How long one transport poll waits before the loop re-checks shutdown.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn build(self) -> Result<ProductionRunner, RunnerError> {
        let signer = self.signer.ok_or(RunnerError::MissingField("signer"))?;
        let network_coordinator = self
            .network_coordinator
            .ok_or(RunnerError::MissingField("network_coordinator"))?;
        let transport = self
            .transport
            .ok_or(RunnerError::MissingField("transport"))?;
        let entropy = self.entropy.unwrap_or_else(|| Box::new(OsEntropy));

        let coordinator = RoundCoordinator::new(
            signer,
            Arc::clone(&network_coordinator),
            entropy,
            self.config,
        );

        // Timers get a dedicated channel so a frame flood never delays them.
        let (timer_tx, timer_rx) = mpsc::channel(self.timer_channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        Ok(ProductionRunner {
            coordinator,
            network_coordinator,
            transport,
            broadcaster: self.broadcaster,
            timers: TimerManager::new(timer_tx),
            timer_rx,
            rate_limiter: InboundRateLimiter::new(self.rate_limit),
            last_pulse: Arc::new(RwLock::new(None)),
            live_peers: BTreeSet::new(),
            round_opened_at: None,
            start_time: Instant::now(),
            poll_interval: self.poll_interval,
            join_on_start: self.join_on_start,
            shutdown_rx,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

/// Runs one pulsar until shutdown, halt, or transport failure.
pub struct ProductionRunner {
    coordinator: RoundCoordinator,
    network_coordinator: Arc<dyn NetworkCoordinator>,
    transport: Box<dyn PeerTransport>,
    broadcaster: Option<Box<dyn PulseBroadcaster>>,
    timers: TimerManager,
    timer_rx: mpsc::Receiver<Event>,
    rate_limiter: InboundRateLimiter,
    /// Shared with observers (RPC, devnet printer).
    last_pulse: Arc<RwLock<Option<Pulse>>>,
    live_peers: BTreeSet<PulsarId>,
    round_opened_at: Option<Instant>,
    start_time: Instant,
    poll_interval: Duration,
    join_on_start: bool,
    shutdown_rx: oneshot::Receiver<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ProductionRunner {
    pub fn builder() -> ProductionRunnerBuilder {
        ProductionRunnerBuilder::new()
    }

    /// Take the shutdown handle. Returns `None` after the first call.
    pub fn shutdown_handle(&mut self) -> Option<ShutdownHandle> {
        self.shutdown_tx
            .take()
            .map(|tx| ShutdownHandle { tx: Some(tx) })
    }

    /// Shared view of the last published pulse.
    pub fn last_pulse_handle(&self) -> Arc<RwLock<Option<Pulse>>> {
        Arc::clone(&self.last_pulse)
    }

    pub fn public_key(&self) -> &PublicKey {
        self.coordinator.public_key()
    }

    pub fn coordinator(&self) -> &RoundCoordinator {
        &self.coordinator
    }

    /// Run the event loop.
    ///
    /// Returns the coordinator's counters on graceful shutdown.
    pub async fn run(mut self) -> Result<CoordinatorStats, RunnerError> {
        let pulsar = self
            .network_coordinator
            .authorize(self.coordinator.public_key())
            .ok();
        info!(
            pulsar = ?pulsar,
            roster = self.network_coordinator.roster().len(),
            join = self.join_on_start,
            "Starting production runner"
        );

        let actions = self.coordinator.start();
        self.process_actions(actions).await?;
        if self.join_on_start {
            self.dispatch(Event::JoinNetwork).await?;
        }

        let poll_interval = self.poll_interval;
        let result = loop {
            // Priority: shutdown, then timers, then the transport.
            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    info!("Shutdown signal received");
                    break Ok(());
                }

                event = self.timer_rx.recv() => {
                    let Some(event) = event else {
                        break Err(RunnerError::ChannelClosed);
                    };
                    if let Err(e) = self.dispatch(event).await {
                        break Err(e);
                    }
                }

                received = self.transport.receive(poll_interval) => {
                    match received {
                        Ok(Some(event)) => {
                            if let Err(e) = self.on_transport_event(event).await {
                                break Err(e);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => break Err(e.into()),
                    }
                }
            }
        };

        self.timers.cancel_all();
        let stats = self.coordinator.stats();
        info!(
            pulses = stats.pulses_published,
            aborted = stats.rounds_aborted,
            ok = result.is_ok(),
            "Production runner stopped"
        );
        result.map(|()| stats)
    }

    async fn on_transport_event(&mut self, event: TransportEvent) -> Result<(), RunnerError> {
        match event {
            TransportEvent::Frame(frame) => {
                metrics::record_frame_received();
                let envelope = match decode_frame(&frame) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        metrics::record_invalid_frame();
                        debug!(error = %e, len = frame.len(), "Dropping undecodable frame");
                        return Ok(());
                    }
                };

                let is_member = self
                    .network_coordinator
                    .authorize(&envelope.public_key)
                    .is_ok();
                if !self.rate_limiter.check(&envelope.public_key, is_member) {
                    metrics::record_rate_limited();
                    trace!(sender = ?envelope.public_key, "Rate limited envelope");
                    return Ok(());
                }

                self.dispatch(Event::EnvelopeReceived { envelope }).await
            }
            TransportEvent::PeerUp(pulsar) => {
                self.live_peers.insert(pulsar);
                metrics::set_peers_live(self.live_peers.len());
                self.dispatch(Event::PeerLivenessChanged {
                    pulsar,
                    alive: true,
                })
                .await
            }
            TransportEvent::PeerDown(pulsar) => {
                self.live_peers.remove(&pulsar);
                metrics::set_peers_live(self.live_peers.len());
                self.dispatch(Event::PeerLivenessChanged {
                    pulsar,
                    alive: false,
                })
                .await
            }
        }
    }

    async fn dispatch(&mut self, event: Event) -> Result<(), RunnerError> {
        let event_span = span!(
            Level::DEBUG,
            "handle_event",
            event.type = %event.type_name(),
            pulse = %self.coordinator.next_pulse_number(),
        );

        // The span guard is not Send; keep it out of the await below.
        let actions = {
            let _guard = event_span.enter();
            let was_idle = self.coordinator.phase() == Phase::Idle;
            self.coordinator.set_time(self.start_time.elapsed());
            let actions = self.coordinator.handle(event);
            if was_idle && self.coordinator.phase() != Phase::Idle {
                self.round_opened_at = Some(Instant::now());
            }
            actions
        };

        self.process_actions(actions).await
    }

    async fn process_actions(&mut self, actions: Vec<Action>) -> Result<(), RunnerError> {
        for action in actions {
            self.process_action(action).await?;
        }
        Ok(())
    }

    async fn process_action(&mut self, action: Action) -> Result<(), RunnerError> {
        match action {
            Action::Broadcast { envelope } => {
                if let Some(frame) = encode(&envelope) {
                    self.transport.broadcast(frame).await?;
                    metrics::record_frame_sent();
                }
            }

            Action::SendTo { pulsar, envelope } => {
                if let Some(frame) = encode(&envelope) {
                    match self.transport.send(pulsar, frame).await {
                        Ok(()) => metrics::record_frame_sent(),
                        // Unreachable peers are a normal network condition.
                        Err(TransportError::PeerUnreachable(_)) => {
                            debug!(%pulsar, "Peer unreachable, frame dropped");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),

            Action::CancelTimer { id } => self.timers.cancel_timer(id),

            Action::PublishPulse { pulse } => {
                let round_secs = self
                    .round_opened_at
                    .take()
                    .map(|opened| opened.elapsed().as_secs_f64());
                metrics::record_pulse_published(&pulse, round_secs);

                if let Some(broadcaster) = self.broadcaster.as_mut() {
                    broadcaster.publish(&pulse);
                }
                *self.last_pulse.write() = Some(pulse);
            }

            Action::RoundAborted { cause, .. } => {
                self.round_opened_at = None;
                metrics::record_round_aborted(&cause);
            }

            Action::EnvelopeDropped { from, reason } => {
                metrics::record_envelope_dropped(&reason);
                trace!(sender = ?from, reason = reason.as_str(), "Envelope dropped");
            }

            Action::Halt { reason } => return Err(RunnerError::Halted(reason)),
        }
        Ok(())
    }
}

fn encode(envelope: &Envelope) -> Option<Vec<u8>> {
    match encode_frame(envelope) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "Failed to encode outbound envelope");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::ChannelBroadcaster;
    use crate::network::MemoryNetwork;
    use pulsar_consensus::SeededEntropy;
    use pulsar_types::StaticNetworkCoordinator;
    use pulsar_test_helpers::{test_keys, test_roster, RevocableSigner};
    use tracing_test::traced_test;

    fn fast_config() -> PulsarConfig {
        PulsarConfig::default()
            .with_first_round_delay(Duration::from_millis(10))
            .with_commit_timeout(Duration::from_millis(200))
            .with_reveal_timeout(Duration::from_millis(200))
            .with_endorse_timeout(Duration::from_millis(200))
            .with_pulse_interval(Duration::from_millis(700))
    }

    #[test]
    fn test_build_requires_transport() {
        let keys = test_keys(1, 1);
        let result = ProductionRunner::builder()
            .signing_key(keys[0].clone())
            .network_coordinator(Arc::new(StaticNetworkCoordinator::new(test_roster(&keys))))
            .build();

        assert!(matches!(result, Err(RunnerError::MissingField("transport"))));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_single_pulsar_publishes_alone() {
        let keys = test_keys(1, 2);
        let network = MemoryNetwork::new();
        let (broadcaster, mut pulses) = ChannelBroadcaster::channel();

        let mut runner = ProductionRunner::builder()
            .signing_key(keys[0].clone())
            .network_coordinator(Arc::new(StaticNetworkCoordinator::new(test_roster(&keys))))
            .transport(network.connect(PulsarId(0)))
            .config(fast_config())
            .entropy(SeededEntropy::new(7))
            .broadcaster(broadcaster)
            .poll_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        let shutdown = runner.shutdown_handle().unwrap();
        let last_pulse = runner.last_pulse_handle();
        let task = tokio::spawn(runner.run());

        let pulse = tokio::time::timeout(Duration::from_secs(2), pulses.recv())
            .await
            .expect("no pulse within 2s")
            .expect("broadcaster closed");
        assert_eq!(pulse.number.0, 1);
        assert_eq!(pulse.signatures.len(), 1);
        assert!(!pulse.entropy.is_zero());

        shutdown.shutdown();
        let stats = task.await.unwrap().unwrap();
        assert!(stats.pulses_published >= 1);
        assert!(last_pulse.read().is_some());
    }

    #[traced_test]
    #[tokio::test]
    async fn test_garbage_frames_do_not_stop_runner() {
        let keys = test_keys(1, 3);
        let network = MemoryNetwork::new();
        let (broadcaster, mut pulses) = ChannelBroadcaster::channel();

        let mut runner = ProductionRunner::builder()
            .signing_key(keys[0].clone())
            .network_coordinator(Arc::new(StaticNetworkCoordinator::new(test_roster(&keys))))
            .transport(network.connect(PulsarId(0)))
            .config(fast_config())
            .broadcaster(broadcaster)
            .poll_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        let shutdown = runner.shutdown_handle().unwrap();
        let task = tokio::spawn(runner.run());

        // An outsider on the same hub sprays junk.
        let outsider = network.connect(PulsarId(99));
        for _ in 0..10 {
            outsider.broadcast(vec![0xde, 0xad, 0xbe, 0xef]).await.unwrap();
        }

        let pulse = tokio::time::timeout(Duration::from_secs(2), pulses.recv())
            .await
            .expect("no pulse within 2s")
            .expect("broadcaster closed");
        assert_eq!(pulse.number.0, 1);

        drop(shutdown);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_ends_run_with_transport_error() {
        let keys = test_keys(1, 4);
        let network = MemoryNetwork::new();

        let runner = ProductionRunner::builder()
            .signing_key(keys[0].clone())
            .network_coordinator(Arc::new(StaticNetworkCoordinator::new(test_roster(&keys))))
            .transport(network.connect(PulsarId(0)))
            .config(fast_config())
            .poll_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        let task = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        network.disconnect(PulsarId(0));

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("runner did not stop")
            .unwrap();
        assert!(matches!(
            result,
            Err(RunnerError::Transport(TransportError::Closed))
        ));
    }

    #[test]
    fn test_build_requires_signer() {
        let keys = test_keys(1, 5);
        let network = MemoryNetwork::new();
        let result = ProductionRunner::builder()
            .network_coordinator(Arc::new(StaticNetworkCoordinator::new(test_roster(&keys))))
            .transport(network.connect(PulsarId(0)))
            .build();

        assert!(matches!(result, Err(RunnerError::MissingField("signer"))));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_revoked_signer_ends_run_with_halt() {
        let keys = test_keys(1, 6);
        let network = MemoryNetwork::new();
        let (broadcaster, mut pulses) = ChannelBroadcaster::channel();
        let signer = RevocableSigner::new(keys[0].clone());

        let runner = ProductionRunner::builder()
            .signer(signer.clone())
            .network_coordinator(Arc::new(StaticNetworkCoordinator::new(test_roster(&keys))))
            .transport(network.connect(PulsarId(0)))
            .config(fast_config())
            .broadcaster(broadcaster)
            .poll_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        let task = tokio::spawn(runner.run());

        let pulse = tokio::time::timeout(Duration::from_secs(2), pulses.recv())
            .await
            .expect("no pulse within 2s")
            .expect("broadcaster closed");
        assert_eq!(pulse.number.0, 1);

        // The next round cannot sign its commitment.
        signer.revoke();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("runner did not stop")
            .unwrap();
        match result {
            Err(RunnerError::Halted(reason)) => assert!(reason.contains("key revoked")),
            other => panic!("expected a halt, got {:?}", other.map(|_| ())),
        }
        assert!(logs_contain("Halting pulsar"));
    }
}
