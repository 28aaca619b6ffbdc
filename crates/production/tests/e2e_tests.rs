//! End-to-end runs of a production roster over the in-memory transport.

use pulsar_consensus::{CoordinatorStats, PulsarConfig, SeededEntropy};
use pulsar_core::PulseBroadcaster;
use pulsar_production::{
    MemoryNetwork, ProductionRunner, RunnerError, ShutdownHandle, TransportError,
};
use pulsar_test_helpers::{test_keys, test_roster};
use pulsar_types::{Pulse, PulseNumber, PulsarId, StaticNetworkCoordinator};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_test::traced_test;

type RunResult = Result<CoordinatorStats, RunnerError>;

struct Cluster {
    network: MemoryNetwork,
    shutdowns: Vec<Option<ShutdownHandle>>,
    tasks: Vec<JoinHandle<RunResult>>,
    pulses: mpsc::UnboundedReceiver<(PulsarId, Pulse)>,
}

/// Forwards pulses tagged with the publishing pulsar.
struct Tagged {
    pulsar: PulsarId,
    tx: mpsc::UnboundedSender<(PulsarId, Pulse)>,
}

impl PulseBroadcaster for Tagged {
    fn publish(&mut self, pulse: &Pulse) {
        let _ = self.tx.send((self.pulsar, pulse.clone()));
    }
}

fn fast_config() -> PulsarConfig {
    PulsarConfig::default()
        .with_first_round_delay(Duration::from_millis(50))
        .with_commit_timeout(Duration::from_millis(300))
        .with_reveal_timeout(Duration::from_millis(300))
        .with_endorse_timeout(Duration::from_millis(300))
        .with_pulse_interval(Duration::from_millis(1000))
}

fn start_cluster(n: usize, seed: u64) -> Cluster {
    let keys = test_keys(n, seed);
    let coordinator = Arc::new(StaticNetworkCoordinator::new(test_roster(&keys)));
    let network = MemoryNetwork::new();
    let (tx, pulses) = mpsc::unbounded_channel();

    // Connect everyone before any runner starts so the first round sees a
    // full roster.
    let transports: Vec<_> = (0..n)
        .map(|i| network.connect(PulsarId(i as u64)))
        .collect();

    let mut shutdowns = Vec::new();
    let mut tasks = Vec::new();
    for (i, (key, transport)) in keys.into_iter().zip(transports).enumerate() {
        let pulsar = PulsarId(i as u64);
        let mut runner = ProductionRunner::builder()
            .signing_key(key)
            .network_coordinator(coordinator.clone())
            .transport(transport)
            .config(fast_config())
            .entropy(SeededEntropy::new(seed + i as u64))
            .broadcaster(Tagged {
                pulsar,
                tx: tx.clone(),
            })
            .poll_interval(Duration::from_millis(20))
            .build()
            .unwrap();
        shutdowns.push(runner.shutdown_handle());
        tasks.push(tokio::spawn(runner.run()));
    }

    Cluster {
        network,
        shutdowns,
        tasks,
        pulses,
    }
}

/// Collect pulses until every pulsar in `expected` has published `count`
/// of them, or the timeout passes.
async fn collect(
    cluster: &mut Cluster,
    expected: &[PulsarId],
    count: usize,
    within: Duration,
) -> BTreeMap<PulsarId, Vec<Pulse>> {
    let mut by_pulsar: BTreeMap<PulsarId, Vec<Pulse>> = BTreeMap::new();
    let _ = tokio::time::timeout(within, async {
        while let Some((pulsar, pulse)) = cluster.pulses.recv().await {
            by_pulsar.entry(pulsar).or_default().push(pulse);
            let done = expected
                .iter()
                .all(|p| by_pulsar.get(p).map_or(0, Vec::len) >= count);
            if done {
                break;
            }
        }
    })
    .await;
    by_pulsar
}

#[traced_test]
#[tokio::test]
async fn test_roster_agrees_on_pulses() {
    let mut cluster = start_cluster(4, 11);
    let all: Vec<PulsarId> = (0..4).map(PulsarId).collect();

    let by_pulsar = collect(&mut cluster, &all, 2, Duration::from_secs(10)).await;

    let reference = &by_pulsar[&PulsarId(0)][..2];
    assert_eq!(reference[0].number, PulseNumber(1));
    assert_eq!(reference[1].number, PulseNumber(2));
    assert_ne!(reference[0].entropy, reference[1].entropy);
    for pulsar in &all {
        assert_eq!(&by_pulsar[pulsar][..2], reference, "{pulsar} diverged");
    }
    for pulse in reference {
        assert_eq!(pulse.contributors().collect::<Vec<_>>(), all);
    }

    cluster.shutdowns.clear();
    for task in cluster.tasks {
        let stats = task.await.unwrap().unwrap();
        assert!(stats.pulses_published >= 2);
    }
}

#[traced_test]
#[tokio::test]
async fn test_majority_continues_after_disconnect() {
    let mut cluster = start_cluster(4, 12);
    let all: Vec<PulsarId> = (0..4).map(PulsarId).collect();

    let first = collect(&mut cluster, &all, 1, Duration::from_secs(10)).await;
    assert!(all.iter().all(|p| first.contains_key(p)));

    cluster.network.disconnect(PulsarId(3));

    let majority = [PulsarId(0), PulsarId(1), PulsarId(2)];
    let after = collect(&mut cluster, &majority, 1, Duration::from_secs(10)).await;

    let reference = &after[&PulsarId(0)][0];
    assert!(reference.number > first[&PulsarId(0)][0].number);
    assert_eq!(
        reference.contributors().collect::<Vec<_>>(),
        majority.to_vec()
    );
    for pulsar in &majority {
        assert_eq!(&after[pulsar][0], reference);
    }

    cluster.shutdowns.clear();
    let mut results = Vec::new();
    for task in cluster.tasks {
        results.push(task.await.unwrap());
    }
    assert!(matches!(
        results[3],
        Err(RunnerError::Transport(TransportError::Closed))
    ));
    assert!(results[..3].iter().all(Result::is_ok));
}
