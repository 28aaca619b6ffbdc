//! End-to-end rounds over the simulated network.

use pulsar_core::AbortCause;
use pulsar_consensus::verify_pulse;
use pulsar_simulation::{NetworkConfig, NodeIndex, PulsarBehavior, SimulationRunner};
use pulsar_test_helpers::RevocableSigner;
use pulsar_types::{Pulse, PulseNumber, PulsarId};
use std::time::Duration;
use tracing_test::traced_test;

const A: NodeIndex = 0;
const B: NodeIndex = 1;
const C: NodeIndex = 2;
const D: NodeIndex = 3;

fn runner(seed: u64) -> SimulationRunner {
    SimulationRunner::new(NetworkConfig::default(), seed).unwrap()
}

fn contributors(pulse: &Pulse) -> Vec<PulsarId> {
    pulse.contributors().collect()
}

fn ids(nodes: &[NodeIndex]) -> Vec<PulsarId> {
    nodes.iter().map(|&n| PulsarId(n as u64)).collect()
}

/// Every published pulse meets quorum and numbers strictly increase.
fn assert_pulse_invariants(runner: &SimulationRunner) {
    let quorum = runner.roster().quorum();
    for node in 0..runner.roster().len() as NodeIndex {
        let published = runner.published(node);
        for pulse in published {
            assert!(pulse.signatures.len() >= quorum);
            assert!(!pulse.entropy.is_zero());
            assert_eq!(verify_pulse(pulse, runner.roster()), Ok(()));
        }
        for pair in published.windows(2) {
            assert!(pair[0].number < pair[1].number);
        }
    }
}

/// The first pulse each of `nodes` published, asserting they agree.
fn agreed_first_pulse(runner: &SimulationRunner, nodes: &[NodeIndex]) -> Pulse {
    let first = runner.published(nodes[0])[0].clone();
    for &node in &nodes[1..] {
        assert_eq!(runner.published(node)[0], first, "node {} disagrees", node);
    }
    first
}

#[traced_test]
#[test]
fn test_honest_roster_publishes_agreed_pulses() {
    let mut runner = runner(7);
    runner.start();
    runner.run_until(Duration::from_secs(35));

    let reference = runner.published(A).to_vec();
    assert!(reference.len() >= 3);
    for node in [B, C, D] {
        assert_eq!(runner.published(node), reference.as_slice());
    }
    for (i, pulse) in reference.iter().enumerate() {
        assert_eq!(pulse.number, PulseNumber(i as u64 + 1));
        assert_eq!(contributors(pulse), ids(&[A, B, C, D]));
    }

    let node = runner.node(A).unwrap();
    assert!(node.stats().announcements_agreed > 0);
    assert_eq!(node.stats().announcements_diverged, 0);
    assert_eq!(runner.stats().rounds_aborted, 0);
    assert_pulse_invariants(&runner);
}

#[traced_test]
#[test]
fn test_withheld_reveal_is_left_out() {
    let mut runner = runner(11);
    runner.set_behavior(D, PulsarBehavior::WithholdReveal);
    runner.start();
    runner.run_until(Duration::from_secs(8));

    let pulse = agreed_first_pulse(&runner, &[A, B, C]);
    assert_eq!(pulse.number, PulseNumber::FIRST);
    assert_eq!(contributors(&pulse), ids(&[A, B, C]));
    for node in [A, B, C] {
        assert!(runner.aborted(node).is_empty());
    }
    assert_pulse_invariants(&runner);
}

#[traced_test]
#[test]
fn test_corrupt_reveal_below_quorum_aborts() {
    let mut runner = runner(13);
    runner.set_behavior(B, PulsarBehavior::CorruptReveal);
    runner.set_behavior(D, PulsarBehavior::WithholdReveal);
    runner.start();
    runner.run_until(Duration::from_secs(4));

    for node in [A, C] {
        assert!(runner.published(node).is_empty());
        assert_eq!(
            runner.aborted(node),
            &[(
                PulseNumber::FIRST,
                AbortCause::QuorumNotReached {
                    collected: 2,
                    required: 3
                }
            )]
        );
        // The aborted number is spent.
        assert_eq!(
            runner.node(node).unwrap().next_pulse_number(),
            PulseNumber(2)
        );
    }
    assert!(runner.stats().envelopes_rejected >= 2);
}

#[traced_test]
#[test]
fn test_corrupt_reveal_is_excluded() {
    let mut runner = runner(17);
    runner.set_behavior(B, PulsarBehavior::CorruptReveal);
    runner.start();
    runner.run_until(Duration::from_secs(5));

    let pulse = agreed_first_pulse(&runner, &[A, C, D]);
    assert_eq!(contributors(&pulse), ids(&[A, C, D]));
    assert_pulse_invariants(&runner);
}

#[traced_test]
#[test]
fn test_down_peer_does_not_delay_round() {
    let mut runner = runner(19);
    runner.set_behavior(D, PulsarBehavior::Silent);
    runner.set_liveness(D, false);
    runner.start();

    // Without the liveness report the commit phase would run to its
    // two second deadline.
    runner.run_until(Duration::from_millis(1600));

    let pulse = agreed_first_pulse(&runner, &[A, B, C]);
    assert_eq!(contributors(&pulse), ids(&[A, B, C]));
}

#[traced_test]
#[test]
fn test_silent_peer_waits_for_commit_deadline() {
    let mut runner = runner(19);
    runner.set_behavior(D, PulsarBehavior::Silent);
    runner.start();

    runner.run_until(Duration::from_millis(2900));
    for node in [A, B, C] {
        assert!(runner.published(node).is_empty());
    }

    runner.run_until(Duration::from_secs(4));
    let pulse = agreed_first_pulse(&runner, &[A, B, C]);
    assert_eq!(contributors(&pulse), ids(&[A, B, C]));
}

#[traced_test]
#[test]
fn test_isolated_pulsar_cannot_publish_alone() {
    let mut runner = runner(23);
    runner.network_mut().isolate_node(D);
    runner.start();
    runner.run_until(Duration::from_secs(25));

    let majority = runner.published(A).to_vec();
    assert!(majority.len() >= 2);
    for node in [B, C] {
        assert_eq!(runner.published(node), majority.as_slice());
    }
    assert!(majority
        .iter()
        .all(|pulse| contributors(pulse) == ids(&[A, B, C])));

    assert!(runner.published(D).is_empty());
    assert!(runner.aborted(D).iter().all(|(_, cause)| matches!(
        cause,
        AbortCause::QuorumNotReached {
            collected: 1,
            required: 3
        }
    )));
    assert!(!runner.aborted(D).is_empty());
    assert!(runner.stats().messages_dropped_partition > 0);
}

#[traced_test]
#[test]
fn test_even_split_makes_no_progress() {
    let mut runner = runner(29);
    runner.network_mut().partition_groups(&[A, B], &[C, D]);
    runner.start();
    runner.run_until(Duration::from_secs(15));

    for node in [A, B, C, D] {
        assert!(runner.published(node).is_empty());
        assert!(!runner.aborted(node).is_empty());
    }
}

#[traced_test]
#[test]
fn test_joiner_fast_forwards_from_peers() {
    let mut runner = runner(31);
    runner.network_mut().isolate_node(D);
    for node in [A, B, C] {
        runner.start_node(node);
    }
    runner.run_until(Duration::from_secs(30));

    let last = runner.published(A).last().cloned().unwrap();
    assert!(last.number >= PulseNumber(2));
    assert_eq!(
        runner.node(D).unwrap().next_pulse_number(),
        PulseNumber::FIRST
    );

    runner.network_mut().heal_all();
    runner.start_node(D);
    runner.join_node(D);
    runner.run_until(Duration::from_millis(30_600));

    let joiner = runner.node(D).unwrap();
    assert_eq!(Some(joiner.next_pulse_number()), last.number.next());
    assert!(joiner.last_pulse().is_none());
}

#[traced_test]
#[test]
fn test_lossy_network_keeps_invariants() {
    let config = NetworkConfig {
        packet_loss_rate: 0.05,
        ..Default::default()
    };
    let mut runner = SimulationRunner::new(config, 37).unwrap();
    runner.start();
    runner.run_until(Duration::from_secs(120));

    assert!(runner.stats().delivery_rate() < 1.0);
    assert!(runner.stats().pulses_published > 0);
    assert_pulse_invariants(&runner);
}

/// D finalizes over a vector that includes its own withheld reveal, so
/// nobody endorses its entropy and it never publishes.
#[traced_test]
#[test]
fn test_withholding_pulsar_gets_no_endorsements() {
    let mut runner = runner(11);
    runner.set_behavior(D, PulsarBehavior::WithholdReveal);
    runner.start();
    runner.run_until(Duration::from_secs(8));

    assert!(runner.published(D).is_empty());
    assert!(matches!(
        runner.aborted(D).first(),
        Some((PulseNumber::FIRST, AbortCause::EndorsementsMissing { .. }))
    ));
}

#[traced_test]
#[test]
fn test_revoked_signer_halts_node_and_others_continue() {
    let mut runner = runner(41);
    let signer = RevocableSigner::new(runner.key(A).unwrap().clone());
    runner.set_signer(A, signer.clone());
    runner.start();
    runner.run_until(Duration::from_secs(5));
    assert_eq!(runner.published(A).len(), 1);

    signer.revoke();
    runner.run_until(Duration::from_secs(30));

    assert!(runner.is_halted(A));
    assert!(runner.node(A).unwrap().is_halted());
    assert_eq!(runner.published(A).len(), 1);
    for node in [B, C, D] {
        assert!(!runner.is_halted(node));
        let later = &runner.published(node)[1..];
        assert!(!later.is_empty());
        assert!(later
            .iter()
            .all(|pulse| contributors(pulse) == ids(&[B, C, D])));
    }
    assert_pulse_invariants(&runner);
}
