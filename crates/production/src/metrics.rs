//! Production metrics using the native Prometheus client.
//!
//! Metrics are round-level rather than per-message event counters. Use
//! traces for message-level detail during investigations.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Gauge, Histogram,
};
use pulsar_core::{AbortCause, DropReason};
use pulsar_types::Pulse;
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics for a running pulsar.
pub struct Metrics {
    // === Rounds ===
    pub pulses_published: Counter,
    pub pulse_number: Gauge,
    pub pulse_contributors: Gauge,
    pub round_duration: Histogram,
    pub rounds_aborted: CounterVec,

    // === Envelopes ===
    pub envelopes_dropped: CounterVec,
    pub envelopes_rate_limited: Counter,

    // === Transport ===
    pub frames_sent: Counter,
    pub frames_received: Counter,
    pub invalid_frames: Counter,
    pub peers_live: Gauge,
}

impl Metrics {
    fn new() -> Self {
        Self {
            pulses_published: register_counter!(
                "pulsar_pulses_published_total",
                "Total number of pulses published"
            )
            .unwrap(),

            pulse_number: register_gauge!("pulsar_pulse_number", "Number of the last pulse")
                .unwrap(),

            pulse_contributors: register_gauge!(
                "pulsar_pulse_contributors",
                "Contributors to the last pulse"
            )
            .unwrap(),

            round_duration: register_histogram!(
                "pulsar_round_duration_seconds",
                "Time from round open to publish",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0]
            )
            .unwrap(),

            rounds_aborted: register_counter_vec!(
                "pulsar_rounds_aborted_total",
                "Rounds that ended without a pulse",
                &["cause"]
            )
            .unwrap(),

            envelopes_dropped: register_counter_vec!(
                "pulsar_envelopes_dropped_total",
                "Inbound envelopes rejected by the coordinator",
                &["reason"]
            )
            .unwrap(),

            envelopes_rate_limited: register_counter!(
                "pulsar_envelopes_rate_limited_total",
                "Inbound envelopes discarded by the per-sender rate limiter"
            )
            .unwrap(),

            frames_sent: register_counter!("pulsar_frames_sent_total", "Frames sent").unwrap(),

            frames_received: register_counter!(
                "pulsar_frames_received_total",
                "Frames received"
            )
            .unwrap(),

            invalid_frames: register_counter!(
                "pulsar_invalid_frames_total",
                "Frames that failed to decode"
            )
            .unwrap(),

            peers_live: register_gauge!("pulsar_peers_live", "Peers the transport sees as up")
                .unwrap(),
        }
    }
}

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Record a published pulse and how long its round took.
pub fn record_pulse_published(pulse: &Pulse, round_secs: Option<f64>) {
    let m = metrics();
    m.pulses_published.inc();
    m.pulse_number.set(pulse.number.0 as f64);
    m.pulse_contributors.set(pulse.signatures.len() as f64);
    if let Some(secs) = round_secs {
        m.round_duration.observe(secs);
    }
}

/// Record an aborted round. The label is one of the fixed
/// [`AbortCause::as_str`] values.
pub fn record_round_aborted(cause: &AbortCause) {
    metrics()
        .rounds_aborted
        .with_label_values(&[cause.as_str()])
        .inc();
}

/// Record a rejected envelope. The label is one of the fixed
/// [`DropReason::as_str`] values.
pub fn record_envelope_dropped(reason: &DropReason) {
    metrics()
        .envelopes_dropped
        .with_label_values(&[reason.as_str()])
        .inc();
}

pub fn record_rate_limited() {
    metrics().envelopes_rate_limited.inc();
}

pub fn record_frame_sent() {
    metrics().frames_sent.inc();
}

pub fn record_frame_received() {
    metrics().frames_received.inc();
}

pub fn record_invalid_frame() {
    metrics().invalid_frames.inc();
}

pub fn set_peers_live(count: usize) {
    metrics().peers_live.set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsar_test_helpers::{bare_pulse, test_entropy};

    #[test]
    fn test_pulse_gauges_follow_last_pulse() {
        let before = metrics().pulses_published.get();

        record_pulse_published(&bare_pulse(41, test_entropy(1)), Some(0.3));

        assert!(metrics().pulses_published.get() >= before + 1.0);
        assert!(metrics().pulse_number.get() >= 1.0);
    }

    #[test]
    fn test_abort_labels_by_cause() {
        let cause = AbortCause::QuorumNotReached {
            collected: 1,
            required: 3,
        };
        let counter = metrics()
            .rounds_aborted
            .with_label_values(&["quorum_not_reached"]);
        let before = counter.get();

        record_round_aborted(&cause);

        assert!(counter.get() >= before + 1.0);
    }
}
