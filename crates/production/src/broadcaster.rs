//! Publication boundary for the production runner.

use pulsar_core::PulseBroadcaster;
use pulsar_types::Pulse;
use tokio::sync::mpsc;
use tracing::warn;

/// Forwards every published pulse into a channel.
///
/// The receiving side is the downstream consumer (ledger, network
/// coordinator, the devnet printer). A closed receiver is logged, not
/// fatal; the round coordinator keeps running.
pub struct ChannelBroadcaster {
    tx: mpsc::UnboundedSender<Pulse>,
}

impl ChannelBroadcaster {
    pub fn new(tx: mpsc::UnboundedSender<Pulse>) -> Self {
        Self { tx }
    }

    /// A broadcaster plus the receiver its pulses arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Pulse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl PulseBroadcaster for ChannelBroadcaster {
    fn publish(&mut self, pulse: &Pulse) {
        if self.tx.send(pulse.clone()).is_err() {
            warn!(pulse = %pulse.number, "Pulse consumer is gone");
        }
    }
}
