//! Core traits for state machines and the publication boundary.

use crate::{Action, Event};
use pulsar_types::Pulse;
use std::time::Duration;

/// A state machine that processes events.
///
/// All consensus logic is implemented as state machines that are:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions
/// - **Pure-ish**: Mutates self, but performs no I/O
///
/// # Example
///
/// ```ignore
/// impl StateMachine for RoundCoordinator {
///     fn handle(&mut self, event: Event) -> Vec<Action> {
///         match event {
///             Event::RoundTimer => self.open_round(),
///             Event::EnvelopeReceived { envelope } => self.on_envelope(envelope),
///             // ... etc
///         }
///     }
///
///     fn set_time(&mut self, now: Duration) {
///         self.now = now;
///     }
/// }
/// ```
pub trait StateMachine {
    /// Process an event, returning actions to perform.
    ///
    /// # Guarantees
    ///
    /// - **Synchronous**: This method never blocks or awaits
    /// - **Deterministic**: Given the same state and event, always returns the same actions
    /// - **No I/O**: All I/O is performed by the runner via the returned actions
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current time.
    ///
    /// Called by the runner before each `handle()` call to provide the
    /// current simulation or wall-clock time.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    ///
    /// Returns the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}

/// Downstream consumer of finalized pulses (ledger, network coordinator).
///
/// Runners call this for every [`Action::PublishPulse`]. Pulses arrive in
/// strictly increasing number order; nothing is expected back.
pub trait PulseBroadcaster: Send {
    /// Push a finalized pulse.
    fn publish(&mut self, pulse: &Pulse);
}

/// Collects published pulses in memory.
impl PulseBroadcaster for Vec<Pulse> {
    fn publish(&mut self, pulse: &Pulse) {
        self.push(pulse.clone());
    }
}
