//! Timer management for the production runner.
//!
//! Each timer is a tokio task that sleeps and then sends the timer's event
//! into the runner's timer channel. Setting an id that is already pending
//! replaces it, matching what the simulation runner does.

use pulsar_core::{Event, TimerId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Manages timers for the production runner.
pub struct TimerManager {
    timers: HashMap<TimerId, JoinHandle<()>>,
    event_tx: mpsc::Sender<Event>,
}

impl TimerManager {
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            timers: HashMap::new(),
            event_tx,
        }
    }

    /// Set a timer that fires after `duration`, replacing any pending timer
    /// with the same id.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);
        // Phase ids carry their round, so fired handles are never reused.
        self.timers.retain(|_, handle| !handle.is_finished());

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(?id, "Timer fired");
            // The runner may already be shutting down.
            let _ = event_tx.send(id.event()).await;
        });

        self.timers.insert(id, handle);
        debug!(?id, ?duration, "Timer set");
    }

    /// Cancel a timer. No-op if it is not pending.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            debug!(?id, "Timer cancelled");
        }
    }

    /// Cancel all timers. Called during shutdown.
    pub fn cancel_all(&mut self) {
        for (id, handle) in self.timers.drain() {
            handle.abort();
            trace!(?id, "Timer cancelled (shutdown)");
        }
    }

    /// Number of timers set and not yet cancelled. Fired timers stay counted
    /// until the next `set_timer` call.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsar_types::PulseNumber;

    async fn next_event(rx: &mut mpsc::Receiver<Event>, within: Duration) -> Event {
        tokio::time::timeout(within, rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_timer_fires() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::CommitPhase(PulseNumber(4)), Duration::from_millis(10));

        let event = next_event(&mut event_rx, Duration::from_millis(200)).await;
        assert!(matches!(
            event,
            Event::CommitDeadline {
                pulse_number: PulseNumber(4)
            }
        ));
    }

    #[tokio::test]
    async fn test_timer_cancel() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::RevealPhase(PulseNumber(1)), Duration::from_millis(50));
        manager.cancel_timer(TimerId::RevealPhase(PulseNumber(1)));

        let result = tokio::time::timeout(Duration::from_millis(100), event_rx.recv()).await;
        assert!(result.is_err(), "Timer should have been cancelled");
    }

    #[tokio::test]
    async fn test_timer_replace() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::NextRound, Duration::from_millis(500));
        manager.set_timer(TimerId::NextRound, Duration::from_millis(10));
        assert_eq!(manager.active_count(), 1);

        let event = next_event(&mut event_rx, Duration::from_millis(200)).await;
        assert!(matches!(event, Event::RoundTimer));

        // The replaced timer never fires.
        let result = tokio::time::timeout(Duration::from_millis(600), event_rx.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::CommitPhase(PulseNumber(1)), Duration::from_millis(50));
        manager.set_timer(TimerId::RevealPhase(PulseNumber(1)), Duration::from_millis(50));
        assert_eq!(manager.active_count(), 2);

        manager.cancel_all();
        assert_eq!(manager.active_count(), 0);

        let result = tokio::time::timeout(Duration::from_millis(100), event_rx.recv()).await;
        assert!(result.is_err(), "No timers should have fired");
    }

    #[tokio::test]
    async fn test_fired_timers_are_purged() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::EndorsePhase(PulseNumber(1)), Duration::from_millis(5));
        let event = next_event(&mut event_rx, Duration::from_millis(200)).await;
        assert!(matches!(
            event,
            Event::EndorseDeadline {
                pulse_number: PulseNumber(1)
            }
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;

        manager.set_timer(TimerId::EndorsePhase(PulseNumber(2)), Duration::from_millis(500));
        assert_eq!(manager.active_count(), 1);
    }
}
