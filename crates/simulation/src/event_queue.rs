//! Ordering key for the simulation event queue.

use crate::NodeIndex;
use pulsar_core::EventPriority;
use std::time::Duration;

/// Key for an event in the global queue.
///
/// Events are processed in key order: earliest time first, then priority
/// (internal before timers before network), then node, then insertion
/// sequence. The sequence makes every key unique, so two events scheduled
/// for the same instant on the same node keep their scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub node_index: NodeIndex,
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, priority: EventPriority, node_index: NodeIndex, sequence: u64) -> Self {
        Self {
            time,
            priority,
            node_index,
            sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_time_orders_first() {
        let early = EventKey::new(Duration::from_millis(1), EventPriority::Network, 3, 9);
        let late = EventKey::new(Duration::from_millis(2), EventPriority::Internal, 0, 0);
        assert!(early < late);
    }

    #[test]
    fn test_timers_before_network_at_same_instant() {
        let now = Duration::from_secs(1);
        let timer = EventKey::new(now, EventPriority::Timer, 2, 5);
        let network = EventKey::new(now, EventPriority::Network, 0, 1);
        assert!(timer < network);
    }

    #[test]
    fn test_sequence_breaks_ties() {
        let now = Duration::from_secs(1);
        let mut queue = BTreeMap::new();
        queue.insert(EventKey::new(now, EventPriority::Network, 1, 7), "second");
        queue.insert(EventKey::new(now, EventPriority::Network, 1, 3), "first");

        let order: Vec<_> = queue.into_values().collect();
        assert_eq!(order, vec!["first", "second"]);
    }
}
