//! Deterministic simulation runner.
//!
//! This crate provides a fully deterministic simulation environment for
//! pulsar rounds. Given the same seed, it produces identical pulses every
//! run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationRunner                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Event Queue (BTreeMap<EventKey, Event>)        │ │
//! │  │     Ordered by: time, priority, node, sequence     │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     nodes: Vec<RoundCoordinator>                   │ │
//! │  │     Each processes events sequentially             │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Actions → fault injection → network → events   │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod event_queue;
mod fault;
mod network;
mod runner;

pub use event_queue::EventKey;
pub use fault::PulsarBehavior;
pub use network::{NetworkConfig, SimulatedNetwork};
pub use runner::{SimulationError, SimulationRunner, SimulationStats};

/// Type alias for deterministic node indexing in simulation.
///
/// Node `i` runs as `PulsarId(i)`. Production code identifies peers by the
/// public key on their envelopes.
pub type NodeIndex = u32;
