//! Production runner with async I/O.
//!
//! Wraps the deterministic [`RoundCoordinator`](pulsar_consensus::RoundCoordinator)
//! with tokio:
//!
//! ```text
//! ┌──────────────┐  frames   ┌──────────────────┐  Event   ┌─────────────────┐
//! │ PeerTransport│ ────────► │ ProductionRunner │ ───────► │ RoundCoordinator│
//! └──────────────┘ ◄──────── │  (select! loop)  │ ◄─────── └─────────────────┘
//!                   frames   └──────────────────┘  Action
//!                              │     │      │
//!                    TimerManager  metrics  PulseBroadcaster
//! ```
//!
//! The same coordinator runs unchanged under `pulsar-simulation`.

mod broadcaster;
pub mod config;
pub mod metrics;
pub mod network;
mod runner;
mod telemetry;
mod timers;

pub use broadcaster::ChannelBroadcaster;
pub use config::{ConfigError, DevnetConfig};
pub use network::{
    InboundRateLimiter, MemoryNetwork, MemoryTransport, PeerTransport, RateLimitConfig,
    TransportError, TransportEvent,
};
pub use runner::{ProductionRunner, ProductionRunnerBuilder, RunnerError, ShutdownHandle};
pub use telemetry::{init_logging, start_metrics_server, MetricsServer, TelemetryError};
pub use timers::TimerManager;
