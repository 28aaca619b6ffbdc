//! Pulsar devnet
//!
//! Runs a full roster of production runners in one process, connected by an
//! in-memory transport, and prints each pulse as it is agreed.
//!
//! # Usage
//!
//! ```bash
//! # Four pulsars for a minute with defaults
//! pulsar-devnet
//!
//! # From a config file, with metrics on :9090
//! pulsar-devnet --config devnet.toml --metrics-addr 127.0.0.1:9090
//! ```
//!
//! See [`DevnetConfig`] for the file format.

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::future::join_all;
use pulsar_production::{
    init_logging, start_metrics_server, ChannelBroadcaster, DevnetConfig, MemoryNetwork,
    ProductionRunner,
};
use pulsar_types::{
    Entropy, KeyPair, KeyType, PulseNumber, PulsarId, PulsarInfo, Roster,
    StaticNetworkCoordinator,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pulsar-devnet")]
#[command(version, about = "Run a local pulsar roster over an in-memory network")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the roster size
    #[arg(short = 'n', long)]
    pulsars: Option<u32>,

    /// Seconds to run before shutting down
    #[arg(short = 'd', long, default_value = "60")]
    duration: u64,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<String>,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

/// Deterministic Ed25519 key for pulsar `index`.
fn derive_key(seed: u64, index: u64) -> KeyPair {
    let mut seed_bytes = [0u8; 32];
    let key_seed = seed.wrapping_add(index).wrapping_mul(0x517cc1b727220a95);
    seed_bytes[..8].copy_from_slice(&key_seed.to_le_bytes());
    seed_bytes[8..16].copy_from_slice(&index.to_le_bytes());
    KeyPair::from_seed(KeyType::Ed25519, &seed_bytes)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DevnetConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DevnetConfig::default(),
    };
    if let Some(pulsars) = cli.pulsars {
        config.cluster.pulsars = pulsars;
    }
    if let Some(addr) = cli.metrics_addr {
        config.metrics.enabled = true;
        config.metrics.listen_addr = addr;
    }
    config.validate()?;

    init_logging(cli.log_level.as_deref())?;

    let metrics_server = if config.metrics.enabled {
        Some(start_metrics_server(config.metrics_addr()?).await?)
    } else {
        None
    };

    let keys: Vec<KeyPair> = (0..config.cluster.pulsars as u64)
        .map(|i| derive_key(config.cluster.seed, i))
        .collect();
    let roster = Roster::new(
        keys.iter()
            .enumerate()
            .map(|(i, key)| PulsarInfo {
                pulsar_id: PulsarId(i as u64),
                public_key: key.public_key(),
            })
            .collect(),
    )?;
    let network_coordinator = Arc::new(StaticNetworkCoordinator::new(roster));
    let network = MemoryNetwork::new();
    let (pulse_tx, mut pulses) = mpsc::unbounded_channel();

    let mut shutdowns = Vec::with_capacity(keys.len());
    let mut tasks = Vec::with_capacity(keys.len());
    for (i, key) in keys.into_iter().enumerate() {
        let mut runner = ProductionRunner::builder()
            .signing_key(key)
            .network_coordinator(network_coordinator.clone())
            .transport(network.connect(PulsarId(i as u64)))
            .config(config.pulsar_config())
            .broadcaster(ChannelBroadcaster::new(pulse_tx.clone()))
            .build()?;
        let Some(shutdown) = runner.shutdown_handle() else {
            bail!("runner {i} has no shutdown handle");
        };
        shutdowns.push(shutdown);
        tasks.push(tokio::spawn(runner.run()));
    }
    drop(pulse_tx);

    if let Some(server) = &metrics_server {
        server.set_ready(true);
    }
    info!(
        pulsars = config.cluster.pulsars,
        duration_secs = cli.duration,
        "Devnet running"
    );

    // Every pulsar publishes every pulse; print each number once and count
    // how many pulsars agreed on it.
    let mut seen: BTreeMap<PulseNumber, (Entropy, usize)> = BTreeMap::new();
    let deadline = tokio::time::sleep(Duration::from_secs(cli.duration));
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            Some(pulse) = pulses.recv() => {
                let entry = seen.entry(pulse.number).or_insert_with(|| {
                    println!(
                        "{:>6}  contributors={}  entropy={}",
                        pulse.number.0,
                        pulse.signatures.len(),
                        &pulse.entropy.to_hex()[..32],
                    );
                    (pulse.entropy, 0)
                });
                if entry.0 != pulse.entropy {
                    warn!(pulse = %pulse.number, "Pulsars published diverging entropy");
                }
                entry.1 += 1;
            }
        }
    }

    drop(shutdowns);
    for (i, result) in join_all(tasks).await.into_iter().enumerate() {
        match result {
            Ok(Ok(stats)) => info!(
                pulsar = i,
                published = stats.pulses_published,
                aborted = stats.rounds_aborted,
                "Runner finished"
            ),
            Ok(Err(e)) => warn!(pulsar = i, error = %e, "Runner failed"),
            Err(e) => warn!(pulsar = i, error = %e, "Runner task panicked"),
        }
    }

    let unanimous = seen
        .values()
        .filter(|(_, count)| *count == config.cluster.pulsars as usize)
        .count();
    println!();
    println!("Pulses:     {}", seen.len());
    println!("Unanimous:  {unanimous}");

    Ok(())
}
