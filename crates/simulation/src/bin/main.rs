//! Pulsar Deterministic Simulator CLI
//!
//! Runs a roster of pulsars over a simulated network and prints the pulses
//! each one published.
//!
//! # Example
//!
//! ```bash
//! # Seven pulsars for two minutes
//! pulsar-sim --pulsars 7 --duration 120
//!
//! # One pulsar withholds its reveals, another corrupts them
//! pulsar-sim --withhold 3 --corrupt 1 --packet-loss 0.02
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use pulsar_consensus::PulsarConfig;
use pulsar_simulation::{NetworkConfig, NodeIndex, PulsarBehavior, SimulationRunner};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pulsar Deterministic Simulator
///
/// Given the same seed, produces identical pulses every run.
#[derive(Parser, Debug)]
#[command(name = "pulsar-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of pulsars in the roster
    #[arg(short = 'n', long, default_value = "4")]
    pulsars: u32,

    /// Simulated duration in seconds
    #[arg(short = 'd', long, default_value = "60")]
    duration: u64,

    /// Random seed for deterministic simulation
    #[arg(long, default_value = "42")]
    seed: u64,

    /// One-way network latency in milliseconds
    #[arg(long, default_value = "150")]
    latency_ms: u64,

    /// Packet loss rate (0.0-1.0)
    #[arg(long, default_value = "0.0")]
    packet_loss: f64,

    /// Seconds between a published pulse and the next round
    #[arg(long, default_value = "10")]
    pulse_interval: u64,

    /// Pulsars that send nothing
    #[arg(long, value_delimiter = ',')]
    silent: Vec<NodeIndex>,

    /// Pulsars that commit but never reveal
    #[arg(long, value_delimiter = ',')]
    withhold: Vec<NodeIndex>,

    /// Pulsars that reveal entropy not matching their commitment
    #[arg(long, value_delimiter = ',')]
    corrupt: Vec<NodeIndex>,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,pulsar_simulation=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let faulty = [
        (&args.silent, PulsarBehavior::Silent),
        (&args.withhold, PulsarBehavior::WithholdReveal),
        (&args.corrupt, PulsarBehavior::CorruptReveal),
    ];
    for (nodes, behavior) in &faulty {
        if let Some(node) = nodes.iter().find(|&&node| node >= args.pulsars) {
            bail!("{:?} pulsar {} is outside the roster", behavior, node);
        }
    }

    info!(
        pulsars = args.pulsars,
        duration_secs = args.duration,
        seed = args.seed,
        packet_loss = args.packet_loss,
        "Starting simulation"
    );

    let network = NetworkConfig {
        num_pulsars: args.pulsars,
        latency: Duration::from_millis(args.latency_ms),
        packet_loss_rate: args.packet_loss.clamp(0.0, 1.0),
        ..Default::default()
    };
    let config =
        PulsarConfig::default().with_pulse_interval(Duration::from_secs(args.pulse_interval));

    let mut runner = SimulationRunner::with_pulsar_config(network, config, args.seed)
        .context("failed to build simulation")?;
    for (nodes, behavior) in &faulty {
        for &node in nodes.iter() {
            runner.set_behavior(node, *behavior);
        }
    }

    runner.start();
    runner.run_until(Duration::from_secs(args.duration));

    println!("\n=== Simulation Complete ===");
    for node in 0..args.pulsars {
        let published = runner.published(node);
        println!(
            "pulsar {:>3} {:<14} published {:>4}  aborted {:>4}{}",
            node,
            format!("{:?}", runner.behavior(node)),
            published.len(),
            runner.aborted(node).len(),
            if runner.is_halted(node) { "  HALTED" } else { "" },
        );
    }

    println!("\n=== Pulses (pulsar 0) ===");
    for pulse in runner.published(0) {
        let contributors: Vec<String> = pulse.contributors().map(|p| p.0.to_string()).collect();
        println!(
            "#{:<5} {}…  [{}]",
            pulse.number.0,
            &pulse.entropy.to_hex()[..16],
            contributors.join(",")
        );
    }

    let stats = runner.stats();
    println!("\n=== Network ===");
    println!("Events:     {}", stats.events_processed);
    println!("Sent:       {}", stats.messages_sent);
    println!("Dropped:    {}", stats.messages_dropped());
    println!("Suppressed: {}", stats.messages_suppressed);
    println!("Rejected:   {}", stats.envelopes_rejected);
    println!("Delivery:   {:.2}%", stats.delivery_rate() * 100.0);

    Ok(())
}
