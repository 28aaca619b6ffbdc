//! TOML configuration for a devnet process.
//!
//! ```toml
//! [cluster]
//! pulsars = 4
//! seed = 42
//!
//! [consensus]
//! commit_timeout_ms = 2000
//! reveal_timeout_ms = 2000
//! endorse_timeout_ms = 2000
//! pulse_interval_ms = 10000
//!
//! [metrics]
//! enabled = true
//! listen_addr = "127.0.0.1:9090"
//! ```
//!
//! Every field has a default, so an empty file is a valid config.

use pulsar_consensus::PulsarConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level devnet configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevnetConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Roster size.
    #[serde(default = "default_pulsars")]
    pub pulsars: u32,

    /// Seed for key derivation. Keys are reproducible across runs.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            pulsars: default_pulsars(),
            seed: default_seed(),
        }
    }
}

fn default_pulsars() -> u32 {
    4
}

fn default_seed() -> u64 {
    42
}

/// Round timing, mirrored onto [`PulsarConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,

    #[serde(default = "default_reveal_timeout_ms")]
    pub reveal_timeout_ms: u64,

    #[serde(default = "default_endorse_timeout_ms")]
    pub endorse_timeout_ms: u64,

    #[serde(default = "default_pulse_interval_ms")]
    pub pulse_interval_ms: u64,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_first_round_delay_ms")]
    pub first_round_delay_ms: u64,

    #[serde(default = "default_broadcast_vector")]
    pub broadcast_vector: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            commit_timeout_ms: default_commit_timeout_ms(),
            reveal_timeout_ms: default_reveal_timeout_ms(),
            endorse_timeout_ms: default_endorse_timeout_ms(),
            pulse_interval_ms: default_pulse_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            first_round_delay_ms: default_first_round_delay_ms(),
            broadcast_vector: default_broadcast_vector(),
        }
    }
}

fn default_commit_timeout_ms() -> u64 {
    2_000
}

fn default_reveal_timeout_ms() -> u64 {
    2_000
}

fn default_endorse_timeout_ms() -> u64 {
    2_000
}

fn default_pulse_interval_ms() -> u64 {
    10_000
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_first_round_delay_ms() -> u64 {
    1_000
}

fn default_broadcast_vector() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9090".to_string()
}

impl DevnetConfig {
    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: DevnetConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.pulsars == 0 {
            return Err(ConfigError::Invalid("cluster.pulsars must be at least 1".into()));
        }
        let c = &self.consensus;
        if c.commit_timeout_ms == 0 || c.reveal_timeout_ms == 0 || c.endorse_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "commit, reveal and endorse timeouts must be non-zero".into(),
            ));
        }
        // A round must fit inside the interval or the next one opens early.
        let round_ms = c
            .commit_timeout_ms
            .saturating_add(c.reveal_timeout_ms)
            .saturating_add(c.endorse_timeout_ms);
        if c.pulse_interval_ms < round_ms {
            return Err(ConfigError::Invalid(format!(
                "consensus.pulse_interval_ms ({}) is shorter than a full round ({})",
                c.pulse_interval_ms, round_ms
            )));
        }
        if self.metrics.enabled {
            self.metrics_addr()?;
        }
        Ok(())
    }

    /// Round parameters for every coordinator in the cluster.
    pub fn pulsar_config(&self) -> PulsarConfig {
        let c = &self.consensus;
        PulsarConfig::default()
            .with_commit_timeout(Duration::from_millis(c.commit_timeout_ms))
            .with_reveal_timeout(Duration::from_millis(c.reveal_timeout_ms))
            .with_endorse_timeout(Duration::from_millis(c.endorse_timeout_ms))
            .with_pulse_interval(Duration::from_millis(c.pulse_interval_ms))
            .with_retry_delay(Duration::from_millis(c.retry_delay_ms))
            .with_first_round_delay(Duration::from_millis(c.first_round_delay_ms))
            .with_broadcast_vector(c.broadcast_vector)
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.metrics.listen_addr.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "metrics.listen_addr '{}' is not a socket address",
                self.metrics.listen_addr
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DevnetConfig::from_toml_str("").unwrap();

        assert_eq!(config.cluster.pulsars, 4);
        assert!(!config.metrics.enabled);

        let pulsar = config.pulsar_config();
        let defaults = PulsarConfig::default();
        assert_eq!(pulsar.commit_timeout, defaults.commit_timeout);
        assert_eq!(pulsar.pulse_interval, defaults.pulse_interval);
        assert_eq!(pulsar.endorse_timeout, defaults.endorse_timeout);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = DevnetConfig::from_toml_str(
            r#"
            [cluster]
            pulsars = 7
            seed = 9

            [consensus]
            commit_timeout_ms = 300
            reveal_timeout_ms = 400
            endorse_timeout_ms = 250
            pulse_interval_ms = 1000
            broadcast_vector = false

            [metrics]
            enabled = true
            listen_addr = "0.0.0.0:9100"
            "#,
        )
        .unwrap();

        assert_eq!(config.cluster.pulsars, 7);
        assert_eq!(config.cluster.seed, 9);

        let pulsar = config.pulsar_config();
        assert_eq!(pulsar.commit_timeout, Duration::from_millis(300));
        assert_eq!(pulsar.reveal_timeout, Duration::from_millis(400));
        assert_eq!(pulsar.endorse_timeout, Duration::from_millis(250));
        assert_eq!(pulsar.pulse_interval, Duration::from_secs(1));
        assert!(!pulsar.broadcast_vector);
        assert_eq!(config.metrics_addr().unwrap().port(), 9100);
    }

    #[test]
    fn test_interval_shorter_than_round_rejected() {
        let result = DevnetConfig::from_toml_str(
            r#"
            [consensus]
            commit_timeout_ms = 800
            reveal_timeout_ms = 800
            pulse_interval_ms = 1000
            "#,
        );

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_endorse_window_counts_toward_round() {
        let result = DevnetConfig::from_toml_str(
            r#"
            [consensus]
            commit_timeout_ms = 400
            reveal_timeout_ms = 400
            endorse_timeout_ms = 400
            pulse_interval_ms = 1000
            "#,
        );

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_metrics_addr_rejected_when_enabled() {
        let result = DevnetConfig::from_toml_str(
            r#"
            [metrics]
            enabled = true
            listen_addr = "not-an-addr"
            "#,
        );

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unparseable_toml() {
        assert!(matches!(
            DevnetConfig::from_toml_str("[cluster\npulsars = "),
            Err(ConfigError::Parse(_))
        ));
    }
}
