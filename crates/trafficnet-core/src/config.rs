// NETWORK CONFIGURATION
// Layered settings: serde defaults, optional file, TRAFFICNET__* environment
//
// SAFETY INVARIANTS:
// 1. A loaded configuration is validated before any topology is generated
// 2. Thresholds satisfy 0 <= medium < high
// 3. The capacity range is non-empty and positive

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::{genesis_timestamp, Thresholds};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Inclusive bounds for per-node capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityRange {
    pub min: f64,
    pub max: f64,
}

impl Default for CapacityRange {
    fn default() -> Self {
        CapacityRange { min: 100.0, max: 300.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Seed for topology, keys, simulation and validator draws
    pub seed: u64,

    pub node_count: usize,

    pub capacity_range: CapacityRange,

    /// Stake weight per successful validation (K)
    pub stake_multiplier: f64,

    /// Wall-clock budget for validator selection
    pub selection_timeout_ms: u64,

    /// Per-node telemetry cache depth
    pub cache_window: usize,

    pub thresholds: Thresholds,

    /// Accepted blocks between threshold optimizer runs
    pub optimization_period: usize,

    pub data_dir: PathBuf,

    /// Cap on upstream blocks processed per stage
    pub block_limit: Option<usize>,

    pub time_steps: usize,

    pub start_time: NaiveDateTime,

    pub monitor_interval_ms: u64,

    /// Sleep the simulated per-block budget in the real-time stage
    pub realtime_delay: bool,

    pub initial_bandwidth: f64,

    /// Node whose key signs genesis blocks. Defaults to the first node.
    pub genesis_issuer: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            seed: 42,
            node_count: 10,
            capacity_range: CapacityRange::default(),
            stake_multiplier: 10.0,
            selection_timeout_ms: 5000,
            cache_window: 4,
            thresholds: Thresholds::default(),
            optimization_period: 100,
            data_dir: PathBuf::from("result"),
            block_limit: None,
            time_steps: 40,
            start_time: genesis_timestamp(),
            monitor_interval_ms: 1000,
            realtime_delay: false,
            initial_bandwidth: 50.0,
            genesis_issuer: None,
        }
    }
}

impl NetworkConfig {
    /// Load defaults, then `path` (if given), then `TRAFFICNET__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("TRAFFICNET")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: NetworkConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 {
            return Err(ConfigError::Invalid("node_count must be at least 1".into()));
        }
        if !(self.capacity_range.min > 0.0 && self.capacity_range.min <= self.capacity_range.max) {
            return Err(ConfigError::Invalid(format!(
                "capacity_range [{}, {}] must be positive and ordered",
                self.capacity_range.min, self.capacity_range.max
            )));
        }
        if !(self.thresholds.medium >= 0.0 && self.thresholds.medium < self.thresholds.high) {
            return Err(ConfigError::Invalid(format!(
                "thresholds must satisfy 0 <= medium < high (got {}/{})",
                self.thresholds.medium, self.thresholds.high
            )));
        }
        if self.cache_window == 0 {
            return Err(ConfigError::Invalid("cache_window must be at least 1".into()));
        }
        if self.optimization_period == 0 {
            return Err(ConfigError::Invalid("optimization_period must be at least 1".into()));
        }
        if self.stake_multiplier < 0.0 {
            return Err(ConfigError::Invalid("stake_multiplier must be non-negative".into()));
        }
        Ok(())
    }

    /// Node ids in generation order: `Node_1` .. `Node_N`.
    pub fn node_ids(&self) -> Vec<String> {
        (1..=self.node_count).map(|i| format!("Node_{}", i)).collect()
    }

    /// The node whose key signs genesis blocks.
    pub fn genesis_signer(&self) -> String {
        self.genesis_issuer
            .clone()
            .unwrap_or_else(|| "Node_1".to_string())
    }
}
