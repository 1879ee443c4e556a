//! Configuration parsing for benchmark scenarios.

use grouper::models::SizePolicy;
use grouper::services::{AnnealingSchedule, Strategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// Strategy selector as written in scenario files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyName {
    Random,
    Sampling,
    Annealing,
}

impl std::fmt::Display for StrategyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::Sampling => write!(f, "sampling"),
            Self::Annealing => write!(f, "annealing"),
        }
    }
}

/// Strategy tuning shared by every run of a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// K for repeated sampling
    #[serde(default = "default_sampling_attempts")]
    pub sampling_attempts: usize,
    /// Annealing iterations
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Starting temperature
    #[serde(default = "default_initial_temperature")]
    pub initial_temperature: f64,
    /// Temperature multiplier per iteration
    #[serde(default = "default_cooling_rate")]
    pub cooling_rate: f64,
}

fn default_sampling_attempts() -> usize {
    500
}

fn default_iterations() -> usize {
    1000
}

fn default_initial_temperature() -> f64 {
    100.0
}

fn default_cooling_rate() -> f64 {
    0.95
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            sampling_attempts: default_sampling_attempts(),
            iterations: default_iterations(),
            initial_temperature: default_initial_temperature(),
            cooling_rate: default_cooling_rate(),
        }
    }
}

/// Benchmark scenario configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Scenario name
    pub name: String,
    /// Scenario description
    #[serde(default)]
    pub description: String,
    /// Roster size
    #[serde(default = "default_students")]
    pub students: usize,
    /// Target group size
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    /// Remainder handling
    #[serde(default)]
    pub size_policy: SizePolicy,
    /// Past rounds simulated to build the pairing history
    #[serde(default = "default_history_rounds")]
    pub history_rounds: usize,
    /// Runs per strategy, one seed each
    #[serde(default = "default_seeds")]
    pub seeds: u64,
    /// Strategies to compare
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyName>,
    /// Strategy tuning
    #[serde(default)]
    pub tuning: TuningConfig,
}

fn default_students() -> usize {
    24
}

fn default_group_size() -> usize {
    4
}

fn default_history_rounds() -> usize {
    6
}

fn default_seeds() -> u64 {
    50
}

fn default_strategies() -> Vec<StrategyName> {
    vec![
        StrategyName::Random,
        StrategyName::Sampling,
        StrategyName::Annealing,
    ]
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: "Default benchmark scenario".to_string(),
            students: default_students(),
            group_size: default_group_size(),
            size_policy: SizePolicy::default(),
            history_rounds: default_history_rounds(),
            seeds: default_seeds(),
            strategies: default_strategies(),
            tuning: TuningConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ScenarioConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the engine would refuse anyway
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_size == 0 {
            return Err(ConfigError::Invalid("group_size must be at least 1".into()));
        }
        if self.seeds == 0 {
            return Err(ConfigError::Invalid("seeds must be at least 1".into()));
        }
        if self.strategies.is_empty() {
            return Err(ConfigError::Invalid("no strategies listed".into()));
        }
        if !(self.tuning.cooling_rate > 0.0 && self.tuning.cooling_rate < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "cooling_rate {} is outside (0, 1)",
                self.tuning.cooling_rate
            )));
        }
        Ok(())
    }

    /// Engine strategy for a scenario entry
    pub fn strategy(&self, name: StrategyName) -> Strategy {
        match name {
            StrategyName::Random => Strategy::Random,
            StrategyName::Sampling => Strategy::Sampling {
                attempts: self.tuning.sampling_attempts,
            },
            StrategyName::Annealing => Strategy::Annealing(AnnealingSchedule {
                iterations: self.tuning.iterations,
                initial_temperature: self.tuning.initial_temperature,
                cooling_rate: self.tuning.cooling_rate,
            }),
        }
    }

    /// A small seminar with a short history
    pub fn seminar() -> Self {
        Self {
            name: "seminar".to_string(),
            description: "12 students in pairs after 4 past rounds".to_string(),
            students: 12,
            group_size: 2,
            history_rounds: 4,
            seeds: 100,
            ..Default::default()
        }
    }

    /// A typical class
    pub fn classroom() -> Self {
        Self {
            name: "classroom".to_string(),
            description: "30 students in fours after a term of rounds".to_string(),
            students: 30,
            group_size: 4,
            history_rounds: 10,
            seeds: 50,
            ..Default::default()
        }
    }

    /// A large lecture where every strategy has to work hard
    pub fn lecture() -> Self {
        Self {
            name: "lecture".to_string(),
            description: "120 students in fives, oversize groups, long history".to_string(),
            students: 120,
            group_size: 5,
            size_policy: SizePolicy::PreferOversize,
            history_rounds: 20,
            seeds: 20,
            tuning: TuningConfig {
                iterations: 5000,
                cooling_rate: 0.995,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Get a predefined scenario by name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "seminar" => Some(Self::seminar()),
            "classroom" => Some(Self::classroom()),
            "lecture" => Some(Self::lecture()),
            _ => None,
        }
    }
}
