use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::SizePolicy;
use crate::services::cost::{CostModel, DEFAULT_PAIR_WEIGHT, DEFAULT_RECENCY_WINDOW_DAYS};
use crate::services::partition::{
    AnnealingSchedule, Strategy, DEFAULT_MAX_ATTEMPTS, DEFAULT_SAMPLING_ATTEMPTS,
};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

/// Tuning knobs for group generation
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Target group size when the caller does not pass one
    pub group_size: usize,
    pub size_policy: SizePolicy,
    /// Strategy name: random, sampling or annealing
    pub strategy: StrategyKind,
    /// K for repeated sampling
    pub sampling_attempts: usize,
    pub annealing_iterations: usize,
    pub initial_temperature: f64,
    /// Multiplier applied to the temperature after every iteration, in (0, 1)
    pub cooling_rate: f64,
    /// Retry ceiling when rules are present
    pub max_attempts: usize,
    /// Cost added per previous pairing
    pub pair_weight: i64,
    /// Days during which a recent pairing carries an extra penalty
    pub recency_window_days: i64,
}

/// Strategy selector as it appears in configuration and on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Random,
    Sampling,
    Annealing,
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "sampling" | "sample" => Ok(Self::Sampling),
            "annealing" | "anneal" => Ok(Self::Annealing),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            engine: EngineConfig::from_env()?,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            group_size: 4,
            size_policy: SizePolicy::PreferUndersize,
            strategy: StrategyKind::Annealing,
            sampling_attempts: DEFAULT_SAMPLING_ATTEMPTS,
            annealing_iterations: 1000,
            initial_temperature: 100.0,
            cooling_rate: 0.95,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            pair_weight: DEFAULT_PAIR_WEIGHT,
            recency_window_days: DEFAULT_RECENCY_WINDOW_DAYS,
        }
    }
}

/// Reads `key` and parses it, falling back to `default` on absence or garbage
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Load engine configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let size_policy = match env::var("GROUPER_SIZE_POLICY") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::UnknownSizePolicy(v.clone()))?,
            Err(_) => defaults.size_policy,
        };

        let strategy = match env::var("GROUPER_STRATEGY") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.strategy,
        };

        let cooling_rate = env_or("GROUPER_COOLING_RATE", defaults.cooling_rate);
        if !(cooling_rate > 0.0 && cooling_rate < 1.0) {
            return Err(ConfigError::InvalidCoolingRate(cooling_rate));
        }

        let pair_weight = env_or("GROUPER_PAIR_WEIGHT", defaults.pair_weight);
        if pair_weight < 0 {
            return Err(ConfigError::NegativeWeight("GROUPER_PAIR_WEIGHT", pair_weight));
        }
        let recency_window_days =
            env_or("GROUPER_RECENCY_WINDOW_DAYS", defaults.recency_window_days);
        if recency_window_days < 0 {
            return Err(ConfigError::NegativeWeight(
                "GROUPER_RECENCY_WINDOW_DAYS",
                recency_window_days,
            ));
        }

        Ok(Self {
            group_size: env_or("GROUPER_GROUP_SIZE", defaults.group_size).max(1),
            size_policy,
            strategy,
            sampling_attempts: env_or("GROUPER_SAMPLING_ATTEMPTS", defaults.sampling_attempts),
            annealing_iterations: env_or(
                "GROUPER_ANNEALING_ITERATIONS",
                defaults.annealing_iterations,
            ),
            initial_temperature: env_or(
                "GROUPER_INITIAL_TEMPERATURE",
                defaults.initial_temperature,
            ),
            cooling_rate,
            max_attempts: env_or("GROUPER_MAX_ATTEMPTS", defaults.max_attempts),
            pair_weight,
            recency_window_days,
        })
    }

    /// Builds the partition strategy described by this configuration
    pub fn strategy(&self) -> Strategy {
        self.strategy_for(self.strategy)
    }

    /// Builds a strategy of the given kind using this configuration's tuning
    pub fn strategy_for(&self, kind: StrategyKind) -> Strategy {
        match kind {
            StrategyKind::Random => Strategy::Random,
            StrategyKind::Sampling => Strategy::Sampling {
                attempts: self.sampling_attempts,
            },
            StrategyKind::Annealing => Strategy::Annealing(AnnealingSchedule {
                iterations: self.annealing_iterations,
                initial_temperature: self.initial_temperature,
                cooling_rate: self.cooling_rate,
            }),
        }
    }

    /// Cost model weighted as configured
    pub fn cost_model(&self) -> CostModel {
        CostModel {
            pair_weight: self.pair_weight,
            recency_window_days: self.recency_window_days,
        }
    }
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            url,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: env_or("DATABASE_MIN_CONNECTIONS", 1),
            acquire_timeout: Duration::from_secs(env_or("DATABASE_ACQUIRE_TIMEOUT_SECS", 5)),
            idle_timeout: Duration::from_secs(env_or("DATABASE_IDLE_TIMEOUT_SECS", 600)),
            max_lifetime: Duration::from_secs(env_or("DATABASE_MAX_LIFETIME_SECS", 1800)),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("GROUPER_SIZE_POLICY must be one of even, oversize, undersize (got '{0}')")]
    UnknownSizePolicy(String),

    #[error("GROUPER_STRATEGY must be one of random, sampling, annealing (got '{0}')")]
    UnknownStrategy(String),

    #[error("GROUPER_COOLING_RATE must be strictly between 0 and 1 (got {0})")]
    InvalidCoolingRate(f64),

    #[error("{0} must not be negative (got {1})")]
    NegativeWeight(&'static str, i64),
}
