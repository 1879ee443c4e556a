//! Unit tests for configuration parsing
//!
//! Tests environment variable parsing and default values.
//!
//! Note: These tests modify global environment variables and must run serially.

use grouper::config::{ConfigError, DatabaseConfig, EngineConfig, StrategyKind};
use grouper::models::SizePolicy;
use grouper::services::Strategy;
use serial_test::serial;

const ENGINE_VARS: [&str; 10] = [
    "GROUPER_GROUP_SIZE",
    "GROUPER_SIZE_POLICY",
    "GROUPER_STRATEGY",
    "GROUPER_SAMPLING_ATTEMPTS",
    "GROUPER_ANNEALING_ITERATIONS",
    "GROUPER_INITIAL_TEMPERATURE",
    "GROUPER_COOLING_RATE",
    "GROUPER_MAX_ATTEMPTS",
    "GROUPER_PAIR_WEIGHT",
    "GROUPER_RECENCY_WINDOW_DAYS",
];

fn clear_engine_vars() {
    for key in ENGINE_VARS {
        std::env::remove_var(key);
    }
}

// =============================================================================
// Engine Config Tests
// =============================================================================

#[test]
#[serial]
fn test_engine_config_defaults() {
    clear_engine_vars();

    let config = EngineConfig::from_env().unwrap();

    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.group_size, 4);
    assert_eq!(config.size_policy, SizePolicy::PreferUndersize);
    assert_eq!(config.strategy, StrategyKind::Annealing);
    assert_eq!(config.sampling_attempts, 500);
    assert_eq!(config.max_attempts, 10);
    assert_eq!(config.pair_weight, 10);
    assert_eq!(config.recency_window_days, 10);
}

#[test]
#[serial]
fn test_engine_config_custom_values() {
    clear_engine_vars();
    std::env::set_var("GROUPER_GROUP_SIZE", "3");
    std::env::set_var("GROUPER_SIZE_POLICY", "oversize");
    std::env::set_var("GROUPER_STRATEGY", "sampling");
    std::env::set_var("GROUPER_SAMPLING_ATTEMPTS", "40");
    std::env::set_var("GROUPER_PAIR_WEIGHT", "7");

    let config = EngineConfig::from_env().unwrap();

    assert_eq!(config.group_size, 3);
    assert_eq!(config.size_policy, SizePolicy::PreferOversize);
    assert_eq!(config.strategy(), Strategy::Sampling { attempts: 40 });
    assert_eq!(config.cost_model().pair_weight, 7);

    clear_engine_vars();
}

#[test]
#[serial]
fn test_engine_config_invalid_numbers_use_defaults() {
    clear_engine_vars();
    std::env::set_var("GROUPER_GROUP_SIZE", "four");
    std::env::set_var("GROUPER_ANNEALING_ITERATIONS", "-1");

    let config = EngineConfig::from_env().unwrap();

    assert_eq!(config.group_size, 4);
    assert_eq!(config.annealing_iterations, 1000);

    clear_engine_vars();
}

#[test]
#[serial]
fn test_engine_config_zero_group_size_is_raised_to_one() {
    clear_engine_vars();
    std::env::set_var("GROUPER_GROUP_SIZE", "0");

    let config = EngineConfig::from_env().unwrap();

    assert_eq!(config.group_size, 1);

    clear_engine_vars();
}

#[test]
#[serial]
fn test_engine_config_rejects_unknown_names() {
    clear_engine_vars();
    std::env::set_var("GROUPER_SIZE_POLICY", "sideways");
    assert!(matches!(
        EngineConfig::from_env(),
        Err(ConfigError::UnknownSizePolicy(_))
    ));

    clear_engine_vars();
    std::env::set_var("GROUPER_STRATEGY", "genetic");
    assert!(matches!(
        EngineConfig::from_env(),
        Err(ConfigError::UnknownStrategy(_))
    ));

    clear_engine_vars();
}

#[test]
#[serial]
fn test_engine_config_rejects_cooling_rate_outside_unit_interval() {
    for bad in ["1.0", "0", "1.5", "-0.2"] {
        clear_engine_vars();
        std::env::set_var("GROUPER_COOLING_RATE", bad);
        assert!(
            matches!(EngineConfig::from_env(), Err(ConfigError::InvalidCoolingRate(_))),
            "cooling rate {} accepted",
            bad
        );
    }
    clear_engine_vars();
}

#[test]
#[serial]
fn test_engine_config_rejects_negative_cost_weights() {
    for key in ["GROUPER_PAIR_WEIGHT", "GROUPER_RECENCY_WINDOW_DAYS"] {
        clear_engine_vars();
        std::env::set_var(key, "-3");
        match EngineConfig::from_env() {
            Err(ConfigError::NegativeWeight(name, value)) => {
                assert_eq!(name, key);
                assert_eq!(value, -3);
            }
            other => panic!("{} = -3 gave {:?}", key, other),
        }
    }

    clear_engine_vars();
    std::env::set_var("GROUPER_RECENCY_WINDOW_DAYS", "0");
    assert_eq!(EngineConfig::from_env().unwrap().recency_window_days, 0);

    clear_engine_vars();
}

#[test]
fn test_strategy_for_uses_engine_tuning() {
    let config = EngineConfig {
        annealing_iterations: 250,
        cooling_rate: 0.9,
        ..EngineConfig::default()
    };

    match config.strategy_for(StrategyKind::Annealing) {
        Strategy::Annealing(schedule) => {
            assert_eq!(schedule.iterations, 250);
            assert_eq!(schedule.cooling_rate, 0.9);
            assert_eq!(schedule.initial_temperature, 100.0);
        }
        other => panic!("unexpected strategy {:?}", other),
    }
    assert_eq!(config.strategy_for(StrategyKind::Random), Strategy::Random);
}

#[test]
fn test_strategy_kind_parses_aliases() {
    assert_eq!("Anneal".parse::<StrategyKind>().unwrap(), StrategyKind::Annealing);
    assert_eq!(" random ".parse::<StrategyKind>().unwrap(), StrategyKind::Random);
    assert_eq!("sample".parse::<StrategyKind>().unwrap(), StrategyKind::Sampling);
}

// =============================================================================
// Database Config Tests
// =============================================================================

#[test]
#[serial]
fn test_database_config_requires_url() {
    std::env::remove_var("DATABASE_URL");

    assert!(matches!(
        DatabaseConfig::from_env(),
        Err(ConfigError::MissingDatabaseUrl)
    ));
}

#[test]
#[serial]
fn test_database_config_defaults() {
    std::env::set_var("DATABASE_URL", "postgres://localhost/grouper");
    std::env::remove_var("DATABASE_MAX_CONNECTIONS");
    std::env::remove_var("DATABASE_ACQUIRE_TIMEOUT_SECS");

    let config = DatabaseConfig::from_env().unwrap();

    assert_eq!(config.url, "postgres://localhost/grouper");
    assert_eq!(config.max_connections, 10);
    assert_eq!(config.acquire_timeout.as_secs(), 5);

    std::env::remove_var("DATABASE_URL");
}
