//! Benchmark runner comparing partition strategies.

use crate::config::{ScenarioConfig, StrategyName};
use crate::report::{BenchmarkResults, StrategyResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use colored::Colorize;
use grouper::error::EngineError;
use grouper::models::{PairKey, PairStats};
use grouper::services::{PairingMap, PartitionRequest, Partitioner, Strategy};
use hdrhistogram::Histogram;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;
use thiserror::Error;

/// Seed for the synthetic history, fixed so every strategy sees the same class
const HISTORY_SEED: u64 = 0x5EED_CAFE;

/// Runner errors
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Histogram error: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
    #[error("Histogram record error: {0}")]
    Record(#[from] hdrhistogram::RecordError),
    #[error("Progress template error: {0}")]
    Template(#[from] indicatif::style::TemplateError),
}

/// Cost and latency samples for one strategy
#[derive(Debug)]
pub struct Samples {
    pub costs: Vec<i64>,
    /// Latency in microseconds
    pub latency: Histogram<u64>,
}

impl Samples {
    fn new() -> Result<Self, RunnerError> {
        Ok(Self {
            costs: Vec::new(),
            latency: Histogram::new_with_bounds(1, 60_000_000, 3)?,
        })
    }
}

/// Benchmark runner
pub struct BenchmarkRunner {
    config: ScenarioConfig,
    student_ids: Vec<i32>,
    history: PairingMap,
    now: DateTime<Utc>,
}

impl BenchmarkRunner {
    /// Create a new benchmark runner, simulating the scenario's past rounds
    pub fn new(config: ScenarioConfig) -> Result<Self, RunnerError> {
        let student_ids: Vec<i32> = (1..=config.students as i32).collect();
        let now = Utc::now();
        let history = synthetic_history(&config, &student_ids, now)?;

        Ok(Self {
            config,
            student_ids,
            history,
            now,
        })
    }

    /// Number of distinct pairs in the simulated history
    pub fn history_pairs(&self) -> usize {
        self.history.len()
    }

    /// Runs every strategy over every seed
    pub fn run(&self) -> Result<BenchmarkResults, RunnerError> {
        println!(
            "{} {} students, groups of {}, {} past rounds ({} known pairs)",
            "Scenario:".bold(),
            self.config.students,
            self.config.group_size,
            self.config.history_rounds,
            self.history_pairs()
        );

        let started = Instant::now();
        let mut results = Vec::with_capacity(self.config.strategies.len());
        for &name in &self.config.strategies {
            let samples = self.run_strategy(name)?;
            results.push(StrategyResult::from_samples(name, &samples));
        }

        Ok(BenchmarkResults::new(
            &self.config,
            self.history_pairs(),
            results,
            started.elapsed(),
        ))
    }

    fn run_strategy(&self, name: StrategyName) -> Result<Samples, RunnerError> {
        let partitioner = Partitioner::new(self.config.strategy(name));
        let request = PartitionRequest::new(&self.student_ids, self.config.group_size, self.now)
            .with_policy(self.config.size_policy)
            .with_pairings(&self.history);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:>10} [{bar:40.green}] {pos}/{len} seeds")?
            .progress_chars("=> ");
        let pb = ProgressBar::new(self.config.seeds);
        pb.set_style(style);
        pb.set_message(name.to_string());

        let mut samples = Samples::new()?;
        for seed in 0..self.config.seeds {
            let mut rng = StdRng::seed_from_u64(seed);
            let start = Instant::now();
            let partition = partitioner.partition(&request, &mut rng)?;
            let elapsed_us = start.elapsed().as_micros() as u64;

            samples.latency.record(elapsed_us.max(1))?;
            samples.costs.push(partition.cost);
            pb.inc(1);
        }

        pb.finish_with_message(name.to_string());
        Ok(samples)
    }
}

/// Pairing history from `history_rounds` random weekly rounds ending yesterday
fn synthetic_history(
    config: &ScenarioConfig,
    student_ids: &[i32],
    now: DateTime<Utc>,
) -> Result<PairingMap, RunnerError> {
    let mut map = PairingMap::new();
    let mut rng = StdRng::seed_from_u64(HISTORY_SEED);
    let partitioner = Partitioner::new(Strategy::Random);

    for round in 0..config.history_rounds {
        let weeks_ago = (config.history_rounds - round) as i64;
        let when = now - ChronoDuration::days(7 * weeks_ago - 6);
        let request = PartitionRequest::new(student_ids, config.group_size, when)
            .with_policy(config.size_policy);
        let partition = partitioner.partition(&request, &mut rng)?;

        for group in &partition.groups {
            for (i, &a) in group.members.iter().enumerate() {
                for &b in &group.members[i + 1..] {
                    map.record(
                        PairKey::new(a, b),
                        PairStats {
                            count: 1,
                            last_paired: Some(when),
                        },
                    );
                }
            }
        }
    }

    Ok(map)
}
