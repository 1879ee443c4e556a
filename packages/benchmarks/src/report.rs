//! Benchmark report generation.

use crate::config::{ScenarioConfig, StrategyName};
use crate::runner::Samples;
use chrono::{DateTime, Utc};
use colored::Colorize;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Latency metrics in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// 50th percentile (median)
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// Maximum latency
    pub max: f64,
    /// Mean latency
    pub mean: f64,
}

/// Outcome of one strategy across all seeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub strategy: StrategyName,
    pub runs: usize,
    pub mean_cost: f64,
    pub min_cost: i64,
    pub max_cost: i64,
    /// Runs that avoided every repeated pair
    pub zero_cost_runs: usize,
    pub latency_ms: LatencyMetrics,
}

impl StrategyResult {
    pub fn from_samples(strategy: StrategyName, samples: &Samples) -> Self {
        let runs = samples.costs.len();
        let mean_cost = if runs > 0 {
            samples.costs.iter().sum::<i64>() as f64 / runs as f64
        } else {
            0.0
        };

        // Convert histogram values from microseconds to milliseconds
        let histogram = &samples.latency;
        let latency_ms = if histogram.len() > 0 {
            LatencyMetrics {
                p50: histogram.value_at_percentile(50.0) as f64 / 1000.0,
                p95: histogram.value_at_percentile(95.0) as f64 / 1000.0,
                p99: histogram.value_at_percentile(99.0) as f64 / 1000.0,
                max: histogram.max() as f64 / 1000.0,
                mean: histogram.mean() / 1000.0,
            }
        } else {
            LatencyMetrics::default()
        };

        Self {
            strategy,
            runs,
            mean_cost,
            min_cost: samples.costs.iter().copied().min().unwrap_or(0),
            max_cost: samples.costs.iter().copied().max().unwrap_or(0),
            zero_cost_runs: samples.costs.iter().filter(|&&c| c == 0).count(),
            latency_ms,
        }
    }
}

/// Scenario configuration summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub students: usize,
    pub group_size: usize,
    pub size_policy: String,
    pub history_rounds: usize,
    pub history_pairs: usize,
    pub seeds: u64,
}

/// Complete benchmark results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResults {
    /// Unique run identifier
    pub run_id: String,
    /// Timestamp of the run
    pub timestamp: DateTime<Utc>,
    /// Scenario name
    pub scenario: String,
    /// Configuration summary
    pub config: ConfigSummary,
    /// One entry per strategy, in scenario order
    pub strategies: Vec<StrategyResult>,
    /// Actual test duration
    pub actual_duration_secs: f64,
}

impl BenchmarkResults {
    /// Create new benchmark results from raw data
    pub fn new(
        config: &ScenarioConfig,
        history_pairs: usize,
        strategies: Vec<StrategyResult>,
        duration: Duration,
    ) -> Self {
        let run_id = format!(
            "{}-{}-{:03}",
            Utc::now().format("%Y%m%d"),
            config.name,
            rand::rng().random_range(0..1000u16)
        );

        Self {
            run_id,
            timestamp: Utc::now(),
            scenario: config.name.clone(),
            config: ConfigSummary {
                students: config.students,
                group_size: config.group_size,
                size_policy: config.size_policy.to_string(),
                history_rounds: config.history_rounds,
                history_pairs,
                seeds: config.seeds,
            },
            strategies,
            actual_duration_secs: duration.as_secs_f64(),
        }
    }

    /// Save results to a JSON file
    pub fn save(&self, output_dir: impl AsRef<Path>) -> std::io::Result<String> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)?;

        let filename = format!("{}.json", self.run_id);
        let filepath = output_dir.join(&filename);

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&filepath, &json)?;

        // Also save as latest.json for convenience
        let latest_path = output_dir.join("latest.json");
        fs::write(&latest_path, &json)?;

        Ok(filepath.to_string_lossy().to_string())
    }

    /// Cheapest strategy by mean cost, then by p99 latency
    pub fn best(&self) -> Option<&StrategyResult> {
        self.strategies.iter().min_by(|a, b| {
            a.mean_cost
                .total_cmp(&b.mean_cost)
                .then(a.latency_ms.p99.total_cmp(&b.latency_ms.p99))
        })
    }

    /// Print a summary to the console
    pub fn print_summary(&self) {
        println!("\n{}", "═".repeat(72).cyan());
        println!(
            "{} {}",
            "Benchmark Results:".bold(),
            self.scenario.cyan().bold()
        );
        println!(
            "{}",
            format!(
                "{} students, groups of {} ({}), {} past rounds, {} known pairs, {} seeds",
                self.config.students,
                self.config.group_size,
                self.config.size_policy,
                self.config.history_rounds,
                self.config.history_pairs,
                self.config.seeds
            )
            .dimmed()
        );
        println!("{}", "═".repeat(72).cyan());

        println!(
            "\n  {:<10} {:>10} {:>8} {:>8} {:>7} {:>10} {:>10} {:>10}",
            "strategy".yellow().bold(),
            "mean cost",
            "min",
            "max",
            "zero",
            "p50 ms",
            "p95 ms",
            "p99 ms"
        );

        let best = self.best().map(|b| b.strategy);
        for result in &self.strategies {
            let name = if Some(result.strategy) == best {
                result.strategy.to_string().green().bold()
            } else {
                result.strategy.to_string().white()
            };
            println!(
                "  {:<10} {:>10.1} {:>8} {:>8} {:>7} {:>10.3} {:>10.3} {:>10.3}",
                name,
                result.mean_cost,
                result.min_cost,
                result.max_cost,
                result.zero_cost_runs,
                result.latency_ms.p50,
                result.latency_ms.p95,
                result.latency_ms.p99
            );
        }

        println!("\n{}", "═".repeat(72).cyan());
        println!("{} {}", "Run ID:".dimmed(), self.run_id.dimmed());
        println!(
            "{} {}s",
            "Duration:".dimmed(),
            format!("{:.1}", self.actual_duration_secs).dimmed()
        );
        println!("{}", "═".repeat(72).cyan());
    }
}

/// Compare two benchmark results strategy by strategy
pub fn compare(old: &BenchmarkResults, new: &BenchmarkResults) {
    println!("\n{}", "═".repeat(60).cyan());
    println!(
        "{} {} {} {}",
        "Comparison:".bold(),
        old.run_id.dimmed(),
        "→".dimmed(),
        new.run_id.cyan()
    );
    println!("{}", "═".repeat(60).cyan());

    for new_result in &new.strategies {
        let Some(old_result) = old
            .strategies
            .iter()
            .find(|r| r.strategy == new_result.strategy)
        else {
            println!(
                "\n{} {}",
                new_result.strategy.to_string().yellow().bold(),
                "(new)".dimmed()
            );
            continue;
        };

        println!("\n{}", new_result.strategy.to_string().yellow().bold());
        println!(
            "  Mean cost:   {:.1} → {:.1} ({})",
            old_result.mean_cost,
            new_result.mean_cost,
            format_change(percent_change(old_result.mean_cost, new_result.mean_cost), false)
        );
        println!(
            "  Latency P99: {:.3}ms → {:.3}ms ({})",
            old_result.latency_ms.p99,
            new_result.latency_ms.p99,
            format_change(
                percent_change(old_result.latency_ms.p99, new_result.latency_ms.p99),
                false
            )
        );
    }

    println!("\n{}", "═".repeat(60).cyan());
}

fn percent_change(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        if new == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        (new - old) / old * 100.0
    }
}

/// Format percentage change with color
fn format_change(change: f64, higher_is_better: bool) -> colored::ColoredString {
    let formatted = format!("{:+.1}%", change);
    let is_improvement = if higher_is_better {
        change > 0.0
    } else {
        change < 0.0
    };

    if change.abs() < 1.0 {
        formatted.white()
    } else if is_improvement {
        formatted.green()
    } else {
        formatted.red()
    }
}
