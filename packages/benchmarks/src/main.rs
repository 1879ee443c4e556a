//! Grouper Benchmark Tool
//!
//! Compares partition strategies on synthetic classes with a simulated pairing history.

mod config;
mod report;
mod runner;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::ScenarioConfig;
use runner::BenchmarkRunner;
use std::path::{Path, PathBuf};

/// Grouper Partition Benchmark Tool
#[derive(Parser)]
#[command(name = "grouper-bench")]
#[command(version = "0.1.0")]
#[command(about = "Benchmark suite for grouper partition strategies")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Scenario to run (seminar, classroom, lecture)
    #[arg(short, long, default_value = "classroom")]
    scenario: String,

    /// Path to custom scenario configuration file (TOML)
    #[arg(short = 'f', long)]
    config_file: Option<PathBuf>,

    /// Override the number of seeds per strategy
    #[arg(long)]
    seeds: Option<u64>,

    /// Output directory for results
    #[arg(short, long, default_value = "results")]
    output: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark scenario
    Run {
        /// Scenario name
        scenario: Option<String>,
    },

    /// List available scenarios
    List,

    /// Compare two benchmark results
    Compare {
        /// Path to first results file
        old: PathBuf,
        /// Path to second results file
        new: PathBuf,
    },

    /// Show results from a previous run
    Show {
        /// Path to results file (defaults to latest.json)
        path: Option<PathBuf>,
    },
}

fn print_banner() {
    println!(
        "{}",
        r#"
╔══════════════════════════════════════════════════════════════╗
║              Grouper Partition Benchmark Tool                ║
╚══════════════════════════════════════════════════════════════╝
"#
        .cyan()
    );
}

fn list_scenarios() {
    println!("{}", "Available Scenarios".yellow().bold());
    println!();

    for scenario in [
        ScenarioConfig::seminar(),
        ScenarioConfig::classroom(),
        ScenarioConfig::lecture(),
    ] {
        println!(
            "  {} - {}",
            scenario.name.cyan().bold(),
            scenario.description
        );
    }

    println!();
    println!(
        "{}",
        "Use --config-file to load a custom scenario from TOML".dimmed()
    );
}

fn run_benchmark(cli: &Cli) -> anyhow::Result<()> {
    let mut config = if let Some(ref config_file) = cli.config_file {
        println!(
            "{} {}",
            "Loading config from:".dimmed(),
            config_file.display()
        );
        ScenarioConfig::from_file(config_file)?
    } else if let Some(preset) = ScenarioConfig::from_name(&cli.scenario) {
        preset
    } else {
        anyhow::bail!(
            "Unknown scenario '{}'. Use `list` to see available scenarios.",
            cli.scenario
        );
    };

    if let Some(seeds) = cli.seeds {
        config.seeds = seeds;
        config.validate()?;
    }

    let runner = BenchmarkRunner::new(config)?;
    let results = runner.run()?;

    results.print_summary();

    let filepath = results.save(&cli.output)?;
    println!("\n{} {}", "Results saved to:".green(), filepath.cyan());

    Ok(())
}

fn load_results(path: &Path) -> anyhow::Result<report::BenchmarkResults> {
    if !path.exists() {
        anyhow::bail!("Results file not found: {}", path.display());
    }
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    print_banner();

    match cli.command.take() {
        Some(Commands::List) => {
            list_scenarios();
        }
        Some(Commands::Compare { old, new }) => {
            let old = load_results(&old)?;
            let new = load_results(&new)?;
            report::compare(&old, &new);
        }
        Some(Commands::Show { path }) => {
            let path = path.unwrap_or_else(|| cli.output.join("latest.json"));
            load_results(&path)?.print_summary();
        }
        Some(Commands::Run { scenario }) => {
            if let Some(s) = scenario {
                cli.scenario = s;
            }
            run_benchmark(&cli)?;
        }
        None => {
            run_benchmark(&cli)?;
        }
    }

    Ok(())
}
