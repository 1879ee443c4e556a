use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use grouper::config::{self, StrategyKind};
use grouper::db;
use grouper::error::EngineError;
use grouper::models::{CreateClass, CreateRule, SizePolicy, StudentId};
use grouper::services::{GenerateSettings, GroupingService};
use grouper::store::{ClassStore, PgStore, RuleStore};

/// Study-group generator
#[derive(Parser)]
#[command(name = "grouper")]
#[command(version)]
#[command(about = "Generates study groups that avoid repeating past pairings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// List classes
    Classes,

    /// Create a class
    CreateClass {
        #[arg(long)]
        name: String,
    },

    /// Add students to a class, one "First Last" per line
    ImportRoster {
        #[arg(long)]
        class: i32,

        /// Roster file; reads standard input when omitted or "-"
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Manage "never group together" rules
    Rule {
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Show the most recently saved round
    Latest {
        #[arg(long)]
        class: i32,
    },

    /// Price hand-arranged groups against the class history
    Score {
        #[arg(long)]
        class: i32,

        /// Comma-separated student ids of one group; repeat per group
        #[arg(long = "group", required = true)]
        groups: Vec<GroupArg>,
    },

    /// Generate groups for a class, optionally saving them
    Generate {
        #[arg(long)]
        class: i32,

        /// Target group size (defaults to GROUPER_GROUP_SIZE)
        #[arg(long)]
        size: Option<usize>,

        /// even, oversize or undersize
        #[arg(long)]
        policy: Option<SizePolicy>,

        /// random, sampling or annealing
        #[arg(long)]
        strategy: Option<StrategyKind>,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Save the round and record its pairings
        #[arg(long)]
        save: bool,
    },

    /// Forget all pairings, logs and rounds of a class
    ClearHistory {
        #[arg(long)]
        class: i32,
    },

    /// Show who a student has and has not been grouped with
    Summary {
        #[arg(long)]
        class: i32,

        #[arg(long)]
        student: i32,
    },
}

#[derive(Subcommand)]
enum RuleAction {
    /// Forbid two students from sharing a group
    Add {
        #[arg(long)]
        class: i32,

        #[arg(long)]
        a: i32,

        #[arg(long)]
        b: i32,
    },

    /// List the rules of a class
    List {
        #[arg(long)]
        class: i32,
    },

    /// Remove a rule
    Delete {
        #[arg(long)]
        class: i32,

        #[arg(long)]
        rule: i32,
    },
}

/// One group on the command line, e.g. `3,7,12`
#[derive(Debug, Clone, PartialEq)]
struct GroupArg(Vec<StudentId>);

impl FromStr for GroupArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let members = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<StudentId>()
                    .map_err(|_| format!("'{}' is not a student id", part))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if members.is_empty() {
            return Err("a group needs at least one student id".to_string());
        }
        Ok(GroupArg(members))
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let pool = db::create_pool(&config.database).await.map_err(|e| {
        log::error!("Database pool error: {}", e);
        std::io::Error::other(e.to_string())
    })?;
    if !db::health_check(&pool).await {
        log::warn!("Database did not answer the health check");
    }

    let store = Arc::new(PgStore::new(pool.clone()));
    let service = GroupingService::new(store.clone());

    let result = match cli.command {
        Commands::Migrate => db::run_migrations(&pool).await,

        Commands::Classes => match store.list_classes().await {
            Ok(classes) => print_json(&classes),
            Err(e) => Err(e),
        },

        Commands::CreateClass { name } => match store.create_class(CreateClass { name }).await {
            Ok(class) => print_json(&class),
            Err(e) => Err(e),
        },

        Commands::ImportRoster { class, file } => match read_roster(file) {
            Ok(text) => match service.import_roster(class, &text).await {
                Ok(students) => print_json(&students),
                Err(e) => Err(e),
            },
            Err(e) => {
                log::error!("Cannot read roster: {}", e);
                return Err(e);
            }
        },

        Commands::Rule { action } => rule(store.as_ref(), action).await,

        Commands::Latest { class } => match service.latest_round(class).await {
            Ok(Some(round)) => print_json(&round),
            Ok(None) => Err(EngineError::NotFound(format!(
                "Class {} has no saved rounds",
                class
            ))),
            Err(e) => Err(e),
        },

        Commands::Score { class, groups } => {
            let groups: Vec<Vec<StudentId>> = groups.into_iter().map(|g| g.0).collect();
            match service
                .score(class, &groups, &config.engine.cost_model(), Utc::now())
                .await
            {
                Ok(scored) => print_json(&scored),
                Err(e) => Err(e),
            }
        }

        Commands::Generate {
            class,
            size,
            policy,
            strategy,
            seed,
            save,
        } => {
            let mut settings = GenerateSettings::from_config(&config.engine, Utc::now());
            if let Some(size) = size {
                settings = settings.with_group_size(size);
            }
            if let Some(policy) = policy {
                settings = settings.with_policy(policy);
            }
            if let Some(kind) = strategy {
                settings = settings.with_strategy(config.engine.strategy_for(kind));
            }

            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_rng(&mut rand::rng()),
            };

            generate(&service, class, &settings, &mut rng, save).await
        }

        Commands::ClearHistory { class } => match service.clear_history(class).await {
            Ok(cleared) => print_json(&cleared),
            Err(e) => Err(e),
        },

        Commands::Summary { class, student } => {
            match service.student_summary(class, student).await {
                Ok(summary) => print_json(&summary),
                Err(e) => Err(e),
            }
        }
    };

    result.map_err(|e| {
        log::error!("{} ({})", e, e.kind());
        std::io::Error::other(e.to_string())
    })
}

async fn generate(
    service: &GroupingService,
    class_id: i32,
    settings: &GenerateSettings,
    rng: &mut StdRng,
    save: bool,
) -> Result<(), EngineError> {
    let partition = service.generate(class_id, settings, rng).await?;

    if save {
        let saved = service
            .save(class_id, &partition, settings.group_size, settings.now)
            .await?;
        print_json(&saved)
    } else {
        print_json(&partition)
    }
}

async fn rule(store: &PgStore, action: RuleAction) -> Result<(), EngineError> {
    match action {
        RuleAction::Add { class, a, b } => {
            let rule = store
                .add_rule(CreateRule {
                    class_id: class,
                    student_a: a,
                    student_b: b,
                })
                .await?;
            print_json(&rule)
        }
        RuleAction::List { class } => print_json(&store.list_rules(class).await?),
        RuleAction::Delete { class, rule } => {
            store.delete_rule(class, rule).await?;
            log::info!("Deleted rule {} from class {}", rule, class);
            Ok(())
        }
    }
}

fn read_roster(file: Option<PathBuf>) -> std::io::Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path),
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), EngineError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::InvalidArgument(format!("cannot encode output: {}", e)))?;
    println!("{}", out);
    Ok(())
}
