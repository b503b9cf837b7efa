use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ht_data::load_dataset;
use ht_engine::{inspect, run, RunConfig};

#[derive(Parser)]
#[command(name = "hypertune")]
#[command(about = "Cross-validated Bayesian hyperparameter search")]
#[command(version)]
struct Cli {
    /// More output: progress lines and debug logging (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search hyperparameters on CSV data
    Run {
        /// Feature table (CSV with header)
        #[arg(long)]
        features: PathBuf,

        /// Target table (CSV with header)
        #[arg(long)]
        target: PathBuf,

        /// Run configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Results file; overrides `write_path` from the config
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the search domain a configuration resolves to
    Inspect {
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose > 0 { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            features,
            target,
            config,
            output,
            seed,
        } => cmd_run(&features, &target, &config, output.as_deref(), seed, cli.verbose),
        Commands::Inspect { config } => cmd_inspect(&config),
    }
}

fn cmd_run(
    features: &Path,
    target: &Path,
    config_path: &Path,
    output: Option<&Path>,
    seed: Option<u64>,
    verbose: u8,
) -> anyhow::Result<()> {
    let mut config = RunConfig::from_file(config_path)
        .with_context(|| format!("failed to load run config {}", config_path.display()))?
        .with_verbose(verbose);
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }

    let dataset = load_dataset(features, target).context("failed to load the dataset")?;
    let outcome = run(&config, &dataset, output).context("search failed")?;

    if let Some(path) = &outcome.saved_to {
        info!("Results written to {}", path.display());
    }
    let summary = serde_json::json!({
        "id": outcome.package.id,
        "best_params": outcome.package.best_params,
        "best_score": outcome.package.best_score,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_inspect(config_path: &Path) -> anyhow::Result<()> {
    let config = RunConfig::from_file(config_path)
        .with_context(|| format!("failed to load run config {}", config_path.display()))?;
    let inspection = inspect(&config).context("invalid search configuration")?;
    println!("{}", serde_json::to_string_pretty(&inspection)?);
    Ok(())
}
