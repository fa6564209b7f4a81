//! CLI argument parsing and command dispatch

mod synthetic;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use taskbatch_core::{BatchConfig, BatchStats, OrchestratorBuilder, ResultEntry};
use tokio_util::sync::CancellationToken;

pub use synthetic::SyntheticBatch;

/// taskbatch - Run keyed units of work concurrently with first-error cancellation
#[derive(Parser, Debug)]
#[command(name = "taskbatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a synthetic batch and print its results as JSON
    Run(RunArgs),
    /// Validate a batch configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Number of units of work to register
    #[arg(short, long, default_value = "10")]
    pub units: usize,

    /// Maximum number of concurrently executing units (0 = unbounded)
    #[arg(short, long)]
    pub pool_size: Option<usize>,

    /// Time each unit spends before returning, in milliseconds
    #[arg(short, long, default_value = "100")]
    pub delay_ms: u64,

    /// Key of a unit that returns an error
    #[arg(long)]
    pub fail_key: Option<String>,

    /// Key of a unit that panics
    #[arg(long)]
    pub panic_key: Option<String>,

    /// Per-unit time limit in milliseconds (0 = none)
    #[arg(short, long, default_value = "0")]
    pub timeout_ms: u64,

    /// Append every unit's result under one shared key instead of one key per unit
    #[arg(long)]
    pub multiple: bool,

    /// Keep running the batch after a unit fails
    #[arg(long)]
    pub no_cancel: bool,

    /// Path to a JSON batch configuration; flags override its values
    #[arg(short, long, env = "TASKBATCH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Printed summary of one batch
#[derive(Debug, Serialize)]
struct Report {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    results: BTreeMap<String, ResultEntry<Value>>,
    stats: BatchStats,
}

impl Cli {
    /// Dispatch the parsed command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => run_batch(args).await,
            Commands::Validate { config } => validate(&config),
        }
    }
}

/// Read a batch configuration from a JSON file
pub fn load_config(path: &Path) -> Result<BatchConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: BatchConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

impl RunArgs {
    /// Batch configuration from the config file, overridden by flags
    pub fn batch_config(&self) -> Result<BatchConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => BatchConfig::default(),
        };

        if let Some(pool_size) = self.pool_size {
            config.pool_size = pool_size;
        }
        if self.no_cancel {
            config.cancel_on_error = false;
        }

        Ok(config)
    }
}

async fn run_batch(args: RunArgs) -> Result<()> {
    let config = args.batch_config()?;
    let shutdown = CancellationToken::new();

    let mut orchestrator = OrchestratorBuilder::new()
        .config(config)
        .parent(&shutdown)
        .build::<Value>()?;

    SyntheticBatch::from_args(&args).register(&mut orchestrator)?;

    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling batch");
                shutdown.cancel();
            }
        })
    };

    let outcome = orchestrator.run().await;
    ctrl_c.abort();

    let stats = orchestrator.stats().clone();
    let report = Report {
        status: if outcome.is_ok() { "ok" } else { "error" },
        error: outcome.as_ref().err().map(ToString::to_string),
        results: orchestrator.into_results().into_iter().collect(),
        stats,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    outcome.context("Batch failed")
}

fn validate(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;

    println!("✓ {} is valid", path.display());
    println!(
        "  pool_size:       {}",
        if config.is_bounded() {
            config.pool_size.to_string()
        } else {
            "unbounded".to_string()
        }
    );
    println!("  cancel_on_error: {}", config.cancel_on_error);
    Ok(())
}
