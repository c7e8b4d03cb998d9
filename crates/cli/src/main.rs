//! Atrium CLI
//!
//! Inspect a plan configuration, evaluate upload admission offline and run
//! an in-memory walkthrough of the entitlement flows.

mod commands;

use std::path::PathBuf;

use atrium_entitlements::EntitlementsConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

/// Atrium CLI: plan entitlements and storage quotas.
#[derive(Parser, Debug)]
#[command(name = "atrium", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Built-in plans are used if absent.
    #[arg(long, env = "ATRIUM_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the configured plans and their limits.
    Plans,
    /// Show the AI model catalogue and which plans may use each model.
    Models(commands::models::ModelsArgs),
    /// Decide whether an upload would be admitted.
    Check(commands::check::CheckArgs),
    /// Run an in-memory walkthrough of uploads and plan changes.
    Simulate(commands::simulate::SimulateArgs),
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EntitlementsConfig> {
    let config = match path {
        Some(path) => EntitlementsConfig::from_file(path)?,
        None => EntitlementsConfig::default(),
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Plans => commands::plans::run(&config, &cli.format),
        Command::Models(args) => commands::models::run(&config, &args, &cli.format),
        Command::Check(args) => commands::check::run(&config, &args, &cli.format),
        Command::Simulate(args) => commands::simulate::run(config, &args, &cli.format).await,
    }
}
