//! suseq - replay and inspect ECU update sequences
//!
//! Loads a scenario (system topology plus scripted device behaviour), drives
//! the update sequence over it and prints what the state tracker recorded.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "suseq")]
#[command(author, version, about = "ECU update sequence tracker")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SUSEQ_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (default: table, or the config file value)
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the update sequence of a scenario and show the result
    Replay {
        /// Scenario file (YAML, JSON or TOML)
        scenario: PathBuf,

        /// Also list the progress of every file
        #[arg(long)]
        files: bool,
    },

    /// Validate a scenario and list its devices
    Check {
        /// Scenario file (YAML, JSON or TOML)
        scenario: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(cli.output, cli.no_color)?;

    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);

    match &cli.command {
        Commands::Replay { scenario, files } => {
            commands::replay(scenario, *files, &merged, &ctx)?;
        }

        Commands::Check { scenario } => {
            commands::check(scenario, &ctx)?;
        }
    }

    Ok(())
}
