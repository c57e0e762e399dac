//! Command-line interface definitions for arbiter-sim.

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use logging::LogArgs;

/// Command-line interface for the `arbiter-sim` binary.
#[derive(Parser, Debug)]
#[command(
    name = "arbiter-sim",
    about = "Replay focus arbitration scenarios",
    version
)]
pub struct Cli {
    /// Logging controls shared across workspace binaries.
    #[command(flatten)]
    pub log: LogArgs,

    /// What to do.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scenario file and print the transcript.
    Run(RunArgs),
    /// Print the effective arbiter configuration as RON.
    Config(ConfigArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Scenario file (RON).
    #[arg(value_name = "SCENARIO")]
    pub scenario: PathBuf,

    /// Optional arbiter configuration file (RON).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the configured drain timeout.
    #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub drain_timeout: Option<Duration>,

    /// Emit the transcript as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `config` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Optional arbiter configuration file (RON); defaults are shown without one.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
