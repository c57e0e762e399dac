#![warn(missing_docs)]

//! Entry point for the `arbiter-sim` binary.

mod cli;
mod error;
mod scenario;

use std::{io, path::Path, process};

use clap::Parser;
use focus_arbiter::ArbiterCfg;
use ron::ser::{PrettyConfig, to_string_pretty};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, registry};

use crate::{
    cli::{Cli, Commands, ConfigArgs, RunArgs},
    error::Result,
    scenario::{Scenario, Simulator},
};

fn main() {
    if let Err(err) = run() {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Parse CLI arguments, install logging, and dispatch to the chosen subcommand.
fn run() -> Result<()> {
    let Cli { log, command } = Cli::parse();
    let log_spec = log.spec();
    let env_filter = logging::env_filter_from_spec(&log_spec);
    registry()
        .with(env_filter)
        .with(fmt::layer().without_time().with_writer(io::stderr))
        .try_init()
        .ok();

    match command {
        Commands::Run(args) => run_scenario(&args),
        Commands::Config(args) => show_config(&args),
    }
}

/// Load the arbiter configuration, or the defaults when no file is given.
fn load_config(path: Option<&Path>) -> Result<ArbiterCfg> {
    Ok(match path {
        Some(path) => ArbiterCfg::load(path)?,
        None => ArbiterCfg::default(),
    })
}

/// Replay a scenario and print its report.
fn run_scenario(args: &RunArgs) -> Result<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    if let Some(timeout) = args.drain_timeout {
        cfg.drain_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    }
    let scenario = Scenario::load(&args.scenario)?;
    let report = Simulator::new(cfg)?.run(&scenario)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

/// Print the effective configuration.
fn show_config(args: &ConfigArgs) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    println!("{}", to_string_pretty(&cfg, PrettyConfig::default())?);
    Ok(())
}
