// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Strata Node
//!
//! Entry point for the `strata-node` binary. Parses CLI arguments,
//! initializes logging, loads the node configuration and drives the
//! ledger.
//!
//! The binary supports four subcommands:
//!
//! - `init`    — write a default configuration file
//! - `run`     — replay a script of operations and print a JSON report
//! - `inspect` — print the genesis state a configuration produces
//! - `version` — print build version information

mod cli;
mod config;
mod logging;
mod script;

use anyhow::{bail, Context, Result};
use clap::Parser;
use strata_protocol::{Clock, SystemClock};

use cli::{Commands, StrataNodeCli};
use config::NodeConfig;
use logging::LogFormat;
use script::Runner;

const DEFAULT_LOG_FILTER: &str = "strata_node=info,strata_protocol=info,strata_contracts=info";

fn main() -> Result<()> {
    let cli = StrataNodeCli::parse();

    match cli.command {
        Commands::Init(args) => init_config(args),
        Commands::Run(args) => run_script(args),
        Commands::Inspect(args) => inspect(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Writes a default configuration file.
fn init_config(args: cli::InitArgs) -> Result<()> {
    logging::init_logging(DEFAULT_LOG_FILTER, LogFormat::Pretty);

    if args.config.exists() && !args.force {
        bail!(
            "{} already exists (pass --force to overwrite)",
            args.config.display()
        );
    }
    let config = NodeConfig::default();
    config.save(&args.config)?;
    tracing::info!(path = %args.config.display(), "configuration written");

    println!("Configuration written.");
    println!("  Path        : {}", args.config.display());
    println!("  Super-admin : {}", config.super_admin);
    println!("  Chain id    : {}", config.chain_id);
    Ok(())
}

/// Replays a script and prints the report to stdout.
fn run_script(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(DEFAULT_LOG_FILTER, LogFormat::from_str_lossy(&args.log_format));

    let config = NodeConfig::load(&args.config)?;
    let commands = script::load_script(&args.script)?;
    let start = args.start_time.unwrap_or_else(|| SystemClock.now());

    tracing::info!(
        config = %args.config.display(),
        script = %args.script.display(),
        steps = commands.len(),
        start,
        "starting replay"
    );

    let runner = Runner::new(&config, start)?;
    let report = runner.run(&commands, args.fail_fast);
    let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
    println!("{json}");

    if args.fail_fast && report.failures() > 0 {
        bail!("replay stopped at step {}", report.steps.len() - 1);
    }
    Ok(())
}

/// Prints the genesis report for a configuration.
fn inspect(args: cli::InspectArgs) -> Result<()> {
    logging::init_logging(DEFAULT_LOG_FILTER, LogFormat::Pretty);

    let config = NodeConfig::load(&args.config)?;
    let runner = Runner::new(&config, SystemClock.now())?;
    let json = serde_json::to_string_pretty(&runner.report(Vec::new()))
        .context("failed to encode report")?;
    println!("{json}");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("strata-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
