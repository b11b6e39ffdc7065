//! # CLI Interface
//!
//! `strata-node` argument structure, `clap` derive. Subcommands: `init`,
//! `run`, `inspect` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strata ledger host.
///
/// Loads a node configuration, builds the shared ledger state and replays
/// scripted operations against it.
#[derive(Parser, Debug)]
#[command(
    name = "strata-node",
    about = "Strata hierarchical token ledger host",
    version,
    propagate_version = true
)]
pub struct StrataNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file.
    Init(InitArgs),
    /// Replay a script of operations and print the resulting report.
    Run(RunArgs),
    /// Load a configuration and print the genesis state it produces.
    Inspect(InspectArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the configuration file (TOML).
    #[arg(long, short = 'c', env = "STRATA_CONFIG", default_value = "strata.toml")]
    pub config: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    #[arg(long, short = 'c', env = "STRATA_CONFIG", default_value = "strata.toml")]
    pub config: PathBuf,

    /// JSON array of operations to apply in order.
    #[arg(long, short = 's')]
    pub script: PathBuf,

    /// Unix time the replay clock starts at. Defaults to now.
    #[arg(long)]
    pub start_time: Option<u64>,

    /// Stop at the first failing step instead of logging and continuing.
    #[arg(long)]
    pub fail_fast: bool,

    /// Log format: "pretty" or "json".
    #[arg(long, env = "STRATA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `inspect` subcommand.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Path to the node configuration file (TOML).
    #[arg(long, short = 'c', env = "STRATA_CONFIG", default_value = "strata.toml")]
    pub config: PathBuf,
}
