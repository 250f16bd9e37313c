//! CLI module for addrctl
//!
//! Provides subcommands over a tenant snapshot:
//! - `addrctl reconcile` - Run a number of passes and print the result
//! - `addrctl run` - Run the background controller loop against the snapshot
//! - `addrctl validate` - Check every address against the plan catalog

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "addrctl")]
#[command(about = "Admit, place and garbage-collect messaging addresses")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the options file (default: ~/.addrctl/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to a .env file with controller options
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run reconciliation passes over a snapshot and print the outcome
    Reconcile(ReconcileArgs),

    /// Run the controller loop over a snapshot until interrupted
    Run(RunArgs),

    /// Validate every address of a snapshot without placing anything
    Validate(ValidateArgs),
}

/// Output format for command results
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Yaml,
    Json,
}

/// Arguments for the reconcile command
#[derive(Parser, Debug)]
pub struct ReconcileArgs {
    /// Snapshot file (YAML or JSON)
    pub snapshot: PathBuf,

    /// Number of passes to run
    #[arg(short, long, default_value = "1")]
    pub passes: u32,

    /// Report created and scaled units ready as soon as they exist
    #[arg(long)]
    pub ready: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Snapshot file (YAML or JSON)
    pub snapshot: PathBuf,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Output format of the final state
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Snapshot file (YAML or JSON)
    pub snapshot: PathBuf,
}
