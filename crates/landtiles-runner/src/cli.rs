//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use landtiles_core::StateCode;
use std::path::PathBuf;

/// Download raster tiles (DTM, DSM, DOP) from the German federal states.
#[derive(Debug, Parser)]
#[command(name = "landtiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins if set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Derive, reconcile, plan and download.
    Run(RunArgs),
    /// Derive, reconcile and plan; download nothing.
    Plan(RunArgs),
}

impl Command {
    /// Arguments of the subcommand.
    pub fn args(&self) -> &RunArgs {
        match self {
            Command::Run(args) | Command::Plan(args) => args,
        }
    }

    /// Whether tiles are to be downloaded.
    pub fn downloads(&self) -> bool {
        match self {
            Command::Run(args) => !args.dry_run,
            Command::Plan(_) => false,
        }
    }
}

/// Arguments shared by `run` and `plan`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Init file (JSON or YAML).
    #[arg(long, value_name = "FILE")]
    pub init: PathBuf,

    /// Sources file with the per-state tile grids and links (JSON or YAML).
    #[arg(long, value_name = "FILE")]
    pub sources: PathBuf,

    /// Only process these states (codes or names, comma separated).
    #[arg(long, value_delimiter = ',', value_name = "STATES")]
    pub states: Vec<StateCode>,

    /// Concurrent tile downloads per state.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Mirror downloaded tiles into this directory (enables upload).
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Plan only, like `plan`.
    #[arg(long)]
    pub dry_run: bool,
}
