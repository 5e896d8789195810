//! # landtiles-runner
//!
//! Command-line front end of the tile downloader.
//!
//! ## Commands
//!
//! - `landtiles run --init init.yaml --sources sources.yaml`: derive,
//!   reconcile, plan and download every selected state
//! - `landtiles plan ...`: the same without downloading
//!
//! The init file may be JSON or YAML; see [`landtiles_core::RunConfig`].
//! Ctrl-C cancels in-flight downloads; partial files are removed.
//!
//! ## Exit status
//!
//! - `0`: run finished (individual tiles may still have failed)
//! - `1`: at least one state's metadata feed was unavailable
//! - `2`: configuration error, nothing was downloaded

pub mod cli;
mod app;

pub use app::{
    execute, exit_code, init_logging, install_interrupt_handler, load_config, RunnerError,
    EXIT_CONFIG_ERROR, EXIT_METADATA_FAILURE,
};
pub use cli::{Cli, Command, RunArgs};
