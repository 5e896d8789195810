//! Wiring of configuration, transport, storage and the orchestrator.

use crate::cli::{Cli, Command};
use landtiles_core::{CoreError, RunConfig, SourcesConfig};
use landtiles_fetch::{CancelToken, DirectoryStore, FetchError, HttpTransport, Orchestrator, RunReport};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when a state's metadata feed failed.
pub const EXIT_METADATA_FAILURE: u8 = 1;
/// Exit status for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Errors that abort a run before any tile is processed.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Bad init file, sources file or AOI.
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    /// The HTTP client could not be built.
    #[error("Transport error: {0}")]
    Transport(#[from] FetchError),
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `info`, `debug` with `-v` and
/// `trace` with `-vv`.
pub fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second call (tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Cancel `token` on Ctrl-C.
pub fn install_interrupt_handler(token: &CancelToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, cancelling downloads");
        token.cancel();
    })
}

/// Load the configuration named by `cli`, apply the command-line overrides.
pub fn load_config(cli: &Cli) -> Result<(RunConfig, SourcesConfig), RunnerError> {
    let args = cli.command.args();
    let mut config = RunConfig::load(&args.init)?;
    let sources = SourcesConfig::load(&args.sources)?;

    if !args.states.is_empty() {
        config.selected_states = Some(args.states.clone());
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.store_dir.is_some() {
        config.upload_s3 = true;
    }
    if !cli.command.downloads() {
        config.download = false;
    }
    config.validate()?;
    Ok((config, sources))
}

/// Run the command described by `cli`.
pub fn execute(cli: &Cli, cancel: &CancelToken) -> Result<RunReport, RunnerError> {
    let (config, sources) = load_config(cli)?;
    let transport = Arc::new(HttpTransport::new()?);

    let mut orchestrator = Orchestrator::new(config, sources, transport).with_cancel_token(cancel.clone());
    if let Some(dir) = &cli.command.args().store_dir {
        info!(dir = %dir.display(), "Mirroring tiles into directory store");
        orchestrator = orchestrator.with_store(Arc::new(DirectoryStore::new(dir)));
    }
    if matches!(cli.command, Command::Plan(_)) {
        info!("Planning only");
    }
    Ok(orchestrator.run()?)
}

/// Exit status of a finished run.
pub fn exit_code(result: &Result<RunReport, RunnerError>) -> ExitCode {
    match result {
        Ok(report) if report.has_fatal_failures() => ExitCode::from(EXIT_METADATA_FAILURE),
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::from(EXIT_CONFIG_ERROR),
    }
}
