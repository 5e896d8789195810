//! `landtiles` binary.

use clap::Parser;
use landtiles_fetch::CancelToken;
use landtiles_runner::{execute, exit_code, init_logging, install_interrupt_handler, Cli};
use std::process::ExitCode;
use tracing::{error, warn};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancelToken::new();
    if let Err(e) = install_interrupt_handler(&cancel) {
        warn!(error = %e, "Ctrl-C handler not installed");
    }

    let result = execute(&cli, &cancel);
    match &result {
        Ok(report) => print!("{report}"),
        Err(e) => error!("{e}"),
    }
    exit_code(&result)
}
