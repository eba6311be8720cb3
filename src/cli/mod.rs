//! Command line interface.
//!
//! Parses arguments, wires a cancellation token to Ctrl-C and dispatches to
//! the subcommand in [`commands`].

mod args;
pub mod commands;

pub use args::{Args, BUILD_NUMBER_VARIABLES, BuildArgs, Command, InstallAppDepsArgs};

use crate::error::{CliError, Result};
use tokio_util::sync::CancellationToken;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    validate_args(&args)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling running commands and requests");
            on_interrupt.cancel();
        }
    });

    match &args.command {
        Command::Build(build) => commands::build::execute(build, cancel).await,
        Command::InstallAppDeps(install) => {
            commands::install_app_deps::execute(install, cancel).await
        }
    }
}

/// Validate arguments without executing
pub fn validate_args(args: &Args) -> Result<()> {
    match &args.command {
        Command::Build(build) => build
            .validate()
            .map_err(|reason| CliError::InvalidArguments { reason }.into()),
        Command::InstallAppDeps(_) => Ok(()),
    }
}
