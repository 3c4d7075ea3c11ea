//! tfharness CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Module failures
//! - 5: IaC error

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands, ModuleFailures};
use tfh_core::CoreError;
use tfh_iac::IacError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const MODULE_FAILURE: u8 = 3;
    pub const IAC_ERROR: u8 = 5;
}

fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "tfh=debug,warn"
    } else if quiet {
        "tfh=warn,warn"
    } else {
        "tfh=info,warn"
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose, cli.quiet)));
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    // Ctrl-C stops further conversion and cleanup work; teardown still runs.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight modules");
            on_signal.cancel();
        }
    });

    let result = match cli.command {
        Commands::Examples(args) => {
            commands::run::execute_examples(args, cli.config.as_deref(), cancel).await
        }
        Commands::All(args) => commands::run::execute_all(args, cli.config.as_deref(), cancel).await,
        Commands::Convert(args) => commands::convert::execute_convert(args, cancel).await,
        Commands::Revert(args) => commands::convert::execute_revert(args, cancel).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<ModuleFailures>().is_some() {
        return ExitCodes::MODULE_FAILURE;
    }
    if let Some(core) = e.downcast_ref::<CoreError>() {
        return match core {
            CoreError::NoExamples | CoreError::ConfigLoad { .. } => ExitCodes::INVALID_ARGS,
            CoreError::Setup { .. } | CoreError::Iac(_) | CoreError::Teardown(_) => {
                ExitCodes::IAC_ERROR
            }
            _ => ExitCodes::GENERAL_ERROR,
        };
    }
    if e.downcast_ref::<IacError>().is_some() || e.downcast_ref::<tfh_iac::ConversionError>().is_some()
    {
        return ExitCodes::IAC_ERROR;
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("terraform") || msg.contains("registry") {
        ExitCodes::IAC_ERROR
    } else if msg.contains("argument") || msg.contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
