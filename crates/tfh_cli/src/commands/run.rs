//! Examples and all commands - apply and destroy module examples.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tfh_core::{Config, RunReport, TestRunner};

use super::ModuleFailures;

/// Flags shared by every run command. Unset flags keep the file or default value.
#[derive(Args, Debug, Default)]
pub struct RunOptions {
    /// Rewrite example sources to the local module before running
    #[arg(long, env = "TFH_LOCAL")]
    pub local: bool,

    /// Leave resources in place after apply
    #[arg(long, env = "TFH_SKIP_DESTROY")]
    pub skip_destroy: bool,

    /// Comma-separated examples to exclude
    #[arg(long, env = "TFH_EXCEPTION")]
    pub exception: Option<String>,

    /// Registry namespace of the module under test
    #[arg(long, env = "TFH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Directory holding the examples
    #[arg(long, env = "TFH_EXAMPLES_PATH")]
    pub examples_path: Option<PathBuf>,

    /// Log terraform commands instead of executing them
    #[arg(long, env = "TFH_DRY_RUN")]
    pub dry_run: bool,

    /// Terraform-compatible binary to run, e.g. tofu
    #[arg(long, env = "TFH_TERRAFORM_BINARY")]
    pub terraform_binary: Option<String>,

    /// Timeout in seconds for each terraform command (0 disables it)
    #[arg(long, env = "TFH_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Echo terraform output while it runs
    #[arg(long, env = "TFH_STREAM_LOGS")]
    pub stream_logs: bool,
}

#[derive(Args)]
pub struct ExamplesArgs {
    /// Comma-separated examples to run
    #[arg(short, long, env = "TFH_EXAMPLE")]
    pub example: Option<String>,

    #[command(flatten)]
    pub options: RunOptions,
}

#[derive(Args)]
pub struct AllArgs {
    /// Run examples one after another instead of in parallel
    #[arg(long)]
    pub sequential: bool,

    #[command(flatten)]
    pub options: RunOptions,
}

/// Configuration file values overlaid with command-line flags.
fn build_config(config_file: Option<&Path>, options: RunOptions) -> Result<Config> {
    let mut config = match config_file {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if options.local {
        config = config.with_local(true);
    }
    if options.skip_destroy {
        config = config.with_skip_destroy(true);
    }
    if let Some(exception) = options.exception {
        config = config.with_exception(exception);
    }
    if let Some(namespace) = options.namespace {
        config = config.with_namespace(namespace);
    }
    if let Some(path) = options.examples_path {
        config = config.with_examples_path(path);
    }
    if options.dry_run {
        config = config.with_dry_run(true);
    }
    if let Some(binary) = options.terraform_binary {
        config = config.with_terraform_binary(binary);
    }
    if let Some(timeout) = options.timeout {
        config = config.with_timeout_seconds(timeout);
    }
    if options.stream_logs {
        config = config.with_stream_logs(true);
    }
    Ok(config)
}

pub async fn execute_examples(
    args: ExamplesArgs,
    config_file: Option<&Path>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut config = build_config(config_file, args.options)?;
    if let Some(example) = args.example {
        config = config.with_example(example);
    }

    info!("Running examples: {}", config.example);
    let report = TestRunner::new(config)
        .with_cancellation(cancel)
        .run_examples()
        .await?;
    finish(report)
}

pub async fn execute_all(
    args: AllArgs,
    config_file: Option<&Path>,
    cancel: CancellationToken,
) -> Result<()> {
    let config = build_config(config_file, args.options)?;
    info!("Running all examples in {:?}", config.examples_path);

    let report = TestRunner::new(config)
        .with_cancellation(cancel)
        .run_all(!args.sequential)
        .await
        .context("test run aborted")?;
    finish(report)
}

fn finish(report: RunReport) -> Result<()> {
    for subtest in &report.subtests {
        let status = if subtest.passed { "PASS" } else { "FAIL" };
        println!("--- {}: {}", status, subtest.name);
    }

    if report.passed() {
        println!("ok ({} modules, run {})", report.summary.total, report.run_id);
        return Ok(());
    }

    Err(ModuleFailures {
        failed: report.summary.failed_count(),
        total: report.summary.total,
    }
    .into())
}
